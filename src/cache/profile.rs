//! Profile cache (`user:profile:{id}`)

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CacheError, CacheStore, get_json, keys, set_json};
use crate::error::WalletError;
use crate::ledger::LedgerStore;
use crate::models::{ProfilePatch, UserProfile};

pub const PROFILE_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct ProfileCache {
    ledger: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ProfileCache {
    pub fn new(ledger: Arc<dyn LedgerStore>, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { ledger, cache, ttl }
    }

    /// Read-through profile lookup. Unknown users are `None` and not cached.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, WalletError> {
        let key = keys::profile(user_id);
        match get_json::<UserProfile>(self.cache.as_ref(), &key).await {
            Ok(Some(profile)) => return Ok(Some(profile)),
            Ok(None) | Err(CacheError::Codec(_)) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Profile cache unavailable, reading ledger");
                return Ok(self.ledger.profile(user_id).await?);
            }
        }

        self.warm_profile(user_id).await
    }

    /// Load from the ledger and overwrite the cached copy
    pub async fn warm_profile(&self, user_id: &str) -> Result<Option<UserProfile>, WalletError> {
        let Some(profile) = self.ledger.profile(user_id).await? else {
            return Ok(None);
        };

        let key = keys::profile(user_id);
        if let Err(e) = set_json(self.cache.as_ref(), &key, &profile, Some(self.ttl)).await {
            warn!(key = %key, error = %e, "Failed to cache profile");
        }
        Ok(Some(profile))
    }

    pub async fn invalidate_profile(&self, user_id: &str) {
        let key = keys::profile(user_id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!(key = %key, error = %e, "Failed to invalidate profile");
        }
    }

    /// Merge an already-persisted edit into the cached copy.
    ///
    /// Nothing is written when no copy is cached; the next read loads the
    /// full record.
    pub async fn update_profile(&self, user_id: &str, patch: ProfilePatch) {
        let key = keys::profile(user_id);
        let mut profile = match get_json::<UserProfile>(self.cache.as_ref(), &key).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                debug!(key = %key, "No cached profile to update");
                return;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cannot merge profile update, invalidating");
                self.invalidate_profile(user_id).await;
                return;
            }
        };

        profile.apply(patch);
        if let Err(e) = set_json(self.cache.as_ref(), &key, &profile, Some(self.ttl)).await {
            warn!(key = %key, error = %e, "Failed to write merged profile");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::ledger::MemoryLedger;

    fn setup() -> (Arc<MemoryLedger>, Arc<MemoryCache>, ProfileCache) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.add_user_with_profile(
            "u",
            UserProfile {
                name: Some("Meera".into()),
                email: Some("meera@example.com".into()),
                phone: Some("9000000001".into()),
                image: None,
            },
            0,
        );
        let cache = Arc::new(MemoryCache::new());
        let profiles = ProfileCache::new(ledger.clone(), cache.clone(), PROFILE_TTL);
        (ledger, cache, profiles)
    }

    #[tokio::test]
    async fn test_read_through_and_hit() {
        let (ledger, cache, profiles) = setup();

        let profile = profiles.get_profile("u").await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Meera"));
        assert!(cache.contains("user:profile:u"));

        ledger.set_unavailable(true);
        assert!(profiles.get_profile("u").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (_ledger, cache, profiles) = setup();
        assert!(profiles.get_profile("ghost").await.unwrap().is_none());
        assert!(!cache.contains("user:profile:ghost"));
    }

    #[tokio::test]
    async fn test_update_merges_cached_copy() {
        let (_ledger, _cache, profiles) = setup();
        profiles.get_profile("u").await.unwrap();

        profiles
            .update_profile(
                "u",
                ProfilePatch {
                    image: Some("https://img.example.com/u.png".into()),
                    ..Default::default()
                },
            )
            .await;

        let profile = profiles.get_profile("u").await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Meera"));
        assert_eq!(
            profile.image.as_deref(),
            Some("https://img.example.com/u.png")
        );
    }

    #[tokio::test]
    async fn test_update_without_cached_copy_is_noop() {
        let (_ledger, cache, profiles) = setup();
        profiles
            .update_profile(
                "u",
                ProfilePatch {
                    name: Some("X".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(!cache.contains("user:profile:u"));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (_ledger, cache, profiles) = setup();
        profiles.get_profile("u").await.unwrap();
        profiles.invalidate_profile("u").await;
        assert!(!cache.contains("user:profile:u"));
    }

    #[tokio::test]
    async fn test_cache_offline_reads_ledger() {
        let (_ledger, cache, profiles) = setup();
        cache.set_offline(true);
        assert!(profiles.get_profile("u").await.unwrap().is_some());
    }
}
