//! Redis cache backend.
//!
//! Shared by every wallet process and by the warm/clear batch runs, so a
//! snapshot warmed or cleared here is what request handlers read. Lists map
//! onto LPUSH/LRANGE/LTRIM; multi-step writes go through `MULTI`/`EXEC`
//! pipelines.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError};
use std::time::Duration;
use tracing::{debug, info};

use super::{CacheError, CacheStore};

/// Keys fetched per `SCAN` round trip
const SCAN_BATCH: usize = 500;

impl From<RedisError> for CacheError {
    fn from(e: RedisError) -> Self {
        if e.code() == Some("WRONGTYPE") || e.kind() == ErrorKind::TypeError {
            return CacheError::WrongType(e.to_string());
        }
        CacheError::Unavailable(e.to_string())
    }
}

/// `CacheStore` over a multiplexed, auto-reconnecting Redis connection
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect and verify with `PING`
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let cache = Self { conn };
        cache.ping().await?;
        info!("Redis cache connected");
        Ok(cache)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// `SCAN MATCH` pattern for keys starting with `prefix`
fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Redis expiry in milliseconds, never zero
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Inclusive LTRIM stop index for a list bounded to `max_len`
fn trim_stop(max_len: usize) -> i64 {
    max_len as i64 - 1
}

#[async_trait]
impl CacheStore for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, CacheError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = (start + count - 1) as i64;
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start as i64)
            .arg(stop)
            .query_async(&mut conn)
            .await?;
        Ok(items)
    }

    async fn list_push_front(
        &self,
        key: &str,
        value: String,
        max_len: usize,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(trim_stop(max_len))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_replace(
        &self,
        key: &str,
        items: Vec<String>,
        max_len: usize,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let items: Vec<String> = items.into_iter().take(max_len).collect();
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("DEL").arg(key).ignore();
        if !items.is_empty() {
            pipe.cmd("RPUSH").arg(key).arg(items).ignore();
            if let Some(ttl) = ttl {
                pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)).ignore();
            }
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = prefix_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let n: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += n as usize;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix = %prefix, removed, "Deleted keys by prefix");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys;

    const TEST_REDIS_URL: &str = "redis://127.0.0.1:6379";

    #[test]
    fn test_prefix_pattern_escapes_glob() {
        assert_eq!(prefix_pattern(keys::BALANCE_PREFIX), "balance:*");
        assert_eq!(prefix_pattern("user:profile:"), "user:profile:*");
        assert_eq!(prefix_pattern("a*b?[c]"), "a\\*b\\?\\[c\\]*");
    }

    #[test]
    fn test_ttl_and_trim_bounds() {
        assert_eq!(ttl_millis(Duration::from_secs(300)), 300_000);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(trim_stop(50), 49);
        assert_eq!(trim_stop(0), -1);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_round_trip_against_server() {
        let cache = RedisCache::connect(TEST_REDIS_URL).await.unwrap();
        cache.delete_prefix("okane-test:").await.unwrap();

        cache
            .set("okane-test:k", "v".into(), Some(Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(
            cache.get("okane-test:k").await.unwrap(),
            Some("v".to_string())
        );

        for i in 0..5 {
            cache
                .list_push_front("okane-test:l", i.to_string(), 3)
                .await
                .unwrap();
        }
        assert_eq!(
            cache.list_range("okane-test:l", 0, 10).await.unwrap(),
            vec!["4", "3", "2"]
        );

        cache
            .list_replace("okane-test:l", vec!["a".into(), "b".into()], 1, None)
            .await
            .unwrap();
        assert_eq!(
            cache.list_range("okane-test:l", 0, 10).await.unwrap(),
            vec!["a"]
        );

        assert!(matches!(
            cache.list_range("okane-test:k", 0, 1).await,
            Err(CacheError::WrongType(_))
        ));
        assert_eq!(cache.delete_prefix("okane-test:").await.unwrap(), 2);
    }
}
