//! Okane wallet service host
//!
//! ```text
//! config/<env>.yaml ─▶ logging ─▶ PostgreSQL (schema) + cache ─▶ Wallet
//!                                                         │
//!                          --clear-cache ◀────────────────┤
//!                          startup warm  ◀────────────────┤
//!                          scheduled warm (until Ctrl-C) ◀┘
//! ```
//!
//! Flags: `--env <name>` / `-e <name>` (default `dev`), `--clear-cache`,
//! `--warm-once` (warm and exit). Clearing and warming reach request handlers
//! only through the shared Redis backend.

use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info, warn};

use okane::cache::{self, keys};
use okane::config::{AppConfig, CacheBackend};
use okane::db::Database;
use okane::ledger::PgLedger;
use okane::logging::init_logging;
use okane::wallet::Wallet;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&app_config);

    info!(env = %env, "Starting okane wallet service");

    let postgres_url = app_config
        .postgres_url
        .as_deref()
        .context("postgres_url is not configured and DATABASE_URL is not set")?;

    let db = Database::connect(postgres_url, app_config.postgres_max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("PostgreSQL health check failed")?;
    db.init_schema()
        .await
        .context("Failed to initialize schema")?;
    info!("PostgreSQL connected and schema initialized");

    let ledger = Arc::new(PgLedger::new(db.pool().clone()));
    let cache = cache::open(&app_config.cache)
        .await
        .context("Failed to open cache backend")?;
    info!(backend = cache.name(), "Cache backend ready");
    if app_config.cache.backend == CacheBackend::Memory {
        warn!("In-process cache: warming and clearing only affect this process");
    }
    let wallet = Wallet::new(
        ledger,
        cache,
        &app_config.cache,
        app_config.warmer.warmer_config(),
    );

    if has_flag("--clear-cache") {
        let removed = wallet.warmer.clear(&keys::ALL_PREFIXES).await?;
        info!(keys = removed, "Cache cleared");
    }

    if app_config.warmer.warm_on_startup || has_flag("--warm-once") {
        match wallet.warmer.warm_all().await {
            Ok(report) if report.failed > 0 => {
                warn!(failed = report.failed, "Startup warm finished with failures")
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Startup warm failed"),
        }
    }

    if has_flag("--warm-once") {
        return Ok(());
    }

    if !app_config.warmer.enabled {
        info!("Scheduled cache warming disabled");
        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        return Ok(());
    }

    let warmer = wallet.warmer.clone();
    tokio::select! {
        _ = warmer.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
        }
    }

    Ok(())
}
