use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mockex::configure;
use mockex::engine::TradingEngine;
use mockex::logging::setup_dual_logging;
use mockex::redis_store::RedisStore;

fn main() -> anyhow::Result<()> {
    let config = configure::load_config()?;
    let _guard = setup_dual_logging("engine_server", &config.log_dir);

    tracing::info!(
        redis = %format!("{}:{}", config.redis.host, config.redis.port),
        workers = config.engine.worker_threads,
        snapshot = config.engine.enable_snapshot,
        "starting mock trading engine"
    );

    let store = Arc::new(RedisStore::new(
        &config.redis.host,
        config.redis.port,
        &config.redis.password,
    )?);

    let engine = TradingEngine::new(config, store);

    // Seed demo accounts: users 1-10 with $10,000 each (in cents).
    for user_id in 1..=10u64 {
        engine.initialize_user_balance(user_id, 1_000_000);
    }
    tracing::info!("seeded demo balances for users 1-10");

    engine.start()?;
    tracing::info!("engine running; consuming order input queue");

    while engine.is_running() {
        thread::sleep(Duration::from_secs(1));
    }
    Ok(())
}
