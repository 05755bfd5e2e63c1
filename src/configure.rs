use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub order_input: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub trade: String,
    pub market_data: String,
    pub order_updates: String,
    pub errors: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    pub worker_threads: usize,
    pub enable_snapshot: bool,
    pub snapshot_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_dir: String,
    pub redis: RedisConfig,
    pub queues: QueueConfig,
    pub channels: ChannelConfig,
    pub engine: EngineSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            redis: RedisConfig {
                host: "localhost".to_string(),
                port: 6379,
                password: String::new(),
            },
            queues: QueueConfig { order_input: "order_input_queue".to_string() },
            channels: ChannelConfig {
                trade: "trades".to_string(),
                market_data: "market_data".to_string(),
                order_updates: "order_updates".to_string(),
                errors: "errors".to_string(),
            },
            engine: EngineSettings {
                worker_threads: 4,
                enable_snapshot: true,
                snapshot_interval_secs: 60,
            },
        }
    }
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Defaults
        .set_default("log_dir", "logs")?
        .set_default("redis.host", "localhost")?
        .set_default("redis.port", 6379)?
        .set_default("redis.password", "")?
        .set_default("queues.order_input", "order_input_queue")?
        .set_default("channels.trade", "trades")?
        .set_default("channels.market_data", "market_data")?
        .set_default("channels.order_updates", "order_updates")?
        .set_default("channels.errors", "errors")?
        .set_default("engine.worker_threads", 4)?
        .set_default("engine.enable_snapshot", true)?
        .set_default("engine.snapshot_interval_secs", 60)?
        // Optional configuration file
        .add_source(File::with_name("config/engine").required(false))
        // Environment overrides, e.g. ENGINE__REDIS__HOST
        .add_source(Environment::with_prefix("ENGINE").separator("__"))
        .build()?;

    s.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_loaded_config() {
        let loaded = load_config().expect("defaults should satisfy the schema");
        let default = AppConfig::default();
        assert_eq!(loaded.redis.host, default.redis.host);
        assert_eq!(loaded.redis.port, default.redis.port);
        assert_eq!(loaded.queues.order_input, default.queues.order_input);
        assert_eq!(loaded.channels.trade, default.channels.trade);
        assert_eq!(loaded.engine.worker_threads, 4);
        assert!(loaded.engine.enable_snapshot);
        assert_eq!(loaded.engine.snapshot_interval_secs, 60);
    }
}
