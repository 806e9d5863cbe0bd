use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::trace;

use crate::util;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    Memory,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./aviary.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub assembler: AssemblerConfig,

    #[serde(default)]
    pub forwarder: ForwarderConfig,

    #[serde(default)]
    pub alerting: AlertingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,

    /// Subscription filter, should cover the whole sensor namespace
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,

    /// Delay before polling the event loop again after a connection error
    pub reconnect_delay_secs: u64,

    /// Capacity of the channel between the event loop and the ingest actor
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            topic: "sensor/#".to_string(),
            client_id: "aviary-subscriber".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_secs: 5,
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Width of the time bucket that groups scalar messages of one cycle
    pub bucket_width_secs: u64,

    /// Partial readings older than this are dropped without forwarding
    pub staleness_secs: u64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            bucket_width_secs: 1,
            staleness_secs: 30,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Ingestion endpoint completed readings are posted to
    pub url: String,
    pub timeout_secs: u64,

    /// Number of forwarding workers (readings are sharded by module)
    pub workers: usize,

    /// Per-worker queue capacity, readings beyond it are dropped
    pub queue_capacity: usize,

    /// How long shutdown waits for the queues to drain
    pub drain_timeout_secs: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000/api/v1/readings".to_string(),
            timeout_secs: 5,
            workers: 4,
            queue_capacity: 256,
            drain_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Minimum time between two alerts for the same (variable, module)
    pub debounce_secs: u64,

    /// Number of most recent readings scanned for the latest per module
    pub recent_window: usize,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            debounce_secs: 60,
            recent_window: 100,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: SocketAddr,

    /// Enable CORS for the dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            enable_cors: true,
        }
    }
}

impl Config {
    /// Apply the environment variable overrides known from earlier deployments
    ///
    /// `lookup` is usually `std::env::var(..).ok()`; invalid values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(util::API_URL) {
            self.forwarder.url = url;
        }
        if let Some(broker) = lookup(util::MQTT_BROKER) {
            self.mqtt.broker = broker;
        }
        if let Some(port) = lookup(util::MQTT_PORT).and_then(|port| port.parse().ok()) {
            self.mqtt.port = port;
        }
        if let Some(topic) = lookup(util::MQTT_TOPIC) {
            self.mqtt.topic = topic;
        }
        if let Some(path) = lookup(util::DATABASE_PATH) {
            self.storage = StorageConfig::Sqlite {
                path: PathBuf::from(path),
            };
        }
        if let Some(bind) = lookup(util::API_BIND).and_then(|bind| bind.parse().ok()) {
            self.api.bind = bind;
        }
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

/// Load the configuration file (if given) and apply environment overrides
pub fn load(path: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };
    config.apply_overrides(util::env_var);
    Ok(config)
}
