pub const API_URL: &str = "API_URL";

pub const MQTT_BROKER: &str = "MQTT_BROKER";

pub const MQTT_PORT: &str = "MQTT_PORT";

pub const MQTT_TOPIC: &str = "MQTT_TOPIC";

pub const DATABASE_PATH: &str = "DATABASE_PATH";

pub const API_BIND: &str = "API_BIND";

/// Read an environment variable, treating empty values as unset
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
