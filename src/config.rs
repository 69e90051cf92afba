use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::StorePolicy;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(env_path: &Path) {
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: We're single-threaded at this point (called before any async runtime)
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut vars = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            vars.push((key, value));
        }
    }
    vars
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub broker: BrokerConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub data_file: PathBuf,
    pub timeout_ms: u64,
    pub read_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Per-subscriber queue length before deliveries start failing.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Log dashboard frames to the console.
    pub console: bool,
}

/// `<data_local_dir>/irrigation-sync/store.json`, or the working directory
/// when the platform has no data dir.
pub fn default_data_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("irrigation-sync").join("store.json"))
        .unwrap_or_else(|| PathBuf::from("irrigation-store.json"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            },
            store: StoreConfig {
                backend: StoreBackend::File,
                data_file: default_data_file(),
                timeout_ms: 2000,
                read_attempts: 3,
            },
            broker: BrokerConfig { queue_capacity: 32 },
            dashboard: DashboardConfig { console: false },
        }
    }
}

impl StoreConfig {
    pub fn policy(&self) -> StorePolicy {
        StorePolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            read_attempts: self.read_attempts,
            ..StorePolicy::default()
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(bind) = var("IRRIGATION_BIND")
            && let Ok(addr) = bind.parse()
        {
            config.http.bind = addr;
        }

        // Store configuration
        if let Some(backend) = var("IRRIGATION_STORE") {
            match backend.to_ascii_lowercase().as_str() {
                "memory" => config.store.backend = StoreBackend::Memory,
                "file" => config.store.backend = StoreBackend::File,
                other => log::warn!("Ignoring unknown IRRIGATION_STORE value: {}", other),
            }
        }
        if let Some(path) = var("IRRIGATION_DATA_FILE") {
            config.store.data_file = PathBuf::from(path);
        }
        if let Some(timeout) = var("IRRIGATION_STORE_TIMEOUT_MS")
            && let Ok(t) = timeout.parse()
        {
            config.store.timeout_ms = t;
        }
        if let Some(attempts) = var("IRRIGATION_STORE_READ_ATTEMPTS")
            && let Ok(a) = attempts.parse()
        {
            config.store.read_attempts = a;
        }

        if let Some(capacity) = var("IRRIGATION_SUBSCRIBER_QUEUE")
            && let Ok(c) = capacity.parse()
        {
            config.broker.queue_capacity = c;
        }
        if let Some(console) = var("IRRIGATION_CONSOLE_DASHBOARD") {
            config.dashboard.console = matches!(
                console.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.http.bind.port(), 8080);
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.broker.queue_capacity, 32);
        assert!(!config.dashboard.console);
        assert_eq!(config.store.policy().timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("IRRIGATION_BIND", "127.0.0.1:9000"),
            ("IRRIGATION_STORE", "Memory"),
            ("IRRIGATION_DATA_FILE", "/var/lib/irrigation/store.json"),
            ("IRRIGATION_STORE_TIMEOUT_MS", "500"),
            ("IRRIGATION_STORE_READ_ATTEMPTS", "5"),
            ("IRRIGATION_SUBSCRIBER_QUEUE", "4"),
            ("IRRIGATION_CONSOLE_DASHBOARD", "true"),
        ]));
        assert_eq!(config.http.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(
            config.store.data_file,
            PathBuf::from("/var/lib/irrigation/store.json")
        );
        assert_eq!(config.store.policy().timeout, Duration::from_millis(500));
        assert_eq!(config.store.policy().read_attempts, 5);
        assert_eq!(config.broker.queue_capacity, 4);
        assert!(config.dashboard.console);
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("IRRIGATION_BIND", "not-an-address"),
            ("IRRIGATION_STORE", "postgres"),
            ("IRRIGATION_SUBSCRIBER_QUEUE", "lots"),
        ]));
        assert_eq!(config.http.bind.port(), 8080);
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.broker.queue_capacity, 32);
    }

    #[test]
    fn test_parse_dotenv() {
        let vars = parse_dotenv(
            "# comment\n\nIRRIGATION_BIND = 0.0.0.0:1234\nNAME=\"north bed\"\nQUOTE='x'\nEMPTY=\"\nbroken line\n",
        );
        assert_eq!(
            vars,
            vec![
                ("IRRIGATION_BIND", "0.0.0.0:1234"),
                ("NAME", "north bed"),
                ("QUOTE", "x"),
                ("EMPTY", "\""),
            ]
        );
    }
}
