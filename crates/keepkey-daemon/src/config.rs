//! Daemon configuration

use keepkey_core::DEFAULT_BRIDGE_PORT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an alternate config file
pub const CONFIG_ENV: &str = "KEEPKEY_BRIDGE_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// HTTP listener
    pub http: HttpConfig,

    /// Unix socket path (or pipe name on Windows) for the approver IPC
    pub ipc_socket_path: PathBuf,

    /// JSON-lines file of approved origins
    pub origin_store_path: PathBuf,

    /// Remote Pioneer API
    pub pioneer: PioneerConfig,

    /// How long a pairing request waits for a decision (seconds)
    pub approval_timeout_secs: u64,

    /// How long a sign request waits for a signed payload (seconds)
    pub sign_timeout_secs: u64,

    /// Device rescan interval when hotplug events are unavailable (milliseconds)
    pub device_poll_interval_ms: u64,

    /// Prompt again for origins that were already approved
    pub require_reapproval: bool,

    /// Reject device, user and sign requests from unapproved origins
    pub enforce_origin_allowlist: bool,

    /// Start the HTTP server at launch
    pub auto_start: bool,

    /// Start the HTTP server when a device is attached and stop it on detach
    pub follow_device: bool,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

/// Pioneer API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PioneerConfig {
    /// Base URL of the API
    pub base_url: String,

    /// Username reported on `/status` and pairing responses
    pub username: Option<String>,

    /// Query key used to authenticate against the API
    pub query_key: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            ipc_socket_path: Self::default_ipc_path(),
            origin_store_path: Self::default_data_dir().join("origins.db"),
            pioneer: PioneerConfig::default(),
            approval_timeout_secs: 300,
            sign_timeout_secs: 600,
            device_poll_interval_ms: 2000,
            require_reapproval: false,
            enforce_origin_allowlist: false,
            auto_start: true,
            follow_device: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_BRIDGE_PORT,
        }
    }
}

impl Default for PioneerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pioneers.dev/api/v1".to_string(),
            username: None,
            query_key: None,
        }
    }
}

impl DaemonConfig {
    /// Platform-appropriate default IPC path
    #[cfg(unix)]
    fn default_ipc_path() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, fallback to /tmp
        dirs::runtime_dir()
            .map(|dir| dir.join("keepkey-bridge.sock"))
            .unwrap_or_else(|| PathBuf::from("/tmp/keepkey-bridge.sock"))
    }

    #[cfg(windows)]
    fn default_ipc_path() -> PathBuf {
        PathBuf::from(r"\\.\pipe\keepkey-bridge")
    }

    fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("keepkey-bridge")
    }

    /// Default config file location, honoring `KEEPKEY_BRIDGE_CONFIG`
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("keepkey-bridge")
                    .join("config.json")
            })
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if present, otherwise write and return the defaults
    pub fn load_or_create(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(path)?;
        tracing::info!("Created default config at {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) -> crate::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("API_PORT_BRIDGE") {
            self.http.port = port.trim().parse().map_err(|_| {
                crate::DaemonError::Config(format!("API_PORT_BRIDGE is not a port: {port}"))
            })?;
        }
        if let Some(username) = lookup("KEEPKEY_USERNAME") {
            self.pioneer.username = Some(username);
        }
        if let Some(key) = lookup("KEEPKEY_QUERY_KEY") {
            self.pioneer.query_key = Some(key);
        }
        if let Some(url) = lookup("PIONEER_URL") {
            self.pioneer.base_url = url;
        }
        self.validate()
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.approval_timeout_secs == 0 || self.sign_timeout_secs == 0 {
            return Err(crate::DaemonError::Config(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.device_poll_interval_ms == 0 {
            return Err(crate::DaemonError::Config(
                "device_poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Create directories if they don't exist
    pub fn ensure_directories(&self) -> crate::Result<()> {
        if let Some(parent) = self.origin_store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Windows named pipes don't use filesystem paths
        #[cfg(unix)]
        {
            if let Some(parent) = self.ipc_socket_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(())
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn sign_timeout(&self) -> Duration {
        Duration::from_secs(self.sign_timeout_secs)
    }

    pub fn device_poll_interval(&self) -> Duration {
        Duration::from_millis(self.device_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.http.port, 1646);
        assert_eq!(config.http.host, "127.0.0.1");
        assert!(config.auto_start);
        assert!(config.follow_device);
        assert!(!config.enforce_origin_allowlist);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let created = DaemonConfig::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(loaded.http.port, created.http.port);
        assert_eq!(loaded.origin_store_path, created.origin_store_path);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"http":{"port":9000},"require_reapproval":true}"#).unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.host, "127.0.0.1");
        assert!(config.require_reapproval);
        assert_eq!(config.approval_timeout_secs, 300);
    }

    #[test]
    fn test_overrides() {
        let mut config = DaemonConfig::default();
        config
            .apply_overrides(|key| match key {
                "API_PORT_BRIDGE" => Some("1700".to_string()),
                "KEEPKEY_USERNAME" => Some("alice".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.http.port, 1700);
        assert_eq!(config.pioneer.username.as_deref(), Some("alice"));
        assert!(config.pioneer.query_key.is_none());
    }

    #[test]
    fn test_bad_port_override_is_rejected() {
        let mut config = DaemonConfig::default();
        let err = config
            .apply_overrides(|key| (key == "API_PORT_BRIDGE").then(|| "nope".to_string()))
            .unwrap_err();
        assert!(matches!(err, crate::DaemonError::Config(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = DaemonConfig {
            sign_timeout_secs: 0,
            ..DaemonConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
