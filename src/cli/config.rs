//! Relay configuration file handling
//!
//! Provides default configuration generation and loading for the relay.
//! Configuration files are TOML format. Relative paths inside the file
//! (session file, QR image, log file) resolve against the directory that
//! holds the config file, so a deployment directory can be moved as a unit.

use serde::{Deserialize, Serialize};
use session_relay::driver::DriverCommand;
use session_relay::queue::{QueueSettings, QueueTransport};
use session_relay::session::AckPolicy;
use std::fs;
use std::path::{Path, PathBuf};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_SESSION_FILE: &str = "session.json";
const DEFAULT_QR_FILE: &str = "qr.png";
const DEFAULT_QUEUE_URL: &str = "amqp://127.0.0.1:5672/%2f";
const DEFAULT_ROUTING_KEY: &str = "inbox";
const DEFAULT_DRIVER_COMMAND: &str = "wa-driver";

/// Relay configuration (operator settings only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Credential and pairing output configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Downstream queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Protocol driver process
    #[serde(default = "default_driver")]
    pub driver: DriverCommand,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Durable credential file
    #[serde(default = "default_session_path")]
    pub path: PathBuf,

    /// Where the pairing QR image is written
    #[serde(default = "default_qr_path")]
    pub qr_path: PathBuf,

    /// Also print the pairing code to the terminal
    #[serde(default = "default_print_qr")]
    pub print_qr: bool,
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Broker protocol (amqp or nats)
    #[serde(default)]
    pub transport: QueueTransport,

    /// Broker URL
    #[serde(default = "default_queue_url")]
    pub url: String,

    /// Routing key (AMQP queue name, or NATS subject) for inbound messages
    #[serde(default = "default_routing_key")]
    pub routing_key: String,

    /// AMQP virtual host, overriding the URL's
    pub vhost: Option<String>,

    pub user: Option<String>,
    pub password: Option<String>,

    /// When read receipts are sent relative to the publish outcome
    #[serde(default)]
    pub ack_policy: AckPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_session_path() -> PathBuf {
    PathBuf::from(DEFAULT_SESSION_FILE)
}

fn default_qr_path() -> PathBuf {
    PathBuf::from(DEFAULT_QR_FILE)
}

fn default_print_qr() -> bool {
    true
}

fn default_queue_url() -> String {
    DEFAULT_QUEUE_URL.to_string()
}

fn default_routing_key() -> String {
    DEFAULT_ROUTING_KEY.to_string()
}

fn default_driver() -> DriverCommand {
    DriverCommand::new(DEFAULT_DRIVER_COMMAND)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            queue: QueueConfig::default(),
            driver: default_driver(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
            qr_path: default_qr_path(),
            print_qr: default_print_qr(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            transport: QueueTransport::default(),
            url: default_queue_url(),
            routing_key: default_routing_key(),
            vhost: None,
            user: None,
            password: None,
            ack_policy: AckPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl QueueConfig {
    /// Connection parameters for the publisher
    pub fn settings(&self) -> QueueSettings {
        let mut settings = QueueSettings::new(&self.url);
        settings.user = self.user.clone();
        settings.password = self.password.clone();
        settings.vhost = self.vhost.clone();
        settings
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: RelayConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise use built-in defaults
    pub fn load_or_default(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Session file, resolved against the config file's directory
    pub fn session_path(&self, config_path: &Path) -> PathBuf {
        resolve(config_path, &self.session.path)
    }

    /// QR image path, resolved against the config file's directory
    pub fn qr_path(&self, config_path: &Path) -> PathBuf {
        resolve(config_path, &self.session.qr_path)
    }

    /// Log file path, resolved against the config file's directory
    pub fn log_file(&self, config_path: &Path) -> Option<PathBuf> {
        self.logging
            .file
            .as_ref()
            .map(|file| resolve(config_path, file))
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        format!(
            r#"# Session Relay Configuration
#
# Relative paths are resolved against the directory containing this file.

[session]
# Stored credentials. Removing this file forces QR pairing on next start.
path = "{session}"

# Pairing QR code image, rewritten every time the server rotates the code
qr_path = "{qr}"

# Also print the pairing code to the terminal
print_qr = true

[queue]
# Broker protocol: "amqp" (RabbitMQ) or "nats"
transport = "amqp"

# Broker that receives inbound messages
url = "{url}"

# AMQP: queue name on the default exchange. NATS: subject.
routing_key = "{routing_key}"

# AMQP virtual host (optional, overrides the one in url)
# vhost = "/"

# Optional credentials
# user = "relay"
# password = "..."

# When to send read receipts:
#   "always"        - after every publish attempt, even a failed one
#   "after-publish" - only for messages that were published
ack_policy = "always"

[driver]
# Protocol driver executable speaking line-delimited JSON on stdin/stdout
command = "{driver}"
args = []

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "relay.log"
"#,
            session = DEFAULT_SESSION_FILE,
            qr = DEFAULT_QR_FILE,
            url = DEFAULT_QUEUE_URL,
            routing_key = DEFAULT_ROUTING_KEY,
            driver = DEFAULT_DRIVER_COMMAND,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

fn resolve(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

/// Get the default config file path
///
/// - Config: ~/.local/share/session-relay/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("session-relay")
        .join("config.toml")
}

/// Config path from the `--config` flag, falling back to the default
pub fn config_path_or_default(config_path: Option<String>) -> PathBuf {
    config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.session.path, PathBuf::from("session.json"));
        assert_eq!(config.session.qr_path, PathBuf::from("qr.png"));
        assert!(config.session.print_qr);
        assert_eq!(config.queue.routing_key, "inbox");
        assert_eq!(config.queue.ack_policy, AckPolicy::Always);
        assert_eq!(config.queue.transport, QueueTransport::Amqp);
        assert_eq!(config.driver.command, "wa-driver");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = RelayConfig::default();
        config.queue.ack_policy = AckPolicy::AfterPublish;
        config.driver = DriverCommand::new("node").arg("driver.js");
        fs::write(&config_path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = RelayConfig::load(&config_path).unwrap();
        assert_eq!(loaded.queue.ack_policy, AckPolicy::AfterPublish);
        assert_eq!(loaded.driver.args, vec!["driver.js".to_string()]);
        assert_eq!(loaded.logging.level, "info");
    }

    #[test]
    fn test_create_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        RelayConfig::create_default(&config_path).unwrap();

        assert!(config_path.exists());

        // Verify it can be loaded
        let config = RelayConfig::load(&config_path).unwrap();
        assert_eq!(config.queue.url, "amqp://127.0.0.1:5672/%2f");
        assert_eq!(config.queue.transport, QueueTransport::Amqp);
        assert_eq!(config.driver.command, "wa-driver");
        assert!(config.driver.args.is_empty());
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_generate_default_toml() {
        let toml = RelayConfig::generate_default_toml();

        assert!(toml.contains("path = \"session.json\""));
        assert!(toml.contains("ack_policy = \"always\""));
        // Credentials are never written uncommented
        assert!(toml.contains("# password"));
        assert!(!toml.contains("\npassword"));
    }

    #[test]
    fn test_load_config_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let minimal_config = r#"
[queue]
transport = "nats"
url = "nats://queue:4222"
ack_policy = "after-publish"
"#;
        fs::write(&config_path, minimal_config).unwrap();

        let config = RelayConfig::load(&config_path).unwrap();

        assert_eq!(config.queue.transport, QueueTransport::Nats);
        assert_eq!(config.queue.url, "nats://queue:4222");
        assert!(config.queue.vhost.is_none());
        assert_eq!(config.queue.routing_key, "inbox");
        assert_eq!(config.queue.ack_policy, AckPolicy::AfterPublish);
        assert_eq!(config.session.path, PathBuf::from("session.json"));
        assert_eq!(config.driver.command, "wa-driver");
    }

    #[test]
    fn test_load_rejects_bad_ack_policy() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[queue]\nack_policy = \"never\"\n").unwrap();

        let err = RelayConfig::load(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("absent.toml");

        let config = RelayConfig::load_or_default(&config_path).unwrap();
        assert_eq!(config.session.path, PathBuf::from("session.json"));
        assert!(!config_path.exists());
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let config_path = PathBuf::from("/srv/relay/config.toml");
        let mut config = RelayConfig::default();
        config.logging.file = Some(PathBuf::from("logs/relay.log"));

        assert_eq!(
            config.session_path(&config_path),
            PathBuf::from("/srv/relay/session.json")
        );
        assert_eq!(config.qr_path(&config_path), PathBuf::from("/srv/relay/qr.png"));
        assert_eq!(
            config.log_file(&config_path),
            Some(PathBuf::from("/srv/relay/logs/relay.log"))
        );

        config.session.path = PathBuf::from("/var/lib/relay/session.json");
        assert_eq!(
            config.session_path(&config_path),
            PathBuf::from("/var/lib/relay/session.json")
        );
    }

    #[test]
    fn test_queue_settings() {
        let mut config = RelayConfig::default();
        config.queue.user = Some("relay".to_string());
        config.queue.password = Some("secret".to_string());
        config.queue.vhost = Some("whatsapp".to_string());

        let settings = config.queue.settings();
        assert_eq!(settings.url, "amqp://127.0.0.1:5672/%2f");
        assert_eq!(settings.vhost.as_deref(), Some("whatsapp"));
        assert_eq!(settings.user.as_deref(), Some("relay"));
        assert_eq!(settings.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("session-relay/config.toml"));
        assert_eq!(
            config_path_or_default(Some("/tmp/x.toml".to_string())),
            PathBuf::from("/tmp/x.toml")
        );
    }
}
