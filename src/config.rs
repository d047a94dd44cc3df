use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HostBoxError, Result};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub audit: AuditConfig,
    pub auth: AuthConfig,
    pub command: CommandConfig,
    pub host: HostConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on requests served at once; `None` keeps the listener unbounded.
    pub max_concurrent_requests: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub log_destination: PathBuf,
    /// Record the full envelope and the raw request body in every audit line.
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub admin_group: String,
    pub user_group: String,
    pub principals: Vec<PrincipalConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrincipalConfig {
    pub name: String,
    /// Lowercase hex SHA-256 of the API key.
    pub key_sha256: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Encoding label used to decode child process output.
    pub console_encoding: String,
    pub default_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    pub reboot_command: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2950,
            max_concurrent_requests: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "hostbox=info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_destination: PathBuf::from("hostbox-audit.log"),
            verbose: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_group: "HostBoxAdministrators".to_string(),
            user_group: "HostBoxUsers".to_string(),
            principals: Vec::new(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        let console_encoding = if cfg!(windows) { "ibm866" } else { "utf-8" };
        Self {
            console_encoding: console_encoding.to_string(),
            default_timeout_ms: 60_000,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        let reboot_command: &[&str] = if cfg!(windows) {
            &["shutdown", "/r", "/t", "0"]
        } else {
            &["shutdown", "-r", "now"]
        };
        Self {
            reboot_command: reboot_command.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let mut config = Self::default();

        if let Ok(host) = std::env::var("HOSTBOX_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("HOSTBOX_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| HostBoxError::config(format!("Invalid HOSTBOX_PORT: {port}")))?;
        }
        if let Ok(limit) = std::env::var("HOSTBOX_MAX_CONCURRENT_REQUESTS") {
            config.server.max_concurrent_requests = Some(limit.parse().map_err(|_| {
                HostBoxError::config(format!("Invalid HOSTBOX_MAX_CONCURRENT_REQUESTS: {limit}"))
            })?);
        }
        if let Ok(level) = std::env::var("HOSTBOX_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("HOSTBOX_LOG_FORMAT") {
            config.logging.format = format;
        }
        if let Ok(dest) = std::env::var("HOSTBOX_AUDIT_LOG") {
            config.audit.log_destination = PathBuf::from(dest);
        }
        if let Ok(verbose) = std::env::var("HOSTBOX_AUDIT_VERBOSE") {
            config.audit.verbose = matches!(verbose.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Load configuration from a TOML file (hostbox.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| HostBoxError::at(path, e))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(HostBoxError::config("Server port cannot be 0"));
        }

        if self.server.max_concurrent_requests == Some(0) {
            return Err(HostBoxError::config("max_concurrent_requests must be positive"));
        }

        if encoding_rs::Encoding::for_label(self.command.console_encoding.as_bytes()).is_none() {
            return Err(HostBoxError::config(format!(
                "Unknown console encoding: {}",
                self.command.console_encoding
            )));
        }

        if self.host.reboot_command.is_empty() {
            return Err(HostBoxError::config("Reboot command cannot be empty"));
        }

        for principal in &self.auth.principals {
            let hash = &principal.key_sha256;
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(HostBoxError::config(format!(
                    "Principal {} has no valid key_sha256",
                    principal.name
                )));
            }
        }

        Ok(())
    }
}
