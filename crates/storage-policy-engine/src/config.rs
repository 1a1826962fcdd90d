//! Store connection configuration.
//!
//! Connection settings for the policy store. Configuration is loaded from
//! environment variables with defaults for a local development database;
//! a `DATABASE_URL` connection string, when present, takes precedence over
//! the discrete fields.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value is missing.
    #[error("Missing required configuration value: {0}")]
    MissingValue(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Transport security mode, as libpq spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Plain TCP.
    Disable,
    /// TLS if the server offers it.
    Prefer,
    /// TLS without certificate verification.
    #[default]
    Require,
    /// TLS, verifying the CA.
    VerifyCa,
    /// TLS, verifying the CA and host name.
    VerifyFull,
}

impl SslMode {
    /// Get the libpq spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Parse the libpq spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "disable" => Some(SslMode::Disable),
            "prefer" => Some(SslMode::Prefer),
            "require" => Some(SslMode::Require),
            "verify-ca" | "verify_ca" => Some(SslMode::VerifyCa),
            "verify-full" | "verify_full" => Some(SslMode::VerifyFull),
            _ => None,
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SslMode::parse(s).ok_or_else(|| ConfigError::InvalidValue {
            key: "sslmode".to_string(),
            message: format!("unknown mode {:?}", s),
        })
    }
}

/// Connection settings for the policy store.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database host.
    pub host: String,

    /// Database port.
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Role to connect as.
    pub user: String,

    /// Password for `user`.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Transport security mode.
    pub ssl_mode: SslMode,

    /// Full connection string; overrides the discrete fields when set.
    #[serde(skip_serializing)]
    pub database_url: Option<String>,

    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl_mode", &self.ssl_mode)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for StoreConfig {
    /// Returns default configuration suitable for local development.
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
            ssl_mode: SslMode::Require,
            database_url: None,
            connect_timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DATABASE_URL`: Full connection string (overrides the fields below)
    /// - `POLICY_DB_HOST`: Database host (default: localhost)
    /// - `POLICY_DB_PORT`: Database port (default: 5432)
    /// - `POLICY_DB_NAME`: Database name (default: postgres)
    /// - `POLICY_DB_USER`: Database role (default: postgres)
    /// - `POLICY_DB_PASSWORD`: Password
    /// - `POLICY_DB_SSLMODE`: disable | prefer | require | verify-ca | verify-full (default: require)
    /// - `POLICY_DB_CONNECT_TIMEOUT_SECS`: Connect timeout (default: 30)
    ///
    /// Unparseable numeric or mode values fall back to the defaults;
    /// [`StoreConfig::validate`] catches what remains unusable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        Self {
            host: lookup("POLICY_DB_HOST").unwrap_or(default.host),
            port: lookup("POLICY_DB_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.port),
            database: lookup("POLICY_DB_NAME").unwrap_or(default.database),
            user: lookup("POLICY_DB_USER").unwrap_or(default.user),
            password: lookup("POLICY_DB_PASSWORD").filter(|s| !s.is_empty()),
            ssl_mode: lookup("POLICY_DB_SSLMODE")
                .and_then(|s| SslMode::parse(&s))
                .unwrap_or(default.ssl_mode),
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            connect_timeout_secs: lookup("POLICY_DB_CONNECT_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.connect_timeout_secs),
        }
    }

    /// Get the connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Where this configuration connects, without credentials.
    ///
    /// # Example
    ///
    /// ```
    /// use storage_policy_engine::config::StoreConfig;
    ///
    /// let config = StoreConfig::default();
    /// assert_eq!(config.display_target(), "postgres@localhost:5432/postgres");
    /// ```
    pub fn display_target(&self) -> String {
        match &self.database_url {
            Some(url) => redact_url(url),
            None => format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database),
        }
    }

    /// Check that the configuration can be used to connect.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.database_url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(ConfigError::InvalidValue {
                    key: "database_url".to_string(),
                    message: "expected a postgres:// or postgresql:// URL".to_string(),
                });
            }
            return Ok(());
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingValue("host".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::MissingValue("database".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::MissingValue("user".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "port".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "connect_timeout_secs".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Strip the password from a connection URL.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "<invalid url>".to_string();
    };
    match rest.rsplit_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{}://{}@{}", scheme, user, host)
        }
        None => url.to_string(),
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
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.ssl_mode, SslMode::Require);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("POLICY_DB_HOST", "db.example.com"),
            ("POLICY_DB_PORT", "6543"),
            ("POLICY_DB_PASSWORD", "secret"),
            ("POLICY_DB_SSLMODE", "verify-full"),
        ]));
        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.port, 6543);
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.ssl_mode, SslMode::VerifyFull);
        assert_eq!(config.database, "postgres");
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("POLICY_DB_PORT", "not-a-port"),
            ("POLICY_DB_SSLMODE", "sometimes"),
            ("POLICY_DB_PASSWORD", ""),
        ]));
        assert_eq!(config.port, 5432);
        assert_eq!(config.ssl_mode, SslMode::Require);
        assert!(config.password.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = StoreConfig {
            password: Some("hunter2".to_string()),
            database_url: Some("postgres://u:hunter2@h/db".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_serialize_skips_secrets() {
        let config = StoreConfig {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"ssl_mode\":\"require\""));
    }

    #[test]
    fn test_display_target_redacts_url_password() {
        let config = StoreConfig {
            database_url: Some("postgresql://admin:p@ss@db.host:5432/app".to_string()),
            ..Default::default()
        };
        assert_eq!(config.display_target(), "postgresql://admin@db.host:5432/app");
    }

    #[test]
    fn test_validate() {
        let mut config = StoreConfig::default();
        config.host = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::MissingValue(_))));

        config.database_url = Some("mysql://x".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        config.database_url = Some("postgres://x@y/z".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ssl_mode_from_str() {
        assert_eq!("verify_ca".parse::<SslMode>().unwrap(), SslMode::VerifyCa);
        assert!("bogus".parse::<SslMode>().is_err());
        for mode in [SslMode::Disable, SslMode::Prefer, SslMode::Require, SslMode::VerifyCa, SslMode::VerifyFull] {
            assert_eq!(SslMode::parse(mode.as_str()), Some(mode));
        }
    }
}
