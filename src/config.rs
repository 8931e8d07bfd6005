//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (REPODECK__*, override)
//! 4. Well-known deployment variables (GITHUB_CLIENT_ID, JWT_SECRET, ...)

use serde::Deserialize;

/// Minimum accepted length of the session signing secret
pub const MIN_SESSION_SECRET_BYTES: usize = 32;

/// Accepted bcrypt work factors
const PASSWORD_HASH_COSTS: std::ops::RangeInclusive<u32> = 4..=31;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub app: AppInfoConfig,
    pub auth: AuthConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,
}

/// Deployment environment selector
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Public application metadata
#[derive(Debug, Clone, Deserialize)]
pub struct AppInfoConfig {
    /// Display name (e.g., "Repodeck")
    pub name: String,
    /// Public base URL (e.g., "https://repodeck.example.com")
    pub base_url: String,
    /// Where a successful OAuth login lands
    pub dashboard_path: String,
}

/// Session and local account configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC session secret (32+ bytes). Empty means unset.
    #[serde(default)]
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
    /// bcrypt cost for seeded plain-text passwords (default: 12)
    pub password_hash_cost: u32,
    /// Email/password accounts
    #[serde(default)]
    pub users: Vec<UserSeed>,
}

/// One email/password account
#[derive(Debug, Clone, Deserialize)]
pub struct UserSeed {
    pub id: String,
    pub email: String,
    /// Plain-text password, hashed at startup
    #[serde(default)]
    pub password: String,
    /// bcrypt hash; takes precedence over `password`
    #[serde(default)]
    pub password_hash: Option<String>,
    pub name: String,
}

/// GitHub OAuth app and REST API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub redirect_uri: String,
    /// Host of the authorize/access_token endpoints
    pub oauth_base_url: String,
    /// Host of the REST API
    pub api_base_url: String,
}

impl GitHubConfig {
    /// Whether the OAuth app credentials are present
    pub fn oauth_enabled(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

/// UI feature flags, exposed through `/api/config`
#[derive(Debug, Clone, Copy, Deserialize, Default, serde::Serialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub beta: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> String {
        format!("repodeck={},tower_http=debug", self.level.to_ascii_lowercase())
    }
}

impl AppConfig {
    /// Read configuration from file and environment without validating it
    ///
    /// The binary reads the logging section before tracing is set up, then
    /// calls [`AppConfig::finalize`].
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (REPODECK__*)
    /// 5. Deployment variables shared with the previous web frontend
    ///
    /// # Errors
    /// Returns error if a source cannot be read or deserialized
    pub fn from_sources() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment as EnvSource, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.environment", "development")?
            .set_default("app.name", "Repodeck")?
            .set_default("app.base_url", "http://localhost:3000")?
            .set_default("app.dashboard_path", "/dashboard")?
            .set_default("auth.session_max_age", 604800)?
            .set_default("auth.password_hash_cost", 12)?
            .set_default(
                "github.redirect_uri",
                "http://localhost:3000/api/auth/github/callback",
            )?
            .set_default("github.oauth_base_url", "https://github.com")?
            .set_default("github.api_base_url", "https://api.github.com")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (REPODECK__*)
            .add_source(
                EnvSource::with_prefix("REPODECK")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("github.client_id", env_value("GITHUB_CLIENT_ID"))?
            .set_override_option("github.client_secret", env_value("GITHUB_CLIENT_SECRET"))?
            .set_override_option("github.redirect_uri", env_value("GITHUB_REDIRECT_URI"))?
            .set_override_option("auth.session_secret", env_value("JWT_SECRET"))?
            .set_override_option("app.name", env_value("NEXT_PUBLIC_APP_NAME"))?
            .set_override_option("app.base_url", env_value("NEXT_PUBLIC_APP_URL"))?
            .set_override_option("features.analytics", env_flag("NEXT_PUBLIC_ENABLE_ANALYTICS"))?
            .set_override_option("features.debug", env_flag("NEXT_PUBLIC_ENABLE_DEBUG"))?
            .set_override_option("features.beta", env_flag("NEXT_PUBLIC_ENABLE_BETA_FEATURES"))?
            .set_override_option("logging.level", env_value("LOG_LEVEL"))?
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))
    }

    /// Resolve the session secret and validate
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn finalize(&mut self) -> Result<(), crate::error::AppError> {
        self.resolve_session_secret()?;
        self.validate()
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.environment.is_production()
    }

    /// Fill in an ephemeral secret for development, refuse to start without
    /// one in production.
    fn resolve_session_secret(&mut self) -> Result<(), crate::error::AppError> {
        if !self.auth.session_secret.trim().is_empty() {
            return Ok(());
        }

        if self.server.environment.is_production() {
            return Err(crate::error::AppError::Config(
                "auth.session_secret (or JWT_SECRET) is required in production".to_string(),
            ));
        }

        self.auth.session_secret = generate_ephemeral_secret();
        tracing::warn!(
            "No session secret configured; using an ephemeral secret, sessions will not survive restarts"
        );
        Ok(())
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.auth.session_secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            if self.server.environment.is_production() {
                return Err(crate::error::AppError::Config(format!(
                    "auth.session_secret must be at least {} bytes",
                    MIN_SESSION_SECRET_BYTES
                )));
            }
            tracing::warn!(
                min_bytes = MIN_SESSION_SECRET_BYTES,
                "Session secret is shorter than recommended"
            );
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if !PASSWORD_HASH_COSTS.contains(&self.auth.password_hash_cost) {
            return Err(crate::error::AppError::Config(format!(
                "auth.password_hash_cost must be between {} and {}",
                PASSWORD_HASH_COSTS.start(),
                PASSWORD_HASH_COSTS.end()
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(crate::error::AppError::Config(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        if !matches!(self.logging.format.to_ascii_lowercase().as_str(), "pretty" | "json") {
            return Err(crate::error::AppError::Config(
                "logging.format must be \"pretty\" or \"json\"".to_string(),
            ));
        }

        let base_url = url::Url::parse(&self.app.base_url).map_err(|e| {
            crate::error::AppError::Config(format!("app.base_url is not a valid URL: {e}"))
        })?;

        if self.server.environment.is_production() && base_url.scheme() != "https" {
            return Err(crate::error::AppError::Config(
                "app.base_url must be https in production".to_string(),
            ));
        }

        if !self.app.dashboard_path.starts_with('/') {
            return Err(crate::error::AppError::Config(
                "app.dashboard_path must start with '/'".to_string(),
            ));
        }

        if !self.github.oauth_enabled() {
            tracing::warn!("GitHub OAuth client id/secret not configured; GitHub login will fail");
        }

        if !self.should_use_secure_cookies() {
            tracing::warn!(
                environment = "development",
                "Using insecure session cookies for local development"
            );
        }

        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_flag(name: &str) -> Option<bool> {
    env_value(name).map(|value| value == "true")
}

fn generate_ephemeral_secret() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                environment: Environment::Development,
            },
            app: AppInfoConfig {
                name: "Repodeck".to_string(),
                base_url: "http://localhost:3000".to_string(),
                dashboard_path: "/dashboard".to_string(),
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 604_800,
                password_hash_cost: 12,
                users: Vec::new(),
            },
            github: GitHubConfig {
                client_id: "github-client-id".to_string(),
                client_secret: "github-client-secret".to_string(),
                redirect_uri: "http://localhost:3000/api/auth/github/callback".to_string(),
                oauth_base_url: "https://github.com".to_string(),
                api_base_url: "https://api.github.com".to_string(),
            },
            features: FeatureFlags::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_development_defaults() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn missing_secret_fails_in_production() {
        let mut config = valid_config();
        config.server.environment = Environment::Production;
        config.app.base_url = "https://repodeck.example.com".to_string();
        config.auth.session_secret = String::new();

        let error = config
            .resolve_session_secret()
            .expect_err("production must not start without a secret");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("session_secret")
        ));
    }

    #[test]
    fn missing_secret_is_generated_in_development() {
        let mut config = valid_config();
        config.auth.session_secret = "   ".to_string();

        config.resolve_session_secret().expect("development falls back");
        assert!(config.auth.session_secret.len() >= MIN_SESSION_SECRET_BYTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_secret_in_production() {
        let mut config = valid_config();
        config.server.environment = Environment::Production;
        config.app.base_url = "https://repodeck.example.com".to_string();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_http_base_url_in_production() {
        let mut config = valid_config();
        config.server.environment = Environment::Production;

        let error = config
            .validate()
            .expect_err("production must be served over https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("https")
        ));
    }

    #[test]
    fn production_uses_secure_cookies() {
        let mut config = valid_config();
        config.server.environment = Environment::Production;
        config.app.base_url = "https://repodeck.example.com".to_string();

        assert!(config.validate().is_ok());
        assert!(config.should_use_secure_cookies());
    }

    #[test]
    fn oauth_enabled_requires_both_credentials() {
        let mut config = valid_config();
        assert!(config.github.oauth_enabled());
        config.github.client_secret = String::new();
        assert!(!config.github.oauth_enabled());
    }

    #[test]
    fn validate_rejects_unusable_hash_cost() {
        let mut config = valid_config();
        config.auth.password_hash_cost = 3;
        assert!(config.validate().is_err());
        config.auth.password_hash_cost = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn logging_section_drives_subscriber_settings() {
        let mut config = valid_config();
        assert!(!config.logging.is_json());
        assert_eq!(
            config.logging.filter_directive(),
            "repodeck=info,tower_http=debug"
        );

        config.logging.format = "JSON".to_string();
        config.logging.level = "Debug".to_string();
        assert!(config.validate().is_ok());
        assert!(config.logging.is_json());
        assert_eq!(
            config.logging.filter_directive(),
            "repodeck=debug,tower_http=debug"
        );
    }

    #[test]
    fn validate_rejects_unknown_logging_values() {
        let mut config = valid_config();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
