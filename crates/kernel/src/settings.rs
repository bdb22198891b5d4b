use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde::Deserialize;

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "BOOKSTORE_ENV";
const CONFIG_DIR_ENV: &str = "BOOKSTORE_CONFIG_DIR";
const ENV_PREFIX: &str = "BOOKSTORE";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub media: MediaSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, and environment overlay.
    ///
    /// Environment variables use the `BOOKSTORE_` prefix and `__` between
    /// nesting levels, e.g. `BOOKSTORE_DATABASE__URI`.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .map(|cwd| cwd.join("config"))
                .context("unable to resolve current directory")?,
        };

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        settings.environment = parse_environment(&environment)?;

        Ok(settings)
    }
}

fn parse_environment(raw: &str) -> anyhow::Result<Environment> {
    match raw {
        "local" => Ok(Environment::Local),
        "staging" => Ok(Environment::Staging),
        "production" => Ok(Environment::Production),
        other => Err(anyhow!(
            "unsupported environment '{}'; expected local/staging/production",
            other
        )),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Which document store backs the catalog.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mongo,
    /// Process-local store, contents are lost on restart.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "DatabaseSettings::default_uri")]
    pub uri: String,
    #[serde(default = "DatabaseSettings::default_name")]
    pub name: String,
}

impl DatabaseSettings {
    fn default_uri() -> String {
        "mongodb://127.0.0.1:27017".to_string()
    }

    fn default_name() -> String {
        "bookstore".to_string()
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            uri: Self::default_uri(),
            name: Self::default_name(),
        }
    }
}

/// Credentials for the image hosting service.
///
/// Media cleanup is disabled unless all three credentials are present.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    #[serde(default)]
    pub cloud_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default = "MediaSettings::default_base_url")]
    pub base_url: String,
    #[serde(default = "MediaSettings::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Must match the account's signature algorithm setting.
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,
}

/// Digest used to sign media API requests.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl MediaSettings {
    fn default_base_url() -> String {
        "https://api.cloudinary.com".to_string()
    }

    fn default_timeout_ms() -> u64 {
        10000
    }

    /// Returns `(cloud_name, api_key, api_secret)` when media cleanup is configured.
    pub fn credentials(&self) -> Option<(&str, &str, &str)> {
        match (&self.cloud_name, &self.api_key, &self.api_secret) {
            (Some(cloud), Some(key), Some(secret))
                if !cloud.is_empty() && !key.is_empty() && !secret.is_empty() =>
            {
                Some((cloud.as_str(), key.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: None,
            api_secret: None,
            base_url: Self::default_base_url(),
            timeout_ms: Self::default_timeout_ms(),
            signature_algorithm: SignatureAlgorithm::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "TelemetrySettings::default_filter")]
    pub filter: String,
}

impl TelemetrySettings {
    fn default_filter() -> String {
        "info,tower_http=info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            filter: Self::default_filter(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_environment_is_local() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Local);
    }

    #[test]
    fn default_database_points_at_local_mongo() {
        let settings = Settings::default();
        assert_eq!(settings.database.backend, StoreBackend::Mongo);
        assert_eq!(settings.database.uri, "mongodb://127.0.0.1:27017");
        assert_eq!(settings.database.name, "bookstore");
    }

    #[test]
    fn media_signs_with_sha1_unless_configured() {
        assert_eq!(
            MediaSettings::default().signature_algorithm,
            SignatureAlgorithm::Sha1
        );

        let media: MediaSettings =
            serde_json::from_value(serde_json::json!({ "signature_algorithm": "sha256" })).unwrap();
        assert_eq!(media.signature_algorithm, SignatureAlgorithm::Sha256);
    }

    #[test]
    fn media_credentials_require_every_field() {
        let mut media = MediaSettings::default();
        assert!(media.credentials().is_none());

        media.cloud_name = Some("shelf".into());
        media.api_key = Some("key".into());
        assert!(media.credentials().is_none());

        media.api_secret = Some(String::new());
        assert!(media.credentials().is_none());

        media.api_secret = Some("secret".into());
        assert_eq!(media.credentials(), Some(("shelf", "key", "secret")));
    }

    #[test]
    fn unknown_environment_is_rejected() {
        assert!(parse_environment("qa").is_err());
        assert_eq!(parse_environment("staging").unwrap(), Environment::Staging);
    }
}
