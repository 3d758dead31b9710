use crate::activity::Branding;
use crate::locale::Language;
use crate::nicehash::auth::Credentials;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub nicehash: NiceHashConfig,
    #[serde(default)]
    pub gpu_device_brand: Option<String>,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_publish_interval_secs")]
    pub publish_interval_secs: u64,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NiceHashConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscordConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_large_image_key")]
    pub large_image_key: String,
    #[serde(default = "default_large_image_text")]
    pub large_image_text: String,
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
}

impl Default for NiceHashConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            api_secret_env: default_api_secret_env(),
            org_id: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            large_image_key: default_large_image_key(),
            large_image_text: default_large_image_text(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
    /// Carries the configured language so the fatal message can be localized.
    #[error("missing required settings: {}", .missing.join(", "))]
    MissingCredentials {
        missing: Vec<&'static str>,
        language: Language,
    },
}

/// Everything the refresh loop needs to reach NiceHash and pick a device.
#[derive(Debug, Clone)]
pub struct Account {
    pub credentials: Credentials,
    pub device_brand: String,
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        // Missing credentials take precedence so they reach the localized message.
        cfg.account()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs < 1 {
            return Err(ConfigError::Validation(
                "refresh_interval_secs must be >= 1".to_string(),
            ));
        }
        if self.publish_interval_secs < 1 {
            return Err(ConfigError::Validation(
                "publish_interval_secs must be >= 1".to_string(),
            ));
        }
        if self.nicehash.timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "nicehash.timeout_secs must be >= 1".to_string(),
            ));
        }
        if self.nicehash.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "nicehash.base_url must not be empty".to_string(),
            ));
        }
        if let Some(listen) = &self.listen {
            if SocketAddr::from_str(listen).is_err() {
                return Err(ConfigError::Validation(
                    "listen must be a valid host:port address".to_string(),
                ));
            }
        }

        validate_discord(&self.discord)
    }

    /// Resolves credentials and device brand. The secret may come from the
    /// environment variable named by `nicehash.api_secret_env`.
    pub fn account(&self) -> Result<Account, ConfigError> {
        self.account_with_env(|name| std::env::var(name).ok())
    }

    fn account_with_env<F>(&self, env: F) -> Result<Account, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_secret = env(&self.nicehash.api_secret_env)
            .and_then(non_blank)
            .or_else(|| self.nicehash.api_secret.clone().and_then(non_blank));
        let api_key = self.nicehash.api_key.clone().and_then(non_blank);
        let org_id = self.nicehash.org_id.clone().and_then(non_blank);
        let device_brand = self.gpu_device_brand.clone().and_then(non_blank);

        match (api_key, api_secret, org_id, device_brand) {
            (Some(api_key), Some(api_secret), Some(org_id), Some(device_brand)) => Ok(Account {
                credentials: Credentials {
                    api_key,
                    api_secret,
                    org_id,
                },
                device_brand,
            }),
            (api_key, api_secret, org_id, device_brand) => {
                let mut missing = Vec::new();
                if api_key.is_none() {
                    missing.push("nicehash.api_key");
                }
                if api_secret.is_none() {
                    missing.push("nicehash.api_secret");
                }
                if org_id.is_none() {
                    missing.push("nicehash.org_id");
                }
                if device_brand.is_none() {
                    missing.push("gpu_device_brand");
                }
                Err(ConfigError::MissingCredentials {
                    missing,
                    language: self.language,
                })
            }
        }
    }

    pub fn branding(&self) -> Branding {
        Branding {
            large_image_key: self.discord.large_image_key.clone(),
            large_image_text: self.discord.large_image_text.clone(),
        }
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_discord(cfg: &DiscordConfig) -> Result<(), ConfigError> {
    if cfg.large_image_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.large_image_key must not be empty".to_string(),
        ));
    }
    if cfg.reconnect_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "discord.reconnect_interval_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

const fn default_refresh_interval_secs() -> u64 {
    30
}

const fn default_publish_interval_secs() -> u64 {
    1
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_reconnect_interval_secs() -> u64 {
    15
}

fn default_api_secret_env() -> String {
    "NICEHASH_API_SECRET".to_string()
}

fn default_base_url() -> String {
    "https://api2.nicehash.com".to_string()
}

/// Application id baked in at build time; `discord.client_id` overrides it.
pub const DEFAULT_CLIENT_ID: &str = match option_env!("NICEHASH_PRESENCE_CLIENT_ID") {
    Some(id) => id,
    None => "",
};

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_large_image_key() -> String {
    "nicehash".to_string()
}

fn default_large_image_text() -> String {
    "NiceHash".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
nicehash:
  api_key: "key"
  api_secret: "secret"
  org_id: "org"
gpu_device_brand: NVIDIA
language: en
listen: "127.0.0.1:9109"
discord:
  client_id: "1234567890"
"#;

    fn parse(text: &str) -> Config {
        serde_yaml::from_str(text).expect("valid yaml")
    }

    #[test]
    fn applies_defaults_for_optional_fields() {
        let cfg = parse(FULL);
        cfg.validate().expect("valid config");

        assert_eq!(cfg.refresh_interval_secs, 30);
        assert_eq!(cfg.publish_interval_secs, 1);
        assert_eq!(cfg.nicehash.base_url, "https://api2.nicehash.com");
        assert_eq!(cfg.nicehash.timeout_secs, 10);
        assert_eq!(cfg.discord.large_image_key, "nicehash");
        assert_eq!(cfg.discord.reconnect_interval_secs, 15);
        assert_eq!(cfg.language, Language::En);
    }

    #[test]
    fn resolves_account() {
        let account = parse(FULL).account_with_env(|_| None).expect("complete");
        assert_eq!(account.credentials.api_key, "key");
        assert_eq!(account.credentials.api_secret, "secret");
        assert_eq!(account.credentials.org_id, "org");
        assert_eq!(account.device_brand, "NVIDIA");
    }

    #[test]
    fn secret_from_env_wins() {
        let account = parse(FULL)
            .account_with_env(|name| (name == "NICEHASH_API_SECRET").then(|| "env".to_string()))
            .expect("complete");
        assert_eq!(account.credentials.api_secret, "env");
    }

    #[test]
    fn reports_every_missing_setting() {
        let cfg = parse("nicehash:\n  api_key: \"  \"\n  org_id: org\n");
        cfg.validate().expect("optional fields are still valid");

        let err = cfg.account_with_env(|_| None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required settings: nicehash.api_key, nicehash.api_secret, gpu_device_brand"
        );
    }

    #[test]
    fn rejects_zero_intervals_and_bad_listen() {
        let mut cfg = parse(FULL);
        cfg.refresh_interval_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = parse(FULL);
        cfg.listen = Some("not-an-address".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = parse(FULL);
        cfg.discord.reconnect_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn client_id_is_optional() {
        let cfg = parse("gpu_device_brand: AMD\n");
        cfg.validate().expect("client id falls back to the built-in one");
        assert_eq!(cfg.discord.client_id, DEFAULT_CLIENT_ID);
    }

    fn write_temp(name: &str, text: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "nicehash-presence-{}-{name}.yaml",
            std::process::id()
        ));
        fs::write(&path, text).expect("write temp config");
        path
    }

    #[test]
    fn load_reports_missing_credentials_before_other_checks() {
        let path = write_temp("no-creds", "nicehash:\n  api_key: \"\"\nrefresh_interval_secs: 0\n");
        let err = Config::load_from_file(&path).unwrap_err();
        let _ = fs::remove_file(&path);

        match err {
            ConfigError::MissingCredentials { missing, language } => {
                assert_eq!(language, Language::Ja);
                assert!(missing.contains(&"nicehash.api_key"));
                assert!(missing.contains(&"nicehash.org_id"));
                assert!(missing.contains(&"gpu_device_brand"));
            }
            other => panic!("expected missing credentials, got {other}"),
        }
    }

    #[test]
    fn load_accepts_file_without_discord_section() {
        let path = write_temp(
            "no-discord",
            "nicehash:\n  api_key: key\n  api_secret: secret\n  org_id: org\ngpu_device_brand: NVIDIA\n",
        );
        let cfg = Config::load_from_file(&path);
        let _ = fs::remove_file(&path);

        let cfg = cfg.expect("complete config loads");
        assert_eq!(cfg.discord.large_image_text, "NiceHash");
    }

    #[test]
    fn bundled_example_parses() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example parses");
        cfg.validate().expect("example is valid");
    }
}
