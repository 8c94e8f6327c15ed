use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::secrets::mask_secret;

pub const DEFAULT_VERIFY_TOKEN: &str = "your_verify_token";
pub const DEFAULT_BRAND_NAME: &str = "YourBrand";
pub const DEFAULT_API_BASE: &str = "https://graph.instagram.com";
pub const DEFAULT_API_VERSION: &str = "v24.0";

/// Environment variable → config key. Environment always wins over the file.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("INSTAGRAM_ACCESS_TOKEN", "access_token"),
    ("INSTAGRAM_USER_ID", "account_id"),
    ("WEBHOOK_VERIFY_TOKEN", "verify_token"),
    ("BRAND_NAME", "brand_name"),
    ("INSTAGRAM_APP_SECRET", "app_secret"),
    ("GRAPH_API_BASE", "api_base"),
    ("GRAPH_API_VERSION", "api_version"),
    ("HOST", "host"),
    ("PORT", "port"),
    ("AUTODM_AUDIT_LOG_DIR", "audit_log_dir"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Immutable service configuration, built once at startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Instagram user access token used as the bearer credential.
    #[serde(default)]
    pub access_token: String,
    /// The monitored account; only events addressed to it are answered.
    #[serde(default)]
    pub account_id: String,
    pub verify_token: String,
    pub brand_name: String,
    /// App secret for `X-Hub-Signature-256` checks. Unset disables the check.
    #[serde(default)]
    pub app_secret: Option<String>,
    pub api_base: String,
    pub api_version: String,
    pub host: String,
    pub port: u16,
    pub send_timeout_secs: u64,
    pub max_message_chars: usize,
    pub dedupe_ttl_secs: u64,
    pub dedupe_max_entries: usize,
    pub conversation_log_capacity: usize,
    pub stats_recent: usize,
    #[serde(default)]
    pub audit_log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            account_id: String::new(),
            verify_token: DEFAULT_VERIFY_TOKEN.to_string(),
            brand_name: DEFAULT_BRAND_NAME.to_string(),
            app_secret: None,
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            send_timeout_secs: 10,
            max_message_chars: 1000,
            dedupe_ttl_secs: 86_400,
            dedupe_max_entries: 10_000,
            conversation_log_capacity: 500,
            stats_recent: 5,
            audit_log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load defaults, then the config file if given, then the process environment.
    pub fn load(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(custom_path, |key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::load`] with an injectable environment lookup.
    pub fn load_with<F>(custom_path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let mut builder = Config::builder()
            .set_default("verify_token", d.verify_token)?
            .set_default("brand_name", d.brand_name)?
            .set_default("api_base", d.api_base)?
            .set_default("api_version", d.api_version)?
            .set_default("host", d.host)?
            .set_default("port", d.port as i64)?
            .set_default("send_timeout_secs", d.send_timeout_secs as i64)?
            .set_default("max_message_chars", d.max_message_chars as i64)?
            .set_default("dedupe_ttl_secs", d.dedupe_ttl_secs as i64)?
            .set_default("dedupe_max_entries", d.dedupe_max_entries as i64)?
            .set_default("conversation_log_capacity", d.conversation_log_capacity as i64)?
            .set_default("stats_recent", d.stats_recent as i64)?;

        if let Some(path) = custom_path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        for &(var, key) in ENV_OVERRIDES {
            let value = env(var).filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(key, value)?;
        }

        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        Ok(cfg)
    }

    /// Fail-fast checks for settings the service cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token.trim().is_empty() {
            return Err(ConfigError::Missing("access_token (INSTAGRAM_ACCESS_TOKEN)"));
        }
        if self.account_id.trim().is_empty() {
            return Err(ConfigError::Missing("account_id (INSTAGRAM_USER_ID)"));
        }
        if self.verify_token.is_empty() {
            return Err(ConfigError::Missing("verify_token (WEBHOOK_VERIFY_TOKEN)"));
        }
        if self.send_timeout_secs == 0 {
            return Err(ConfigError::Invalid("send_timeout_secs must be > 0".into()));
        }
        if self.max_message_chars == 0 {
            return Err(ConfigError::Invalid("max_message_chars must be > 0".into()));
        }
        Ok(())
    }

    /// `POST` target for outbound replies.
    pub fn messages_endpoint(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.api_base.trim_end_matches('/'),
            self.api_version,
            self.account_id
        )
    }

    /// Copy of the config with every secret masked, safe to print or log.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        out.access_token = mask_secret(&self.access_token);
        out.verify_token = mask_secret(&self.verify_token);
        out.app_secret = self.app_secret.as_deref().map(mask_secret);
        out
    }
}
