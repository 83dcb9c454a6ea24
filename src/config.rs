use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::status::{default_seed, Status, StatusCategory};

pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.zoho.com";
pub const DEFAULT_API_URL: &str = "https://projectsapi.zoho.com";

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub zoho: ZohoConfig,
    #[serde(default)]
    pub statuses: StatusConfig,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ZohoConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub portal_id: Option<String>,
    pub default_project: Option<String>,
    pub accounts_url: String,
    pub api_url: String,
    /// Name of the tasklist created when a project has none.
    pub default_tasklist: String,
    pub token_retry_backoff_ms: u64,
    pub request_timeout_secs: Option<u64>,
    pub preview_limit: usize,
}

impl Default for ZohoConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            portal_id: None,
            default_project: None,
            accounts_url: DEFAULT_ACCOUNTS_URL.into(),
            api_url: DEFAULT_API_URL.into(),
            default_tasklist: "General".into(),
            token_retry_backoff_ms: 500,
            request_timeout_secs: None,
            preview_limit: 200,
        }
    }
}

// Secrets stay out of logs and panic messages.
impl fmt::Debug for ZohoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZohoConfig")
            .field("client_id", &self.client_id.as_ref().map(|_| "<set>"))
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<set>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<set>"))
            .field("portal_id", &self.portal_id)
            .field("default_project", &self.default_project)
            .field("accounts_url", &self.accounts_url)
            .field("api_url", &self.api_url)
            .field("default_tasklist", &self.default_tasklist)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct StatusConfig {
    #[serde(default)]
    pub seed: Vec<SeedStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SeedStatus {
    pub id: String,
    pub name: String,
    #[serde(default = "open_category")]
    pub category: StatusCategory,
    pub color: Option<String>,
}

fn open_category() -> StatusCategory {
    StatusCategory::Open
}

impl AppConfig {
    pub fn seed_catalog(&self) -> Vec<Status> {
        if self.statuses.seed.is_empty() {
            return default_seed();
        }
        self.statuses
            .seed
            .iter()
            .map(|s| Status {
                id: s.id.clone(),
                name: s.name.clone(),
                category: s.category,
                color_hint: s
                    .color
                    .clone()
                    .unwrap_or_else(|| s.category.default_color().to_string()),
            })
            .collect()
    }

    /// Overlay `ZOHO_*` variables on top of the file values. Blank values count as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let zoho = &mut self.zoho;
        if let Some(v) = get("ZOHO_CLIENT_ID") {
            zoho.client_id = Some(v);
        }
        if let Some(v) = get("ZOHO_CLIENT_SECRET") {
            zoho.client_secret = Some(v);
        }
        if let Some(v) = get("ZOHO_REFRESH_TOKEN") {
            zoho.refresh_token = Some(v);
        }
        if let Some(v) = get("ZOHO_PORTAL_ID") {
            zoho.portal_id = Some(v);
        }
        if let Some(v) = get("ZOHO_ACCOUNTS_URL") {
            zoho.accounts_url = v;
        }
        if let Some(v) = get("ZOHO_API_URL") {
            zoho.api_url = v;
        }
    }
}

fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".zpanel")
}

pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path(), |key| std::env::var(key).ok())
}

pub fn load_config_from(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config.toml")?
    } else {
        AppConfig::default()
    };
    config.apply_env(lookup);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.toml"), no_env).unwrap();
        assert_eq!(config.zoho.accounts_url, DEFAULT_ACCOUNTS_URL);
        assert_eq!(config.zoho.api_url, DEFAULT_API_URL);
        assert_eq!(config.zoho.default_tasklist, "General");
        assert!(config.zoho.client_id.is_none());
        assert!(!config.debug);
        assert_eq!(config.seed_catalog().len(), 8);
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r##"
debug = true

[zoho]
client_id = "1000.ABC"
client_secret = "shh"
refresh_token = "1000.refresh"
portal_id = "7000000001"
default_tasklist = "Inbox"

[[statuses.seed]]
id = "1"
name = "New"

[[statuses.seed]]
id = "2"
name = "Done"
category = "closed"
color = "#00ff00"
"##,
        )
        .unwrap();

        let config = load_config_from(&path, no_env).unwrap();
        assert!(config.debug);
        assert_eq!(config.zoho.client_id.as_deref(), Some("1000.ABC"));
        assert_eq!(config.zoho.portal_id.as_deref(), Some("7000000001"));
        assert_eq!(config.zoho.default_tasklist, "Inbox");

        let seed = config.seed_catalog();
        assert_eq!(seed.len(), 2);
        assert_eq!(seed[0].category, StatusCategory::Open);
        assert_eq!(seed[0].color_hint, StatusCategory::Open.default_color());
        assert_eq!(seed[1].category, StatusCategory::Closed);
        assert_eq!(seed[1].color_hint, "#00ff00");
    }

    #[test]
    fn env_overrides_file_and_ignores_blank_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[zoho]\nclient_id = \"from-file\"\nportal_id = \"p1\"\n").unwrap();

        let env: HashMap<&str, &str> = [
            ("ZOHO_CLIENT_ID", "from-env"),
            ("ZOHO_PORTAL_ID", "  "),
            ("ZOHO_REFRESH_TOKEN", "1000.refresh"),
        ]
        .into_iter()
        .collect();
        let config = load_config_from(&path, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.zoho.client_id.as_deref(), Some("from-env"));
        assert_eq!(config.zoho.portal_id.as_deref(), Some("p1"));
        assert_eq!(config.zoho.refresh_token.as_deref(), Some("1000.refresh"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.zoho.client_secret = Some("super-secret".into());
        config.zoho.refresh_token = Some("1000.refresh-secret".into());
        let rendered = format!("{:?}", config.zoho);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("refresh-secret"));
    }

    #[test]
    fn invalid_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[zoho\n").unwrap();
        let err = load_config_from(&path, no_env).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config.toml"));
    }
}
