use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context};
use url::Url;

pub const SETTINGS_FILE: &str = "planner.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Base URL of the account-scoped trip API. `None` keeps the engine local-only.
    pub api_base_url: Option<String>,
    pub service_api_key: String,
    pub database_url: String,
    pub autosave_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: None,
            service_api_key: String::new(),
            database_url: "sqlite://./data/planner.db".into(),
            autosave_delay_ms: 3000,
            request_timeout_secs: 15,
        }
    }
}

impl SyncSettings {
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub fn load_settings() -> SyncSettings {
    let mut settings = SyncSettings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file_overrides(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("PLANNER_API_URL") {
        settings.api_base_url = Some(v);
    }
    if let Ok(v) = std::env::var("APP__API_URL") {
        settings.api_base_url = Some(v);
    }

    if let Ok(v) = std::env::var("PLANNER_API_KEY") {
        settings.service_api_key = v;
    }
    if let Ok(v) = std::env::var("APP__API_KEY") {
        settings.service_api_key = v;
    }

    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Ok(v) = std::env::var("APP__AUTOSAVE_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.autosave_delay_ms = parsed;
        }
    }
    if let Ok(v) = std::env::var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    settings
}

/// Applies keys from a flat `planner.toml` table. Unknown keys and bad values are ignored.
pub fn apply_file_overrides(settings: &mut SyncSettings, raw: &str) {
    let Ok(table) = toml::from_str::<toml::Table>(raw) else {
        return;
    };

    if let Some(v) = table.get("api_url").and_then(|v| v.as_str()) {
        settings.api_base_url = Some(v.to_string());
    }
    if let Some(v) = table.get("api_key").and_then(|v| v.as_str()) {
        settings.service_api_key = v.to_string();
    }
    if let Some(v) = table.get("database_url").and_then(|v| v.as_str()) {
        settings.database_url = v.to_string();
    }
    if let Some(v) = table
        .get("autosave_delay_ms")
        .and_then(|v| v.as_integer())
        .and_then(|v| u64::try_from(v).ok())
    {
        settings.autosave_delay_ms = v;
    }
    if let Some(v) = table
        .get("request_timeout_secs")
        .and_then(|v| v.as_integer())
        .and_then(|v| u64::try_from(v).ok())
    {
        settings.request_timeout_secs = v;
    }
}

/// Validates the trip API base URL and strips any trailing slash.
pub fn normalize_api_base_url(raw: &str) -> anyhow::Result<String> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid trip API url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!(
            "trip API url must be http or https, got '{}'",
            url.scheme()
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

pub(crate) fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return SyncSettings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = database_url
        .strip_prefix("sqlite://")
        .and_then(|rest| rest.split('?').next())
        .filter(|path| !path.is_empty())
    else {
        return Ok(());
    };

    let Some(parent) = Path::new(path).parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
