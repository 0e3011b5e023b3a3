//! Worker process settings, read from the environment.

use std::str::FromStr;
use std::time::Duration;

use inboxpay_infra::PipelineConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is not a valid number: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Everything the worker needs to wire the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub database_max_connections: u32,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub openrouter_api_key: String,
    pub openrouter_model: Option<String>,
    pub pipeline: PipelineConfig,
}

impl Settings {
    /// Load an optional `.env` file, then read the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!(error = %err, "failed to load .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(SettingsError::Missing("DATABASE_URL"))?;

        let google_client_id = optional_secret(get("GOOGLE_CLIENT_ID"), "GOOGLE_CLIENT_ID");
        let google_client_secret = optional_secret(get("GOOGLE_CLIENT_SECRET"), "GOOGLE_CLIENT_SECRET");
        let openrouter_api_key = optional_secret(get("OPENROUTER_API_KEY"), "OPENROUTER_API_KEY");

        let mut pipeline = PipelineConfig::default();
        if let Some(secs) = positive::<u64>(&get, "POLL_INTERVAL_SECS")? {
            pipeline = pipeline.with_poll_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = number::<u64>(&get, "SHUTDOWN_TIMEOUT_SECS")? {
            pipeline = pipeline.with_shutdown_grace(Duration::from_secs(secs));
        }
        if let Some(size) = positive::<usize>(&get, "EXTRACTION_BATCH_SIZE")? {
            pipeline = pipeline.with_extraction_batch_size(size);
        }
        if let Some(size) = positive::<u32>(&get, "DISCOVERY_PAGE_SIZE")? {
            pipeline = pipeline.with_discovery_page_size(size);
        }
        if let Some(cap) = positive::<u32>(&get, "MAX_MESSAGES_PER_ACCOUNT")? {
            pipeline = pipeline.with_max_messages_per_account(cap);
        }

        Ok(Self {
            database_url,
            database_max_connections: positive(&get, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(5),
            google_client_id,
            google_client_secret,
            openrouter_api_key,
            openrouter_model: get("OPENROUTER_MODEL"),
            pipeline,
        })
    }
}

fn optional_secret(value: Option<String>, key: &str) -> String {
    value.unwrap_or_else(|| {
        tracing::warn!(key, "not set; calls needing it will fail");
        String::new()
    })
}

fn number<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, SettingsError> {
    match get(key) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| SettingsError::Invalid { key, value }),
    }
}

/// Like [`number`], but zero is rejected.
fn positive<T: FromStr + Default + PartialEq>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, SettingsError> {
    match number::<T>(get, key)? {
        Some(value) if value == T::default() => Err(SettingsError::Zero(key)),
        other => Ok(other),
    }
}
