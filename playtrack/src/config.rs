use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use playtrack_core::{
    DEFAULT_REQUEST_TIMEOUT, NotionClient, STEAM_API_URL, STEAM_STORE_URL, SteamClient,
};

use crate::sync::engine::SyncEngine;
use crate::sync::fetcher::FetchPlan;
use crate::sync::retry::RetryPolicy;

const REQUIRED_KEYS: [&str; 4] = [
    "STEAM_API_KEY",
    "STEAM_ID",
    "NOTION_TOKEN",
    "NOTION_DATABASE_ID",
];
const DEFAULT_LOG_LEVEL: &str = "info";
const SESSION_FILE_NAME: &str = "gaming_sessions.json";
const DEFAULT_DETAIL_CONCURRENCY: u64 = 10;
const DEFAULT_PROGRESS_CONCURRENCY: u64 = 4;
const DEFAULT_MAX_RETRIES: u64 = 3;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub steam_api_key: String,
    pub steam_id: String,
    pub notion_token: String,
    pub notion_database_id: String,
    pub include_achievements: bool,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub session_file: PathBuf,
    pub request_timeout: Duration,
    pub detail_concurrency: usize,
    pub progress_concurrency: usize,
    pub max_retries: u32,
    pub steam_api_url: Option<String>,
    pub steam_store_url: Option<String>,
    pub notion_api_url: Option<String>,
}

impl TrackerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| required(&lookup, key).is_none())
            .collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "missing required configuration: {} (set them in the environment or .env)",
                missing.join(", ")
            );
        }
        let credential = |key: &str| required(&lookup, key).unwrap_or_default();

        let home = dirs::home_dir();
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let session_file = optional("PLAYTRACK_SESSION_FILE")
            .map(|value| expand_with_home(&value, home.as_deref()))
            .unwrap_or_else(default_session_file);
        let log_file =
            optional("PLAYTRACK_LOG_FILE").map(|value| expand_with_home(&value, home.as_deref()));
        let request_timeout = Duration::from_secs(read_u64(
            &lookup,
            "PLAYTRACK_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        ));

        Ok(Self {
            steam_api_key: credential("STEAM_API_KEY"),
            steam_id: credential("STEAM_ID"),
            notion_token: credential("NOTION_TOKEN"),
            notion_database_id: credential("NOTION_DATABASE_ID"),
            include_achievements: read_bool(&lookup, "PLAYTRACK_INCLUDE_ACHIEVEMENTS", true),
            log_level: optional("PLAYTRACK_LOG_LEVEL")
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_file,
            session_file,
            request_timeout,
            detail_concurrency: read_u64(
                &lookup,
                "PLAYTRACK_DETAIL_CONCURRENCY",
                DEFAULT_DETAIL_CONCURRENCY,
            ) as usize,
            progress_concurrency: read_u64(
                &lookup,
                "PLAYTRACK_PROGRESS_CONCURRENCY",
                DEFAULT_PROGRESS_CONCURRENCY,
            ) as usize,
            max_retries: read_u64(&lookup, "PLAYTRACK_MAX_RETRIES", DEFAULT_MAX_RETRIES)
                .min(u64::from(u32::MAX)) as u32,
            steam_api_url: optional("STEAM_API_URL"),
            steam_store_url: optional("STEAM_STORE_URL"),
            notion_api_url: optional("NOTION_API_URL"),
        })
    }

    /// Builds a fresh engine with its own clients for a single run.
    pub fn build_engine(&self) -> anyhow::Result<SyncEngine> {
        let steam = match (&self.steam_api_url, &self.steam_store_url) {
            (None, None) => SteamClient::new(&self.steam_api_key, &self.steam_id),
            (api, store) => SteamClient::with_base_urls(
                api.as_deref().unwrap_or(STEAM_API_URL),
                store.as_deref().unwrap_or(STEAM_STORE_URL),
                &self.steam_api_key,
                &self.steam_id,
            ),
        }
        .and_then(|client| client.with_timeout(self.request_timeout))
        .context("invalid steam client configuration")?;

        let notion = match &self.notion_api_url {
            Some(url) => {
                NotionClient::with_base_url(url, &self.notion_token, &self.notion_database_id)
            }
            None => NotionClient::new(&self.notion_token, &self.notion_database_id),
        }
        .and_then(|client| client.with_timeout(self.request_timeout))
        .context("invalid notion client configuration")?;

        Ok(SyncEngine::new(steam, notion, self.session_file.clone())
            .with_retry_policy(RetryPolicy::default().with_max_attempts(self.max_retries))
            .with_fetch_plans(
                FetchPlan::details().with_concurrency(self.detail_concurrency),
                FetchPlan::progress().with_concurrency(self.progress_concurrency),
            ))
    }
}

/// Blank values and untouched `your_...` placeholders count as unset.
fn required<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && !value.to_ascii_lowercase().starts_with("your_"))
}

fn read_u64<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn expand_with_home(value: &str, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(value);
    };
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn default_session_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("playtrack")
        .join(SESSION_FILE_NAME)
}
