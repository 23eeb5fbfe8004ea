use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

use crate::status::{ApiErrorClass, DEFAULT_REQUEST_TIMEOUT, build_http, classify_api_status};

pub const DEFAULT_API_URL: &str = "https://api.steampowered.com";
pub const DEFAULT_STORE_URL: &str = "https://store.steampowered.com";

#[derive(Debug, Error)]
pub enum SteamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

impl SteamError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            SteamError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }
}

/// Client for the Steam Web API (library, achievements) and the storefront
/// `appdetails` endpoint, which lives on a separate host.
#[derive(Clone)]
pub struct SteamClient {
    http: Client,
    api_url: Url,
    store_url: Url,
    api_key: String,
    steam_id: String,
}

impl SteamClient {
    pub fn new(
        api_key: impl Into<String>,
        steam_id: impl Into<String>,
    ) -> Result<Self, SteamError> {
        Self::with_base_urls(DEFAULT_API_URL, DEFAULT_STORE_URL, api_key, steam_id)
    }

    pub fn with_base_urls(
        api_url: &str,
        store_url: &str,
        api_key: impl Into<String>,
        steam_id: impl Into<String>,
    ) -> Result<Self, SteamError> {
        Ok(Self {
            http: build_http(DEFAULT_REQUEST_TIMEOUT)?,
            api_url: Url::parse(api_url)?,
            store_url: Url::parse(store_url)?,
            api_key: api_key.into(),
            steam_id: steam_id.into(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, SteamError> {
        self.http = build_http(timeout)?;
        Ok(self)
    }

    pub async fn get_owned_games(&self) -> Result<Vec<OwnedGame>, SteamError> {
        let mut url = self.api_url.join("/IPlayerService/GetOwnedGames/v0001/")?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("steamid", &self.steam_id)
            .append_pair("format", "json")
            .append_pair("include_appinfo", "1")
            .append_pair("include_played_free_games", "1");
        let response = self.http.get(url).send().await?;
        let payload: OwnedGamesResponse = Self::handle_response(response).await?;
        Ok(payload.response.games)
    }

    /// Returns `None` when the storefront has no data for the app.
    pub async fn get_app_details(&self, app_id: u32) -> Result<Option<AppDetails>, SteamError> {
        let mut url = self.store_url.join("/api/appdetails")?;
        url.query_pairs_mut().append_pair("appids", &app_id.to_string());
        let response = self.http.get(url).send().await?;
        let mut payload: HashMap<String, AppDetailsEnvelope> =
            Self::handle_response(response).await?;
        Ok(payload
            .remove(&app_id.to_string())
            .filter(|envelope| envelope.success)
            .and_then(|envelope| envelope.data))
    }

    pub async fn get_player_achievements(
        &self,
        app_id: u32,
    ) -> Result<AchievementProgress, SteamError> {
        let mut url = self.api_url.join("/ISteamUserStats/GetPlayerAchievements/v0001/")?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("steamid", &self.steam_id)
            .append_pair("appid", &app_id.to_string())
            .append_pair("format", "json");
        let response = self.http.get(url).send().await?;
        let payload: PlayerStatsResponse = Self::handle_response(response).await?;
        Ok(payload.playerstats)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SteamError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(SteamError::Api { status, body })
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OwnedGame {
    #[serde(rename = "appid")]
    pub app_id: u32,
    #[serde(default)]
    pub name: String,
    /// Cumulative minutes played.
    #[serde(rename = "playtime_forever", default)]
    pub playtime_minutes: u64,
    /// Unix seconds; `0` when the game was never launched.
    #[serde(rename = "rtime_last_played", default)]
    pub last_played: i64,
}

#[derive(Debug, Deserialize)]
struct OwnedGamesResponse {
    #[serde(default)]
    response: OwnedGamesBody,
}

#[derive(Debug, Default, Deserialize)]
struct OwnedGamesBody {
    #[serde(default)]
    games: Vec<OwnedGame>,
}

#[derive(Debug, Deserialize)]
struct AppDetailsEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<AppDetails>,
}

/// Storefront metadata. `AppDetails::default()` is the "unknown" record used
/// when the lookup failed or returned nothing.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AppDetails {
    #[serde(rename = "type", default)]
    pub app_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub price_overview: Option<PriceOverview>,
    #[serde(default)]
    pub developers: Vec<String>,
    #[serde(default)]
    pub publishers: Vec<String>,
    #[serde(default)]
    pub release_date: Option<ReleaseDate>,
    #[serde(default)]
    pub short_description: Option<String>,
}

impl AppDetails {
    pub fn is_empty(&self) -> bool {
        self.app_type.is_empty() && self.name.is_empty() && self.genres.is_empty()
    }

    pub fn genre_names(&self) -> impl Iterator<Item = &str> {
        self.genres.iter().map(|genre| genre.description.as_str())
    }

    /// Final price in minor currency units, if the app is sold.
    pub fn price_minor(&self) -> Option<u64> {
        self.price_overview.as_ref().map(|price| price.final_price)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Genre {
    #[serde(default)]
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PriceOverview {
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "final")]
    pub final_price: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ReleaseDate {
    #[serde(default)]
    pub coming_soon: bool,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Deserialize)]
struct PlayerStatsResponse {
    #[serde(default)]
    playerstats: AchievementProgress,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AchievementProgress {
    #[serde(default)]
    pub achievements: Vec<Achievement>,
}

impl AchievementProgress {
    /// Share of unlocked achievements as a percentage rounded to one decimal,
    /// `0.0` when the game has none.
    pub fn completion_percent(&self) -> f64 {
        let total = self.achievements.len();
        if total == 0 {
            return 0.0;
        }
        let achieved = self.achievements.iter().filter(|a| a.achieved).count();
        (achieved as f64 * 1000.0 / total as f64).round() / 10.0
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Achievement {
    #[serde(rename = "apiname", default)]
    pub api_name: String,
    #[serde(deserialize_with = "flag_from_int")]
    pub achieved: bool,
}

/// Steam reports flags as `0`/`1`; accept real booleans too.
fn flag_from_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(u8),
        Bool(bool),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Int(value) => value != 0,
        Flag::Bool(value) => value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_rounds_to_one_decimal() {
        let progress = AchievementProgress {
            achievements: vec![
                Achievement {
                    api_name: "A".into(),
                    achieved: true,
                },
                Achievement {
                    api_name: "B".into(),
                    achieved: false,
                },
                Achievement {
                    api_name: "C".into(),
                    achieved: false,
                },
            ],
        };
        assert_eq!(progress.completion_percent(), 33.3);
    }

    #[test]
    fn completion_of_empty_list_is_zero() {
        assert_eq!(AchievementProgress::default().completion_percent(), 0.0);
    }

    #[test]
    fn default_details_are_empty() {
        assert!(AppDetails::default().is_empty());
        assert_eq!(AppDetails::default().price_minor(), None);
    }
}
