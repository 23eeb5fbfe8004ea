mod notion;
mod status;
mod steam;

pub use reqwest::StatusCode;

pub use notion::{DatabasePage, NotionClient, NotionError, QueryPage};
pub use status::{ApiErrorClass, DEFAULT_REQUEST_TIMEOUT};
pub use steam::{
    Achievement, AchievementProgress, AppDetails, DEFAULT_API_URL as STEAM_API_URL,
    DEFAULT_STORE_URL as STEAM_STORE_URL, Genre, OwnedGame, PriceOverview, ReleaseDate,
    SteamClient, SteamError,
};
