use playtrack_core::{AppDetails, OwnedGame};
use serde_json::{Map, Value, json};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

pub const PROP_TITLE: &str = "Game Name";
pub const PROP_APP_ID: &str = "App ID";
pub const PROP_HOURS: &str = "Hours Played";
pub const PROP_SESSIONS: &str = "Session Count";
pub const PROP_ACHIEVEMENTS: &str = "Achievement Completion";
pub const PROP_LAST_PLAYED: &str = "Last Played";
pub const PROP_RECENT_SESSION: &str = "Most Recent Session";
pub const PROP_GENRES: &str = "Genres";
pub const PROP_PRICE: &str = "Price";
pub const PROP_COST_PER_HOUR: &str = "Cost Per Hour";
pub const PROP_DEVELOPER: &str = "Developer";
pub const PROP_PUBLISHER: &str = "Publisher";
pub const PROP_RELEASE_DATE: &str = "Release Date";
pub const PROP_DESCRIPTION: &str = "Description";
pub const PROP_STATUS: &str = "Status";
pub const PROP_PLATFORM: &str = "Platform";

const MAX_GENRES: usize = 5;
const MAX_TEXT_CHARS: usize = 2000;

/// One trackable game with everything the database row is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEntry {
    pub game: OwnedGame,
    pub details: AppDetails,
    pub session_count: u32,
    pub achievement_completion: f64,
}

impl GameEntry {
    pub fn app_id(&self) -> u32 {
        self.game.app_id
    }

    pub fn title(&self) -> &str {
        [self.game.name.as_str(), self.details.name.as_str()]
            .into_iter()
            .find(|name| !name.trim().is_empty())
            .unwrap_or("Unknown")
    }

    pub fn hours_played(&self) -> f64 {
        round_to(self.game.playtime_minutes as f64 / 60.0, 1)
    }

    /// Price in major currency units, when the game is sold for money.
    pub fn price(&self) -> Option<f64> {
        self.details
            .price_minor()
            .filter(|cents| *cents > 0)
            .map(|cents| cents as f64 / 100.0)
    }

    pub fn cost_per_hour(&self) -> Option<f64> {
        let hours = self.hours_played();
        let price = self.price()?;
        (hours > 0.0).then(|| round_to(price / hours, 2))
    }

    pub fn last_played_at(&self) -> Option<String> {
        if self.game.last_played <= 0 {
            return None;
        }
        OffsetDateTime::from_unix_timestamp(self.game.last_played)
            .ok()?
            .format(&Rfc3339)
            .ok()
    }

    pub fn release_date(&self) -> Option<String> {
        let text = &self.details.release_date.as_ref()?.date;
        let date = parse_release_date(text)?;
        date.format(format_description!("[year]-[month]-[day]")).ok()
    }

    /// Full property set for a new row.
    pub fn create_properties(&self) -> Map<String, Value> {
        let mut props = self.update_properties();
        props.insert(PROP_TITLE.into(), title(self.title()));
        props.insert(PROP_APP_ID.into(), number(self.app_id()));

        if let Some(at) = self.last_played_at() {
            props.insert(PROP_LAST_PLAYED.into(), date(&at));
            props.insert(PROP_RECENT_SESSION.into(), date(&at));
        }
        let genres: Vec<&str> = self.details.genre_names().take(MAX_GENRES).collect();
        if !genres.is_empty() {
            props.insert(PROP_GENRES.into(), multi_select(&genres));
        }
        if let Some(price) = self.price() {
            props.insert(PROP_PRICE.into(), number(price));
        }
        if let Some(cost) = self.cost_per_hour() {
            props.insert(PROP_COST_PER_HOUR.into(), number(cost));
        }
        if !self.details.developers.is_empty() {
            props.insert(
                PROP_DEVELOPER.into(),
                rich_text(&self.details.developers.join(", ")),
            );
        }
        if !self.details.publishers.is_empty() {
            props.insert(
                PROP_PUBLISHER.into(),
                rich_text(&self.details.publishers.join(", ")),
            );
        }
        if let Some(released) = self.release_date() {
            props.insert(PROP_RELEASE_DATE.into(), date(&released));
        }
        if let Some(text) = self
            .details
            .short_description
            .as_deref()
            .filter(|text| !text.trim().is_empty())
        {
            props.insert(PROP_DESCRIPTION.into(), rich_text(text));
        }
        props.insert(PROP_STATUS.into(), json!({ "select": { "name": "Owned" } }));
        props.insert(PROP_PLATFORM.into(), multi_select(&["Steam"]));
        props
    }

    /// Usage metrics only; hand-edited columns are never touched.
    pub fn update_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert(PROP_HOURS.into(), number(self.hours_played()));
        props.insert(PROP_SESSIONS.into(), number(self.session_count));
        props.insert(
            PROP_ACHIEVEMENTS.into(),
            number(self.achievement_completion),
        );
        props
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn number(value: impl Into<Value>) -> Value {
    json!({ "number": value.into() })
}

fn title(text: &str) -> Value {
    json!({ "title": [{ "text": { "content": truncate(text) } }] })
}

fn rich_text(text: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": truncate(text) } }] })
}

fn date(start: &str) -> Value {
    json!({ "date": { "start": start } })
}

fn multi_select(names: &[&str]) -> Value {
    let options: Vec<Value> = names.iter().map(|name| json!({ "name": name })).collect();
    json!({ "multi_select": options })
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_CHARS).collect()
}

/// Storefront dates come as `Apr 18, 2011`, `18 Apr, 2011`, `Apr 2011` or `2011`.
fn parse_release_date(text: &str) -> Option<Date> {
    let cleaned = text.replace(',', " ");
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    let (year, month, day) = match parts.as_slice() {
        [month, day, year] if month_from_abbrev(month).is_some() => {
            (year, month_from_abbrev(month)?, day.parse().ok()?)
        }
        [day, month, year] => (year, month_from_abbrev(month)?, day.parse().ok()?),
        [month, year] => (year, month_from_abbrev(month)?, 1),
        [year] => (year, Month::January, 1),
        _ => return None,
    };
    Date::from_calendar_date(year.parse().ok()?, month, day).ok()
}

fn month_from_abbrev(name: &str) -> Option<Month> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    Some(match prefix.as_str() {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    })
}
