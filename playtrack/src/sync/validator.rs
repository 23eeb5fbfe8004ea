use playtrack_core::AppDetails;

const GAME_TYPE: &str = "game";

/// Storefront genres that mark tools rather than games.
pub const NON_GAME_GENRES: &[&str] = &[
    "Utilities",
    "Software",
    "Video Production",
    "Animation & Modeling",
    "Design & Illustration",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoDetails,
    NotAGame(String),
    NoGenres,
    OnlyToolGenres,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoDetails => write!(f, "no storefront details"),
            SkipReason::NotAGame(kind) => write!(f, "type is {kind}"),
            SkipReason::NoGenres => write!(f, "no genres found"),
            SkipReason::OnlyToolGenres => write!(f, "only non-game genres found"),
        }
    }
}

pub fn check(details: &AppDetails) -> Result<(), SkipReason> {
    if details.is_empty() {
        return Err(SkipReason::NoDetails);
    }
    if !details.app_type.eq_ignore_ascii_case(GAME_TYPE) {
        return Err(SkipReason::NotAGame(details.app_type.clone()));
    }
    if details.genres.is_empty() {
        return Err(SkipReason::NoGenres);
    }
    if details
        .genre_names()
        .all(|name| NON_GAME_GENRES.contains(&name))
    {
        return Err(SkipReason::OnlyToolGenres);
    }
    Ok(())
}

pub fn is_trackable(details: &AppDetails) -> bool {
    check(details).is_ok()
}
