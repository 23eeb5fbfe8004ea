use playtrack_core::OwnedGame;

use super::session::SessionStore;

const TOP_GAMES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct GameSessions {
    pub name: String,
    pub sessions: u32,
    pub hours_per_session: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub total_sessions: u64,
    pub tracked_games: usize,
    pub average_sessions: f64,
    /// Most-played games by session count, at most ten.
    pub top: Vec<GameSessions>,
}

/// Joins the persisted session state with the current library. Games that
/// were never observed are ignored.
pub fn summarize(store: &SessionStore, games: &[OwnedGame]) -> SessionSummary {
    let mut total_sessions = 0u64;
    let mut tracked_games = 0usize;
    let mut top = Vec::new();

    for game in games {
        let Some(state) = store.get(game.app_id) else {
            continue;
        };
        tracked_games += 1;
        total_sessions += u64::from(state.session_count);
        if state.session_count > 0 {
            let hours = game.playtime_minutes as f64 / 60.0;
            top.push(GameSessions {
                name: game.name.clone(),
                sessions: state.session_count,
                hours_per_session: round1(hours / f64::from(state.session_count)),
            });
        }
    }

    top.sort_by(|a, b| b.sessions.cmp(&a.sessions).then_with(|| a.name.cmp(&b.name)));
    top.truncate(TOP_GAMES);

    let average_sessions = if tracked_games == 0 {
        0.0
    } else {
        round1(total_sessions as f64 / tracked_games as f64)
    };

    SessionSummary {
        total_sessions,
        tracked_games,
        average_sessions,
        top,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
