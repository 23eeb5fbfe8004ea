use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use playtrack_core::{
    AchievementProgress, AppDetails, NotionClient, NotionError, OwnedGame, SteamClient,
    SteamError,
};
use thiserror::Error;

use super::entry::GameEntry;
use super::fetcher::{ConcurrentFetcher, FetchPlan};
use super::reconciler::{ReconcileTally, Reconciler, WritePlan};
use super::retry::{Outcome, RetryPolicy, retry_call};
use super::session::{SessionError, SessionStore, SessionTracker};
use super::stats::{SessionSummary, summarize};
use super::validator;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("steam api error: {0}")]
    Steam(#[from] SteamError),
    #[error("notion api error: {0}")]
    Notion(#[from] NotionError),
    #[error("session store error: {0}")]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    pub skipped: usize,
    pub processed: usize,
    pub elapsed: Duration,
    /// Inventory items processed per second.
    pub throughput: f64,
}

impl SyncReport {
    fn new(processed: usize, skipped: usize, tally: ReconcileTally, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        Self {
            created: tally.created,
            updated: tally.updated,
            errors: tally.errors,
            skipped,
            processed,
            elapsed,
            throughput: if secs > 0.0 {
                processed as f64 / secs
            } else {
                0.0
            },
        }
    }
}

/// One sync run. The engine owns both API clients and is consumed by the
/// run, so the connections are released on every exit path.
pub struct SyncEngine {
    steam: SteamClient,
    notion: NotionClient,
    session_file: PathBuf,
    retry: RetryPolicy,
    details: ConcurrentFetcher,
    progress: ConcurrentFetcher,
    writes: WritePlan,
}

impl SyncEngine {
    pub fn new(steam: SteamClient, notion: NotionClient, session_file: PathBuf) -> Self {
        let retry = RetryPolicy::default();
        Self {
            steam,
            notion,
            session_file,
            retry,
            details: ConcurrentFetcher::new(FetchPlan::details(), retry),
            progress: ConcurrentFetcher::new(FetchPlan::progress(), retry),
            writes: WritePlan::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self.details = ConcurrentFetcher::new(self.details.plan(), retry);
        self.progress = ConcurrentFetcher::new(self.progress.plan(), retry);
        self
    }

    pub fn with_fetch_plans(mut self, details: FetchPlan, progress: FetchPlan) -> Self {
        self.details = ConcurrentFetcher::new(details, self.retry);
        self.progress = ConcurrentFetcher::new(progress, self.retry);
        self
    }

    pub fn with_write_plan(mut self, writes: WritePlan) -> Self {
        self.writes = writes;
        self
    }

    pub async fn run(self, include_achievements: bool) -> Result<SyncReport, EngineError> {
        tracing::info!(
            "starting sync (achievements {})",
            if include_achievements {
                "enabled"
            } else {
                "disabled"
            }
        );
        let result = self.sync(include_achievements).await;
        match &result {
            Ok(report) => tracing::info!(
                "sync completed: created={}, updated={}, errors={}, skipped={}, {:.2} items/s",
                report.created,
                report.updated,
                report.errors,
                report.skipped,
                report.throughput
            ),
            Err(err) => tracing::error!("sync failed: {err}"),
        }
        result
    }

    /// Observes every owned game without touching the database.
    pub async fn refresh_sessions(self) -> Result<usize, EngineError> {
        let games = self.owned_games().await?;
        let mut tracker = SessionTracker::new(SessionStore::load(&self.session_file)?);
        for game in &games {
            tracker.observe(game.app_id, game.playtime_minutes, game.last_played)?;
        }
        tracing::info!("updated session counts for {} games", games.len());
        Ok(games.len())
    }

    pub async fn session_stats(self) -> Result<SessionSummary, EngineError> {
        let games = self.owned_games().await?;
        let store = SessionStore::load(&self.session_file)?;
        Ok(summarize(&store, &games))
    }

    async fn sync(&self, include_achievements: bool) -> Result<SyncReport, EngineError> {
        let started = Instant::now();
        let games = self.owned_games().await?;
        if games.is_empty() {
            tracing::warn!("no games found in the library");
            return Ok(SyncReport::default());
        }
        let processed = games.len();
        let mut tracker = SessionTracker::new(SessionStore::load(&self.session_file)?);

        let ids: Vec<u32> = games.iter().map(|game| game.app_id).collect();
        let steam = &self.steam;
        let mut details = self
            .details
            .fetch_all("details", &ids, move |id| async move {
                steam
                    .get_app_details(id)
                    .await
                    .map(Option::unwrap_or_default)
            })
            .await;

        let mut skipped = 0;
        let mut trackable: Vec<(OwnedGame, AppDetails)> = Vec::with_capacity(games.len());
        for game in games {
            let detail = details.remove(&game.app_id).unwrap_or_default();
            match validator::check(&detail) {
                Ok(()) => trackable.push((game, detail)),
                Err(reason) => {
                    tracing::debug!("skipping {} ({}): {reason}", game.name, game.app_id);
                    skipped += 1;
                }
            }
        }

        let progress: HashMap<u32, AchievementProgress> = if include_achievements {
            let ids: Vec<u32> = trackable.iter().map(|(game, _)| game.app_id).collect();
            self.progress
                .fetch_all("achievements", &ids, move |id| {
                    steam.get_player_achievements(id)
                })
                .await
        } else {
            HashMap::new()
        };

        let mut entries = Vec::with_capacity(trackable.len());
        for (game, details) in trackable {
            let session_count =
                tracker.observe(game.app_id, game.playtime_minutes, game.last_played)?;
            let achievement_completion = progress
                .get(&game.app_id)
                .map(AchievementProgress::completion_percent)
                .unwrap_or(0.0);
            entries.push(GameEntry {
                game,
                details,
                session_count,
                achievement_completion,
            });
        }

        let tally = Reconciler::new(&self.notion, self.writes)
            .reconcile(entries)
            .await;
        Ok(SyncReport::new(processed, skipped, tally, started.elapsed()))
    }

    async fn owned_games(&self) -> Result<Vec<OwnedGame>, EngineError> {
        let attempted =
            retry_call(&self.retry, "owned games", || self.steam.get_owned_games()).await;
        match attempted.outcome {
            Outcome::Success(games) => Ok(games),
            Outcome::Terminal(err) | Outcome::Exhausted(err) => Err(err.into()),
        }
    }
}
