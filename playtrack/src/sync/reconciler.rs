use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use playtrack_core::{ApiErrorClass, NotionClient, NotionError};

use super::entry::{GameEntry, PROP_APP_ID};

/// Batch shape for database writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePlan {
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub page_size: u32,
}

impl Default for WritePlan {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pause: Duration::from_secs(1),
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileTally {
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
}

impl ReconcileTally {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.errors
    }
}

#[derive(Debug, Default)]
pub struct Partition {
    pub to_create: Vec<GameEntry>,
    pub to_update: Vec<(String, GameEntry)>,
}

/// Routes entries with a known page id to updates and the rest to creates.
pub fn partition(entries: Vec<GameEntry>, existing: &HashMap<u32, String>) -> Partition {
    let mut plan = Partition::default();
    for entry in entries {
        match existing.get(&entry.app_id()) {
            Some(page_id) => plan.to_update.push((page_id.clone(), entry)),
            None => plan.to_create.push(entry),
        }
    }
    plan
}

pub struct Reconciler<'a> {
    client: &'a NotionClient,
    plan: WritePlan,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a NotionClient, plan: WritePlan) -> Self {
        Self { client, plan }
    }

    /// Collects `app_id -> page_id` for every row in the database. A failed
    /// page ends the scan early and whatever was collected is returned.
    pub async fn existing_pages(&self) -> HashMap<u32, String> {
        let mut existing = HashMap::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = match self
                .client
                .query_database(cursor.as_deref(), self.plan.page_size)
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    tracing::error!(
                        "listing rows failed after {} entries, using partial map: {err}",
                        existing.len()
                    );
                    break;
                }
            };
            for row in &page.results {
                if let Some(app_id) = row.number_id(PROP_APP_ID) {
                    existing.insert(app_id, row.id.clone());
                }
            }
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }
        existing
    }

    pub async fn reconcile(&self, entries: Vec<GameEntry>) -> ReconcileTally {
        let existing = self.existing_pages().await;
        let Partition {
            to_create,
            to_update,
        } = partition(entries, &existing);
        tracing::info!(
            "reconciling {} rows: {} to create, {} to update",
            to_create.len() + to_update.len(),
            to_create.len(),
            to_update.len()
        );

        let mut tally = ReconcileTally::default();
        let (created, failed) = self.create_all(&to_create).await;
        tally.created = created;
        tally.errors += failed;
        let (updated, failed) = self.update_all(&to_update).await;
        tally.updated = updated;
        tally.errors += failed;
        tally
    }

    async fn create_all(&self, entries: &[GameEntry]) -> (usize, usize) {
        let mut ok = 0;
        let mut failed = 0;
        for (index, batch) in entries.chunks(self.plan.batch_size.max(1)).enumerate() {
            self.pace(index).await;
            let writes = batch.iter().map(|entry| async move {
                match self.client.create_page(entry.create_properties()).await {
                    Ok(_) => {
                        tracing::info!("created entry for {}", entry.title());
                        true
                    }
                    Err(err) => {
                        log_write_failure("create", entry, &err);
                        false
                    }
                }
            });
            for success in join_all(writes).await {
                if success {
                    ok += 1;
                } else {
                    failed += 1;
                }
            }
        }
        (ok, failed)
    }

    async fn update_all(&self, entries: &[(String, GameEntry)]) -> (usize, usize) {
        let mut ok = 0;
        let mut failed = 0;
        for (index, batch) in entries.chunks(self.plan.batch_size.max(1)).enumerate() {
            self.pace(index).await;
            let writes = batch.iter().map(|(page_id, entry)| async move {
                match self
                    .client
                    .update_page(page_id, entry.update_properties())
                    .await
                {
                    Ok(_) => {
                        tracing::debug!("updated entry for {}", entry.title());
                        true
                    }
                    Err(err) => {
                        log_write_failure("update", entry, &err);
                        false
                    }
                }
            });
            for success in join_all(writes).await {
                if success {
                    ok += 1;
                } else {
                    failed += 1;
                }
            }
        }
        (ok, failed)
    }

    async fn pace(&self, batch_index: usize) {
        if batch_index > 0 && !self.plan.batch_pause.is_zero() {
            tokio::time::sleep(self.plan.batch_pause).await;
        }
    }
}

fn log_write_failure(action: &str, entry: &GameEntry, err: &NotionError) {
    tracing::error!(
        "failed to {action} entry for {} (app {}): {err}",
        entry.title(),
        entry.app_id()
    );
    if err.classification() == Some(ApiErrorClass::RateLimit) {
        tracing::warn!("database is rate limiting writes; consider a smaller write batch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playtrack_core::{AppDetails, OwnedGame};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn entry(app_id: u32) -> GameEntry {
        GameEntry {
            game: OwnedGame {
                app_id,
                name: format!("Game {app_id}"),
                playtime_minutes: 90,
                last_played: 1_700_000_000,
            },
            details: AppDetails {
                app_type: "game".into(),
                ..AppDetails::default()
            },
            session_count: 1,
            achievement_completion: 0.0,
        }
    }

    fn fast_plan() -> WritePlan {
        WritePlan {
            batch_size: 2,
            batch_pause: Duration::from_millis(1),
            page_size: 100,
        }
    }

    fn row(app_id: u32) -> Value {
        json!({
            "id": format!("page-{app_id}"),
            "properties": { "App ID": { "type": "number", "number": app_id } }
        })
    }

    fn client_for(server: &MockServer) -> NotionClient {
        NotionClient::with_base_url(&server.uri(), "token", "db").unwrap()
    }

    #[test]
    fn partition_routes_known_ids_to_update() {
        let existing = HashMap::from([(2, "page-2".to_string()), (4, "page-4".to_string())]);
        let plan = partition((1..=5).map(entry).collect(), &existing);

        assert_eq!(plan.to_update.len(), 2);
        assert_eq!(plan.to_create.len(), 3);
        assert_eq!(plan.to_update[0].0, "page-2");
        assert!(plan.to_create.iter().all(|e| !existing.contains_key(&e.app_id())));
    }

    #[tokio::test]
    async fn existing_pages_follows_cursor_across_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .and(body_partial_json(json!({ "start_cursor": "c2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [row(3)],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [row(1), row(2), { "id": "no-id", "properties": {} }],
                "has_more": true,
                "next_cursor": "c2"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let existing = Reconciler::new(&client, fast_plan()).existing_pages().await;

        assert_eq!(existing.len(), 3);
        assert_eq!(existing[&3], "page-3");
    }

    #[tokio::test]
    async fn existing_pages_keeps_partial_map_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .and(body_partial_json(json!({ "start_cursor": "c2" })))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [row(1)],
                "has_more": true,
                "next_cursor": "c2"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let existing = Reconciler::new(&client, fast_plan()).existing_pages().await;

        assert_eq!(existing.len(), 1);
        assert_eq!(existing[&1], "page-1");
    }

    #[tokio::test]
    async fn reconcile_tallies_creates_updates_and_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [row(1), row(2)],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path_regex("^/v1/pages/page-[12]$"))
            .and(body_partial_json(json!({ "properties": { "Session Count": { "number": 1 } } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .and(body_partial_json(json!({ "properties": { "App ID": { "number": 5 } } })))
            .respond_with(ResponseTemplate::new(400).set_body_string("validation_error"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "new" })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tally = Reconciler::new(&client, fast_plan())
            .reconcile((1..=5).map(entry).collect())
            .await;

        assert_eq!(
            tally,
            ReconcileTally {
                created: 2,
                updated: 2,
                errors: 1,
            }
        );
        assert_eq!(tally.total(), 5);
    }

    #[tokio::test]
    async fn success_status_counts_even_without_page_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [row(1)],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "page" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/v1/pages/page-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tally = Reconciler::new(&client, fast_plan())
            .reconcile(vec![entry(1), entry(2)])
            .await;

        assert_eq!(
            tally,
            ReconcileTally {
                created: 1,
                updated: 1,
                errors: 0,
            }
        );
    }

    const SLOW_WRITE: Duration = Duration::from_millis(200);

    /// Records when each write arrives and answers after `SLOW_WRITE`.
    #[derive(Clone, Default)]
    struct ArrivalLog {
        arrivals: Arc<Mutex<Vec<Instant>>>,
    }

    impl ArrivalLog {
        fn sorted(&self) -> Vec<Instant> {
            let mut arrivals = self.arrivals.lock().unwrap().clone();
            arrivals.sort();
            arrivals
        }
    }

    impl Respond for ArrivalLog {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            self.arrivals.lock().unwrap().push(Instant::now());
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "x" }))
                .set_delay(SLOW_WRITE)
        }
    }

    /// With batches of two, no three writes may overlap, and each batch
    /// waits for the previous one to be answered.
    fn assert_batches_of_two(arrivals: &[Instant], expected: usize) {
        assert_eq!(arrivals.len(), expected);
        for window in arrivals.windows(3) {
            assert!(
                window[2].duration_since(window[0]) >= SLOW_WRITE,
                "three writes in flight at once"
            );
        }
        for pair in arrivals.chunks(2) {
            if let [first, second] = pair {
                assert!(second.duration_since(*first) < SLOW_WRITE);
            }
        }
    }

    #[tokio::test]
    async fn write_batches_never_overlap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [row(1), row(2), row(3)],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;
        let creates = ArrivalLog::default();
        let updates = ArrivalLog::default();
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(creates.clone())
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(updates.clone())
            .mount(&server)
            .await;

        let client = client_for(&server);
        let plan = WritePlan {
            batch_size: 2,
            batch_pause: Duration::ZERO,
            page_size: 100,
        };
        let tally = Reconciler::new(&client, plan)
            .reconcile((1..=8).map(entry).collect())
            .await;

        assert_eq!(tally.created, 5);
        assert_eq!(tally.updated, 3);
        assert_batches_of_two(&creates.sorted(), 5);
        assert_batches_of_two(&updates.sorted(), 3);
    }

    /// In-memory stand-in for the database: creates become rows that later
    /// queries return.
    #[derive(Clone, Default)]
    struct FakeDatabase {
        rows: Arc<Mutex<Vec<Value>>>,
    }

    impl Respond for FakeDatabase {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let mut rows = self.rows.lock().unwrap();
            if request.url.path().ends_with("/query") {
                return ResponseTemplate::new(200).set_body_json(json!({
                    "results": *rows,
                    "has_more": false,
                    "next_cursor": null
                }));
            }
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let app_id = body["properties"]["App ID"]["number"].clone();
            let id = format!("page-{}", rows.len() + 1);
            rows.push(json!({ "id": id, "properties": { "App ID": { "number": app_id } } }));
            ResponseTemplate::new(200).set_body_json(json!({ "id": id }))
        }
    }

    #[tokio::test]
    async fn second_run_with_same_input_only_updates() {
        let server = MockServer::start().await;
        let database = FakeDatabase::default();
        Mock::given(method("POST"))
            .respond_with(database.clone())
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reconciler = Reconciler::new(&client, fast_plan());
        let entries: Vec<GameEntry> = (10..14).map(entry).collect();

        let first = reconciler.reconcile(entries.clone()).await;
        assert_eq!(first.created, 4);
        assert_eq!(first.updated, 0);

        let second = reconciler.reconcile(entries).await;
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 4);
        assert_eq!(database.rows.lock().unwrap().len(), 4);
    }
}
