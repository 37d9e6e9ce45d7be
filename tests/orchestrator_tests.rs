//! Integration tests for the orchestrator
//!
//! These tests run the full dispatcher over scripted and wiremock-backed
//! fetchers, end-to-end against real SQLite databases.

use async_trait::async_trait;
use harrow::backlog::{task_key, BacklogEntry};
use harrow::classify::{BackoffPolicy, FailureSignal};
use harrow::dispatch::{Dispatcher, RunOutcome};
use harrow::engine::{EngineSettings, HttpFetcher, JsonExtractor, PageFetcher, RawPage};
use harrow::identity::{AuthMaterial, Identity, IdentityPool, PoolConfig};
use harrow::state::TaskStatus;
use harrow::storage::{SqliteStore, Store};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fetcher that replays a per-term script of pages and failures
struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<RawPage, FailureSignal>>>>,
}

impl ScriptedFetcher {
    fn new(scripts: Vec<(&str, Vec<Result<RawPage, FailureSignal>>)>) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(term, pages)| (term.to_string(), pages.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(
        &self,
        search_term: &str,
        _cursor: Option<&str>,
        _identity: &Identity,
    ) -> Result<RawPage, FailureSignal> {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(search_term)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(FailureSignal::Timeout))
    }
}

fn page_with(ids: &[&str], cursor: Option<&str>) -> Result<RawPage, FailureSignal> {
    let edges: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({ "node": {
                "id": id,
                "name": format!("Group {}", id),
                "url": format!("https://example.com/groups/{}", id)
            }})
        })
        .collect();
    Ok(RawPage {
        body: json!({
            "data": { "results": {
                "edges": edges,
                "page_info": { "end_cursor": cursor }
            }}
        }),
    })
}

fn entry(term: &str) -> BacklogEntry {
    BacklogEntry {
        key: task_key(term),
        search_term: term.to_string(),
        source_ref: None,
    }
}

fn identity(id: &str) -> Identity {
    Identity {
        id: id.to_string(),
        auth: AuthMaterial {
            cookie_header: format!("c_user={}", id),
            access_token: None,
        },
        proxy_url: None,
    }
}

fn pool(ids: &[&str], threshold: u32, session_cooldown: Duration) -> Arc<IdentityPool> {
    Arc::new(IdentityPool::new(
        ids.iter().map(|id| identity(id)).collect(),
        PoolConfig {
            retirement_threshold: threshold,
            rate_limit_cooldown: Duration::ZERO,
            session_cooldown,
        },
    ))
}

fn settings() -> EngineSettings {
    EngineSettings {
        max_retries: 2,
        zero_streak_limit: 3,
        max_pages_per_task: 1000,
        page_delay: Duration::ZERO,
        backoff: BackoffPolicy {
            base: Duration::ZERO,
            cap: Duration::ZERO,
            rate_limit: Duration::ZERO,
            parse_error_limit: 2,
        },
    }
}

async fn run_dispatcher(
    store: Arc<Mutex<SqliteStore>>,
    pool: Arc<IdentityPool>,
    fetcher: Arc<dyn PageFetcher>,
    backlog: &[BacklogEntry],
) -> RunOutcome {
    let run_id = store.lock().unwrap().create_run("test-hash").unwrap();
    let dispatcher = Dispatcher::new(
        store,
        pool,
        fetcher,
        Arc::new(JsonExtractor::new()),
        settings(),
        1,
    );
    let (_tx, rx) = watch::channel(false);
    dispatcher.run(run_id, backlog, rx).await.unwrap()
}

#[tokio::test]
async fn test_recovering_task_keeps_its_retry_count() {
    // One task fails twice with network errors, then finds a page of
    // records, then drains on three consecutive empty pages. The retry
    // budget (2) is fully spent but never exceeded.
    let fetcher = ScriptedFetcher::new(vec![(
        "vintage bikes",
        vec![
            Err(FailureSignal::Timeout),
            Err(FailureSignal::Connect("reset".to_string())),
            page_with(&["1", "2"], Some("c1")),
            page_with(&[], Some("c2")),
            page_with(&[], Some("c3")),
            page_with(&[], Some("c4")),
        ],
    )]);

    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let outcome = run_dispatcher(
        Arc::clone(&store),
        pool(&["id-1"], 10, Duration::ZERO),
        Arc::new(fetcher),
        &[entry("vintage bikes")],
    )
    .await;

    assert_eq!(outcome, RunOutcome::BacklogDrained);

    let store = store.lock().unwrap();
    let task = store.get_task(&task_key("vintage bikes")).unwrap();
    assert_eq!(task.status, TaskStatus::CompletedZeroStreak);
    assert_eq!(task.retry_count, 2);
    assert_eq!(task.pages_fetched, 4);
    assert_eq!(task.records_found, 2);
    assert_eq!(store.count_records().unwrap(), 2);
}

#[tokio::test]
async fn test_records_deduplicated_across_tasks() {
    // Both searches surface record "77"; it must be persisted once
    let fetcher = ScriptedFetcher::new(vec![
        ("alpha", vec![page_with(&["77", "78"], None)]),
        ("beta", vec![page_with(&["77", "79"], None)]),
    ]);

    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let outcome = run_dispatcher(
        Arc::clone(&store),
        pool(&["id-1", "id-2"], 3, Duration::ZERO),
        Arc::new(fetcher),
        &[entry("alpha"), entry("beta")],
    )
    .await;

    assert_eq!(outcome, RunOutcome::BacklogDrained);
    assert_eq!(store.lock().unwrap().count_records().unwrap(), 3);
}

#[tokio::test]
async fn test_completed_run_resumes_without_refetching() {
    let db = tempfile::NamedTempFile::new().unwrap();

    {
        let fetcher = ScriptedFetcher::new(vec![("alpha", vec![page_with(&["1"], None)])]);
        let store = Arc::new(Mutex::new(SqliteStore::new(db.path()).unwrap()));
        let outcome = run_dispatcher(
            Arc::clone(&store),
            pool(&["id-1"], 3, Duration::ZERO),
            Arc::new(fetcher),
            &[entry("alpha")],
        )
        .await;
        assert_eq!(outcome, RunOutcome::BacklogDrained);
    }

    // Second run over the same database: the task is terminal, so the
    // fetcher must never be called (it would yield timeouts if it were)
    {
        let fetcher = ScriptedFetcher::new(vec![]);
        let store = Arc::new(Mutex::new(SqliteStore::new(db.path()).unwrap()));
        let outcome = run_dispatcher(
            Arc::clone(&store),
            pool(&["id-1"], 3, Duration::ZERO),
            Arc::new(fetcher),
            &[entry("alpha")],
        )
        .await;

        assert_eq!(outcome, RunOutcome::BacklogDrained);

        let store = store.lock().unwrap();
        let task = store.get_task(&task_key("alpha")).unwrap();
        assert_eq!(task.status, TaskStatus::CompletedNoCursor);
        assert_eq!(task.retry_count, 0);
        assert_eq!(store.count_records().unwrap(), 1);
    }
}

/// Fetcher that fails on one identity and succeeds on the others
struct FlakyIdentityFetcher {
    bad_identity: String,
    pages: Mutex<VecDeque<Result<RawPage, FailureSignal>>>,
}

#[async_trait]
impl PageFetcher for FlakyIdentityFetcher {
    async fn fetch_page(
        &self,
        _search_term: &str,
        _cursor: Option<&str>,
        identity: &Identity,
    ) -> Result<RawPage, FailureSignal> {
        if identity.id == self.bad_identity {
            return Err(FailureSignal::LoginRedirect);
        }
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(FailureSignal::Timeout))
    }
}

#[tokio::test]
async fn test_task_survives_a_dead_identity() {
    // One identity's session is dead; every fetch through it fails. The
    // pool parks it on a long cooldown and the healthy identity finishes
    // the task within the retry budget.
    let fetcher = FlakyIdentityFetcher {
        bad_identity: "bad".to_string(),
        pages: Mutex::new(vec![page_with(&["1"], None)].into()),
    };

    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let outcome = run_dispatcher(
        Arc::clone(&store),
        pool(&["bad", "good"], 3, Duration::from_secs(120)),
        Arc::new(fetcher),
        &[entry("alpha")],
    )
    .await;

    assert_eq!(outcome, RunOutcome::BacklogDrained);

    let store = store.lock().unwrap();
    let task = store.get_task(&task_key("alpha")).unwrap();
    assert_eq!(task.status, TaskStatus::CompletedNoCursor);
    assert_eq!(store.count_records().unwrap(), 1);
}

#[tokio::test]
async fn test_exhausted_pool_ends_run_with_work_left() {
    let fetcher = ScriptedFetcher::new(vec![("alpha", vec![])]);

    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let outcome = run_dispatcher(
        Arc::clone(&store),
        pool(&["id-1"], 2, Duration::ZERO),
        Arc::new(fetcher),
        &[entry("alpha")],
    )
    .await;

    assert_eq!(outcome, RunOutcome::IdentitiesExhausted);

    let store = store.lock().unwrap();
    assert_eq!(store.retired_identities().unwrap(), vec!["id-1"]);
    assert!(!store.backlog_drained().unwrap());
    assert_eq!(
        store.get_latest_run().unwrap().unwrap().outcome,
        Some(RunOutcome::IdentitiesExhausted)
    );
}

// ===== HTTP fetcher against a mock server =====

#[tokio::test]
async fn test_http_fetcher_paginates_against_mock_server() {
    let mock_server = MockServer::start().await;

    // First page: no cursor in the request
    Mock::given(method("POST"))
        .and(path("/api/search"))
        .and(body_partial_json(json!({ "q": "vintage bikes", "cursor": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "results": {
                "edges": [ { "node": { "id": "1", "name": "One", "url": "https://x/1" } } ],
                "page_info": { "end_cursor": "c1" }
            }}
        })))
        .mount(&mock_server)
        .await;

    // Second page: cursor c1, no further cursor
    Mock::given(method("POST"))
        .and(path("/api/search"))
        .and(body_partial_json(json!({ "cursor": "c1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "results": {
                "edges": [ { "node": { "id": "2", "name": "Two", "url": "https://x/2" } } ],
                "page_info": { "end_cursor": null }
            }}
        })))
        .mount(&mock_server)
        .await;

    let endpoint = format!("{}/api/search", mock_server.uri());
    let fetcher = Arc::new(HttpFetcher::new(&endpoint, Duration::from_secs(5)));

    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let outcome = run_dispatcher(
        Arc::clone(&store),
        pool(&["id-1"], 3, Duration::ZERO),
        fetcher,
        &[entry("vintage bikes")],
    )
    .await;

    assert_eq!(outcome, RunOutcome::BacklogDrained);

    let store = store.lock().unwrap();
    let task = store.get_task(&task_key("vintage bikes")).unwrap();
    assert_eq!(task.status, TaskStatus::CompletedNoCursor);
    assert_eq!(task.pages_fetched, 2);
    assert_eq!(store.count_records().unwrap(), 2);
}

#[tokio::test]
async fn test_http_fetcher_maps_status_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/search"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let endpoint = format!("{}/api/search", mock_server.uri());
    let fetcher = HttpFetcher::new(&endpoint, Duration::from_secs(5));

    let result = fetcher.fetch_page("alpha", None, &identity("id-1")).await;
    assert!(matches!(result, Err(FailureSignal::HttpStatus(429))));
}

#[tokio::test]
async fn test_http_fetcher_detects_body_markers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"error": "login_required"}"#),
        )
        .mount(&mock_server)
        .await;

    let endpoint = format!("{}/api/search", mock_server.uri());
    let fetcher = HttpFetcher::new(&endpoint, Duration::from_secs(5));

    let result = fetcher.fetch_page("alpha", None, &identity("id-1")).await;
    assert!(matches!(result, Err(FailureSignal::LoginRedirect)));
}

#[tokio::test]
async fn test_http_fetcher_strips_json_guard_prefix() {
    let mock_server = MockServer::start().await;

    let body = r#"for (;;);{"data":{"results":{"edges":[],"page_info":{}}}}"#;
    Mock::given(method("POST"))
        .and(path("/api/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let endpoint = format!("{}/api/search", mock_server.uri());
    let fetcher = HttpFetcher::new(&endpoint, Duration::from_secs(5));

    let page = fetcher
        .fetch_page("alpha", None, &identity("id-1"))
        .await
        .unwrap();
    assert!(page.body.pointer("/data/results/edges").is_some());
}

#[tokio::test]
async fn test_fresh_mode_resets_unfinished_tasks_only() {
    let db = tempfile::NamedTempFile::new().unwrap();

    {
        // Task ends parked with its retry budget spent on the way
        let fetcher = ScriptedFetcher::new(vec![(
            "alpha",
            vec![Err(FailureSignal::Timeout), Err(FailureSignal::Timeout)],
        )]);
        let store = Arc::new(Mutex::new(SqliteStore::new(db.path()).unwrap()));
        run_dispatcher(
            Arc::clone(&store),
            pool(&["id-1"], 2, Duration::ZERO),
            Arc::new(fetcher),
            &[entry("alpha")],
        )
        .await;
    }

    let mut store = SqliteStore::new(db.path()).unwrap();
    let before = store.get_task(&task_key("alpha")).unwrap();
    assert!(before.retry_count > 0);

    let reset = store.reset_non_terminal().unwrap();
    assert_eq!(reset, 1);

    let after = store.get_task(&task_key("alpha")).unwrap();
    assert_eq!(after.status, TaskStatus::Pending);
    assert_eq!(after.retry_count, 0);
    assert!(after.cursor.is_none());
}

#[test]
fn test_backlog_entry_keys_are_stable() {
    assert_eq!(task_key("alpha").len(), 16);
    assert_eq!(entry("alpha").key, task_key("alpha"));
}
