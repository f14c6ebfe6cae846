use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use beam_realtime::api::HistoryQuery;
use beam_realtime::conversation::{ConversationFeed, LoadOutcome, MessageHistory};
use beam_realtime::realtime::{LocalBroker, RealtimeClient};
use beam_realtime::workload::{AssignmentBoard, CapacityPolicy, CapacityVerdict};
use beam_realtime::{MessageBackend, PortalClient, PortalError, WorkloadBackend};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const TOKEN: &str = "t0ken";

#[derive(Default)]
struct Backend {
    messages: Vec<Value>,
    sent: Vec<Value>,
    roster: Vec<Value>,
    tasks: Vec<Value>,
    assignments: Vec<(String, String)>,
}

type Shared = Arc<Mutex<Backend>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({ "success": false, "error": "unauthorized" })))
}

#[derive(Deserialize)]
struct PageParams {
    limit: usize,
    before: Option<String>,
}

async fn list_messages(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Query(params): Query<PageParams>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let backend = backend.lock();
    let rows: Vec<&Value> = backend
        .messages
        .iter()
        .filter(|m| m["conversation_id"] == conversation_id)
        .collect();
    let end = match &params.before {
        Some(before) => rows.iter().position(|m| m["id"] == *before).unwrap_or(0),
        None => rows.len(),
    };
    let start = end.saturating_sub(params.limit);
    let page: Vec<Value> = rows[start..end].iter().map(|v| (*v).clone()).collect();
    (StatusCode::OK, Json(json!({ "success": true, "data": page })))
}

async fn create_message(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut backend = backend.lock();
    let row = json!({
        "id": format!("sent-{}", backend.sent.len() + 1),
        "conversation_id": conversation_id,
        "sender_id": "u1",
        "sender_type": "user",
        "content": body["content"],
        "created_at": "2026-03-01T12:00:00Z",
        "metadata": body.get("metadata").cloned().unwrap_or_else(|| json!({}))
    });
    backend.sent.push(row.clone());
    (StatusCode::CREATED, Json(json!({ "success": true, "data": row })))
}

async fn workload(State(backend): State<Shared>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let roster = backend.lock().roster.clone();
    (StatusCode::OK, Json(json!({ "success": true, "data": roster })))
}

async fn tasks(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let tasks: Vec<Value> = backend
        .lock()
        .tasks
        .iter()
        .filter(|t| params.get("projectId").map_or(true, |p| t["projectId"] == *p))
        .cloned()
        .collect();
    (StatusCode::OK, Json(json!({ "success": true, "data": tasks })))
}

async fn assign(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    if task_id == "locked" {
        return (StatusCode::OK, Json(json!({ "success": false, "error": "task is locked" })));
    }
    let assignee = body["assigneeId"].as_str().unwrap_or_default().to_string();
    let mut backend = backend.lock();
    let hours = backend
        .tasks
        .iter()
        .find(|t| t["id"] == task_id)
        .and_then(|t| t["estimatedHours"].as_f64())
        .unwrap_or(0.0);
    for member in backend.roster.iter_mut() {
        if member["id"] == assignee {
            let allocated = member["allocated"].as_f64().unwrap_or(0.0) + hours;
            member["allocated"] = json!(allocated);
        }
    }
    backend.assignments.push((task_id, assignee));
    (StatusCode::OK, Json(json!({ "success": true, "data": null })))
}

async fn start_backend(backend: Shared) -> String {
    let api = Router::new()
        .route("/conversations/{id}/messages", get(list_messages).post(create_message))
        .route("/workload", get(workload))
        .route("/tasks", get(tasks))
        .route("/tasks/{id}/assign", post(assign))
        .with_state(backend);
    let app = Router::new().nest("/api", api);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn seeded() -> Shared {
    let mut backend = Backend::default();
    for n in 0..5 {
        backend.messages.push(json!({
            "id": format!("m{n}"),
            "conversation_id": "c1",
            "sender_type": if n % 2 == 0 { "user" } else { "ai" },
            "content": format!("message {n}"),
            "created_at": format!("2026-03-01T10:0{n}:00Z")
        }));
    }
    backend.roster = vec![
        json!({ "id": "rosa", "name": "Rosa", "capacity": 40.0, "allocated": 36.0, "utilization": 90.0 }),
        json!({ "id": "ken", "name": "Ken", "capacity": 40.0, "allocated": 8.0, "utilization": 20.0 }),
    ];
    backend.tasks = vec![
        json!({ "id": "t1", "title": "Hero section", "status": "todo", "priority": "high", "estimatedHours": 8.0, "projectId": "p1" }),
        json!({ "id": "t2", "title": "Footer", "status": "in_progress", "priority": "low", "estimatedHours": 2.0, "projectId": "p2", "assigneeId": "ken" }),
    ];
    Arc::new(Mutex::new(backend))
}

fn portal(base: &str) -> PortalClient {
    PortalClient::new(base, Some(TOKEN.into()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn history_pages_backwards_through_portal() {
    let base = start_backend(seeded()).await;
    let history = MessageHistory::new(portal(&base), 2);

    assert_eq!(history.set_conversation(Some("c1")).await.unwrap(), LoadOutcome::Loaded { count: 2 });
    let ids = |h: &MessageHistory<PortalClient>| h.messages().into_iter().map(|m| m.id).collect::<Vec<_>>();
    assert_eq!(ids(&history), ["m3", "m4"]);

    history.load_more().await.unwrap();
    assert_eq!(ids(&history), ["m1", "m2", "m3", "m4"]);
    assert!(history.has_more());

    assert_eq!(history.load_more().await.unwrap(), LoadOutcome::Loaded { count: 1 });
    assert_eq!(ids(&history), ["m0", "m1", "m2", "m3", "m4"]);
    assert!(!history.has_more());
    assert_eq!(history.load_more().await.unwrap(), LoadOutcome::Skipped);
}

#[tokio::test]
async fn explicit_cursor_query() {
    let base = start_backend(seeded()).await;
    let page = portal(&base)
        .fetch_messages(
            "c1",
            &HistoryQuery {
                limit: 10,
                before: Some("m2".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(page.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["m0", "m1"]);
}

#[tokio::test]
async fn feed_sends_without_touching_its_list() {
    let backend = seeded();
    let base = start_backend(backend.clone()).await;
    let client = RealtimeClient::new(Arc::new(LocalBroker::new()));
    let mut feed = ConversationFeed::new(client);

    let err = feed.send_message(&portal(&base), "hello", None).await.unwrap_err();
    assert!(matches!(err, PortalError::NoConversation));

    feed.attach(Some("c1"), true);
    let mut metadata = serde_json::Map::new();
    metadata.insert("source".into(), json!("cli"));
    let echoed = feed
        .send_message(&portal(&base), "hello", Some(metadata))
        .await
        .unwrap()
        .expect("backend echoes the row");

    assert_eq!(echoed.content, "hello");
    assert_eq!(echoed.metadata["source"], "cli");
    assert!(feed.messages().is_empty());
    assert_eq!(backend.lock().sent.len(), 1);
}

#[tokio::test]
async fn failures_are_typed() {
    let base = start_backend(seeded()).await;

    let anonymous = PortalClient::new(&base, None, Duration::from_secs(5)).unwrap();
    match anonymous.fetch_roster().await {
        Err(PortalError::Status { status, .. }) => assert_eq!(status, 401),
        other => panic!("expected status error, got {other:?}"),
    }

    match portal(&base).assign_task("locked", "rosa").await {
        Err(PortalError::Rejected(reason)) => assert_eq!(reason, "task is locked"),
        other => panic!("expected rejection, got {other:?}"),
    }

    let unreachable = PortalClient::new("http://127.0.0.1:1/api", Some(TOKEN.into()), Duration::from_secs(2)).unwrap();
    assert!(matches!(unreachable.fetch_roster().await, Err(PortalError::Transport(_))));
}

#[tokio::test]
async fn board_assigns_and_refreshes_roster() {
    let backend = seeded();
    let base = start_backend(backend.clone()).await;
    let board = AssignmentBoard::new(portal(&base), CapacityPolicy::default());

    board.refresh_roster().await.unwrap();
    assert_eq!(board.load_tasks(Some("p1")).await.unwrap(), 1);

    let verdict = board.evaluate("t1", "rosa").unwrap();
    assert_eq!(verdict.verdict, CapacityVerdict::Warn);
    assert!((verdict.projected - 110.0).abs() < 1e-9);

    let result = board.assign("t1", "rosa").await.unwrap();
    assert!(result.roster_refreshed);
    assert_eq!(board.task("t1").unwrap().assignee_id.as_deref(), Some("rosa"));
    assert_eq!(backend.lock().assignments, [("t1".to_string(), "rosa".to_string())]);

    let rosa = board.roster().into_iter().find(|m| m.id == "rosa").unwrap();
    assert_eq!(rosa.allocated, 44.0);
    assert!((rosa.utilization() - 110.0).abs() < 1e-9);
}
