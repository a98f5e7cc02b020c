use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use crinz_core::{ContentId, UserId};
use crinz_sync::{
    Credentials, Destination, FlushOutcome, InMemoryKvStore, SessionCredentials, SyncConfig,
    SyncEngine, SyncError, TransportError,
};
use serde_json::{Value, json};

#[derive(Debug, Clone)]
struct Recorded {
    path: &'static str,
    authorization: Option<String>,
    body: Value,
}

/// Stand-in for the two batch endpoints.
#[derive(Default)]
struct Backend {
    requests: Mutex<Vec<Recorded>>,
    /// Non-zero: the content endpoint answers with this status.
    content_status: AtomicU16,
}

impl Backend {
    fn record(&self, path: &'static str, headers: &HeaderMap, body: Value) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push(Recorded {
            path,
            authorization,
            body,
        });
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn profile_batch(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    backend.record("profile", &headers, body);
    StatusCode::NO_CONTENT
}

async fn content_batch(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let created: Vec<Value> = body["actions"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|a| a["type"] == "add_comment")
        .enumerate()
        .map(|(i, a)| json!({ "tempId": a["payload"]["commentId"], "commentId": format!("srv-{}", i + 1) }))
        .collect();
    backend.record("content", &headers, body);

    match backend.content_status.load(Ordering::SeqCst) {
        0 => Json(json!({ "createdComments": created })).into_response(),
        code => {
            let status = StatusCode::from_u16(code).unwrap();
            (status, "boom").into_response()
        }
    }
}

struct TestServer {
    base_url: String,
    backend: Arc<Backend>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let backend = Arc::new(Backend::default());
        let app = Router::new()
            .route("/profile/actions/batch", post(profile_batch))
            .route("/crinz/actions/batch", post(content_batch))
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            backend,
            handle,
        }
    }

    async fn engine(&self) -> SyncEngine {
        let credentials = Arc::new(SessionCredentials::signed_in(Credentials::new(
            UserId::parse("U1").unwrap(),
            "secret-token",
        )));
        SyncEngine::builder(SyncConfig::default().with_api_url(&self.base_url), credentials)
            .with_store(Arc::new(InMemoryKvStore::new()))
            .without_worker()
            .init()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn post_id(id: &str) -> ContentId {
    ContentId::parse(id).unwrap()
}

#[tokio::test]
async fn flush_posts_both_groups_with_bearer_auth() {
    let server = TestServer::spawn().await;
    let engine = server.engine().await;

    engine
        .update_post(&post_id("P9"), "new text", vec!["rust".into()])
        .await
        .unwrap();
    engine.like(&post_id("P1")).await.unwrap();
    let temp = engine.add_comment(&post_id("P1"), "nice", None).await.unwrap();

    let outcome = engine.sync_now().await.unwrap();
    let FlushOutcome::Flushed(report) = outcome else {
        panic!("expected a flush");
    };
    assert_eq!(report.profile_actions, 1);
    assert_eq!(report.content_actions, 2);
    assert_eq!(report.resolved_comments, 1);
    assert_eq!(engine.pending_count(), 0);
    assert_eq!(engine.resolve_comment_id(&temp).as_str(), "srv-1");

    let requests = server.backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, "profile");
    assert_eq!(requests[1].path, "content");
    for r in &requests {
        assert_eq!(r.authorization.as_deref(), Some("Bearer secret-token"));
        assert_eq!(r.body["userId"], "U1");
    }

    let profile = &requests[0].body["actions"][0];
    assert_eq!(profile["type"], "update");
    assert_eq!(profile["postId"], "P9");
    assert_eq!(profile["data"], json!({ "message": "new text", "tags": ["rust"] }));
    assert!(profile["idempotencyKey"].is_string());

    let content = requests[1].body["actions"].as_array().unwrap();
    assert_eq!(content[0]["type"], "like");
    assert_eq!(content[0]["crinzId"], "P1");
    assert_eq!(content[1]["type"], "add_comment");
    assert_eq!(content[1]["payload"]["commentId"], temp.as_str());
    assert_eq!(content[1]["payload"]["text"], "nice");

    engine.dispose().await;
}

#[tokio::test]
async fn server_error_fails_the_flush_and_keeps_the_queue() {
    let server = TestServer::spawn().await;
    server.backend.content_status.store(500, Ordering::SeqCst);
    let engine = server.engine().await;

    engine.delete_post(&post_id("P2")).await.unwrap();
    engine.like(&post_id("P1")).await.unwrap();

    let err = engine.sync_now().await.unwrap_err();
    match err {
        SyncError::Transport {
            destination,
            source: TransportError::Api(status, body),
        } => {
            assert_eq!(destination, Destination::Content);
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(engine.pending_count(), 2);

    server.backend.content_status.store(0, Ordering::SeqCst);
    assert!(engine.sync_now().await.unwrap().is_flushed());
    assert_eq!(engine.pending_count(), 0);

    engine.dispose().await;
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    // Reserve a port, then close it so nothing is listening there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let credentials = Arc::new(SessionCredentials::signed_in(Credentials::new(
        UserId::parse("U1").unwrap(),
        "t",
    )));
    let engine = SyncEngine::builder(
        SyncConfig::default().with_api_url(format!("http://{}", addr)),
        credentials,
    )
    .with_store(Arc::new(InMemoryKvStore::new()))
    .without_worker()
    .init()
    .await
    .unwrap();

    engine.like(&post_id("P1")).await.unwrap();
    let err = engine.sync_now().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Transport {
            source: TransportError::Network(_),
            ..
        }
    ));
    assert_eq!(engine.pending_count(), 1);
}
