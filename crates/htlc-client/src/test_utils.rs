//! In-process stand-in for the HTLC service, used by tests

use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::{Value, json};
use tokio::{net::TcpListener, task::JoinHandle};

use crate::types::{Endpoint, hash_lock};

/// `txKey` (or smoke-test `id`) for which every endpoint answers with HTTP 500
pub const FAILING_TX_KEY: &str = "0";

/// Request received by the [`MockService`]
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub path: String,
    pub body: Value,
}

/// Mock HTLC service bound to an ephemeral local port
pub struct MockService {
    pub url: String,
    pub preimage: String,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
struct MockState {
    preimage: String,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl MockService {
    /// Spawn the service, accepting withdrawals that reveal `preimage`
    pub async fn spawn(preimage: &str) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            preimage: preimage.to_string(),
            received: received.clone(),
        };

        let app = Router::new()
            .route(Endpoint::TestInvoke.path(), post(test_invoke))
            .route(Endpoint::Lock.path(), post(lock))
            .route(Endpoint::Withdraw.path(), post(withdraw))
            .route(Endpoint::Audit.path(), post(audit))
            .route(Endpoint::VerifyTwo.path(), post(verify_two))
            .route(Endpoint::VerifyTwoAll.path(), post(verify_two_all))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            preimage: preimage.to_string(),
            received,
            handle,
        }
    }

    /// Requests received so far, in arrival order
    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }

    /// Received requests posted to `endpoint`
    pub fn received_on(&self, endpoint: Endpoint) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|r| r.path == endpoint.path())
            .map(|r| r.body)
            .collect()
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type MockReply = (StatusCode, Json<Value>);

fn record(state: &MockState, endpoint: Endpoint, body: &Value) -> Option<MockReply> {
    state.received.lock().unwrap().push(ReceivedRequest {
        path: endpoint.path().to_string(),
        body: body.clone(),
    });

    let key = body.get("txKey").or_else(|| body.get("id"));
    key.and_then(Value::as_str).is_some_and(|k| k == FAILING_TX_KEY).then(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "data": null, "message": "ledger unavailable" })),
        )
    })
}

fn succeed(data: &str) -> MockReply {
    (StatusCode::OK, Json(json!({ "data": data, "msg": "succeed" })))
}

async fn test_invoke(State(state): State<MockState>, Json(body): Json<Value>) -> MockReply {
    if let Some(failure) = record(&state, Endpoint::TestInvoke, &body) {
        return failure;
    }
    succeed("mock backend")
}

async fn lock(State(state): State<MockState>, Json(body): Json<Value>) -> MockReply {
    if let Some(failure) = record(&state, Endpoint::Lock, &body) {
        return failure;
    }
    let id = format!(
        "{}-{}",
        body["flag"].as_str().unwrap_or_default(),
        body["txKey"].as_str().unwrap_or_default()
    );
    succeed(&id)
}

async fn withdraw(State(state): State<MockState>, Json(body): Json<Value>) -> MockReply {
    if let Some(failure) = record(&state, Endpoint::Withdraw, &body) {
        return failure;
    }
    let preimage = body["preImage"].as_str().unwrap_or_default();
    let unlocked = hash_lock(preimage) == hash_lock(&state.preimage);
    succeed(&unlocked.to_string())
}

async fn audit(State(state): State<MockState>, Json(body): Json<Value>) -> MockReply {
    if let Some(failure) = record(&state, Endpoint::Audit, &body) {
        return failure;
    }
    // Overdrafts are acknowledged without proof data.
    let overdraft = body["balance"].as_str().is_some_and(|b| b.starts_with('-'));
    if overdraft {
        return (StatusCode::OK, Json(json!({ "data": null, "msg": "insufficient balance" })));
    }
    succeed("audit triggered")
}

async fn verify_two(State(state): State<MockState>, Json(body): Json<Value>) -> MockReply {
    if let Some(failure) = record(&state, Endpoint::VerifyTwo, &body) {
        return failure;
    }
    succeed("verified")
}

async fn verify_two_all(State(state): State<MockState>, Json(body): Json<Value>) -> MockReply {
    if let Some(failure) = record(&state, Endpoint::VerifyTwoAll, &body) {
        return failure;
    }
    succeed("verified")
}
