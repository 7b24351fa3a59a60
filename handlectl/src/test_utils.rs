//! Test utilities for CLI testing
//!
//! Provides an in-process mock Handle server that records every request,
//! plus helpers for credentials and throttling.

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use handle_core::api::ModifyValuesRequest;
use handle_core::{HandleRecord, HandleValue, HandleValueData};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use crate::session::Credentials;
use crate::throttle::Throttle;

/// One request as seen by the mock server
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

/// Mock server state
#[derive(Debug, Clone, Default)]
pub struct MockServerState {
    /// Every request received, in order
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    /// Identifiers served by the listing endpoint, in listing order
    listing: Arc<Mutex<Vec<String>>>,
    /// Reported `totalCount`, when it should differ from the listing size
    total_count_override: Arc<Mutex<Option<u64>>>,
    /// Page index that answers with a server error
    failing_page: Arc<Mutex<Option<u64>>>,
    /// Full records keyed by `prefix/postfix`
    records: Arc<Mutex<HashMap<String, HandleRecord>>>,
    /// Bodies served verbatim, keyed by `prefix/postfix`
    raw_records: Arc<Mutex<HashMap<String, String>>>,
    /// Answer the authorization `PUT` with 401
    reject_authorization: Arc<Mutex<bool>>,
    /// Number of sessions created so far
    sessions_created: Arc<Mutex<u32>>,
}

impl MockServerState {
    fn record_request(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Option<Value>,
    ) {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            authorization,
            body,
        });
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests matching method and path
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn count_requests(&self, method: &str, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    /// Serve `count` generated identifiers `<prefix>/H00000`, `<prefix>/H00001`, ...
    pub fn set_listing(&self, prefix: &str, count: usize) {
        let handles = (0..count).map(|i| format!("{}/H{:05}", prefix, i)).collect();
        *self.listing.lock().unwrap() = handles;
    }

    pub fn listing(&self) -> Vec<String> {
        self.listing.lock().unwrap().clone()
    }

    pub fn set_total_count_override(&self, total: Option<u64>) {
        *self.total_count_override.lock().unwrap() = total;
    }

    pub fn set_failing_page(&self, page: Option<u64>) {
        *self.failing_page.lock().unwrap() = page;
    }

    pub fn set_reject_authorization(&self, reject: bool) {
        *self.reject_authorization.lock().unwrap() = reject;
    }

    /// Add an existing handle with a single URL value at index 1
    pub fn add_record(&self, prefix: &str, postfix: &str, url: &str) {
        let handle = format!("{}/{}", prefix, postfix);
        let record = HandleRecord {
            response_code: 1,
            handle: handle.clone(),
            values: vec![HandleValue::new(1, "URL", HandleValueData::string(url))],
        };
        self.records.lock().unwrap().insert(handle, record);
    }

    /// Serve `body` as-is for `prefix/postfix`
    pub fn add_raw_record(&self, prefix: &str, postfix: &str, body: &str) {
        self.raw_records
            .lock()
            .unwrap()
            .insert(format!("{}/{}", prefix, postfix), body.to_string());
    }

    pub fn record(&self, handle: &str) -> Option<HandleRecord> {
        self.records.lock().unwrap().get(handle).cloned()
    }
}

/// Query parameters of the listing endpoint; both are mandatory
#[derive(Debug, Deserialize)]
struct ListQuery {
    prefix: String,
    page: u64,
    #[serde(rename = "pageSize")]
    page_size: u64,
}

/// Mock server implementation
#[derive(Debug)]
pub struct MockServer {
    state: MockServerState,
    port: u16,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// Create a new mock server
    pub fn new() -> Self {
        Self {
            state: MockServerState::default(),
            port: 0, // Will be assigned when server starts
        }
    }

    /// Start the mock server and return the base URL
    pub async fn start(mut self) -> Result<(Self, String)> {
        let app = self.create_router();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        self.port = addr.port();

        let server_url = format!("http://127.0.0.1:{}", self.port);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Mock server error: {}", e);
            }
        });

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                break;
            }
        }

        Ok((self, server_url))
    }

    pub fn state(&self) -> &MockServerState {
        &self.state
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/api/sessions", post(create_session_handler))
            .route(
                "/api/sessions/this",
                put(authorize_session_handler).delete(delete_session_handler),
            )
            .route("/api/handles", get(list_handles_handler))
            .route(
                "/api/handles/:prefix/:postfix",
                get(get_handle_handler).put(modify_handle_handler),
            )
            .with_state(self.state.clone())
    }
}

// Handler functions

async fn create_session_handler(
    State(state): State<MockServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Json<Value> {
    state.record_request(&method, &uri, &headers, None);

    let mut created = state.sessions_created.lock().unwrap();
    *created += 1;
    Json(json!({
        "sessionId": format!("mock-session-{}", *created),
        "nonce": "Df1HlFib4vc8CcWZqHuKXQ=="
    }))
}

/// Extract `sessionId="..."` from a Handle authorization header
fn session_id_from(authorization: &str) -> Option<String> {
    let start = authorization.find("sessionId=\"")? + "sessionId=\"".len();
    let rest = &authorization[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

async fn authorize_session_handler(
    State(state): State<MockServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record_request(&method, &uri, &headers, None);

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let session_id = match session_id_from(authorization) {
        Some(id) if authorization.contains("clientCert=\"true\"") => id,
        _ => return StatusCode::UNAUTHORIZED.into_response(),
    };

    if *state.reject_authorization.lock().unwrap() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"responseCode": 402, "message": "Authentication needed"})),
        )
            .into_response();
    }

    Json(json!({
        "sessionId": session_id,
        "nonce": "Df1HlFib4vc8CcWZqHuKXQ==",
        "authenticated": true,
        "id": "312:21.12102/USER01"
    }))
    .into_response()
}

async fn delete_session_handler(
    State(state): State<MockServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> StatusCode {
    state.record_request(&method, &uri, &headers, None);
    StatusCode::NO_CONTENT
}

async fn list_handles_handler(
    State(state): State<MockServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<ListQuery>,
) -> Response {
    state.record_request(&method, &uri, &headers, None);

    if *state.failing_page.lock().unwrap() == Some(params.page) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let owned_prefix = format!("{}/", params.prefix);
    let matching: Vec<String> = state
        .listing()
        .into_iter()
        .filter(|h| h.starts_with(&owned_prefix))
        .collect();
    let total = state
        .total_count_override
        .lock()
        .unwrap()
        .unwrap_or(matching.len() as u64);

    let handles: Vec<String> = if params.page_size == 0 {
        Vec::new()
    } else {
        matching
            .into_iter()
            .skip((params.page * params.page_size) as usize)
            .take(params.page_size as usize)
            .collect()
    };

    Json(json!({
        "responseCode": 1,
        "prefix": params.prefix,
        "totalCount": total.to_string(),
        "page": params.page,
        "pageSize": params.page_size,
        "handles": handles
    }))
    .into_response()
}

async fn get_handle_handler(
    State(state): State<MockServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((prefix, postfix)): Path<(String, String)>,
) -> Response {
    state.record_request(&method, &uri, &headers, None);

    let handle = format!("{}/{}", prefix, postfix);
    if let Some(body) = state.raw_records.lock().unwrap().get(&handle).cloned() {
        return ([(header::CONTENT_TYPE, "application/json")], body).into_response();
    }

    match state.record(&handle) {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"responseCode": 100, "handle": handle})),
        )
            .into_response(),
    }
}

async fn modify_handle_handler(
    State(state): State<MockServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((prefix, postfix)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    state.record_request(&method, &uri, &headers, Some(body.clone()));

    let request: ModifyValuesRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let handle = format!("{}/{}", prefix, postfix);
    let mut records = state.records.lock().unwrap();
    let Some(record) = records.get_mut(&handle) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"responseCode": 100, "handle": handle})),
        )
            .into_response();
    };

    for value in request.values {
        match record.values.iter_mut().find(|v| v.index == value.index) {
            Some(existing) => *existing = value,
            None => record.values.push(value),
        }
    }

    Json(json!({"responseCode": 1, "handle": handle})).into_response()
}

/// Write a throwaway self-signed certificate and key into `dir`
pub fn write_test_credentials(dir: &std::path::Path) -> Credentials {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

    let certfile = dir.join("21.12102_USER01_312_certificate_only.pem");
    let keyfile = dir.join("21.12102_USER01_312_privkey.pem");
    std::fs::write(&certfile, cert.pem()).unwrap();
    std::fs::write(&keyfile, key_pair.serialize_pem()).unwrap();

    Credentials::new(certfile, keyfile)
}

/// Ordered log of events shared between test doubles
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Throttle that records `pause` instead of sleeping
#[derive(Debug, Clone, Default)]
pub struct RecordingThrottle {
    pub log: EventLog,
}

impl RecordingThrottle {
    pub fn with_log(log: EventLog) -> Self {
        Self { log }
    }

    pub fn pauses(&self) -> usize {
        self.log.events().iter().filter(|e| *e == "pause").count()
    }
}

#[async_trait]
impl Throttle for RecordingThrottle {
    async fn pause(&mut self) {
        self.log.push("pause");
    }
}
