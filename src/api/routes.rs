use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, Level};

use crate::api::health::{DbGate, HealthResponse};
use crate::config::{DbConfig, DB_NAME};
use crate::db::CounterStore;
use crate::error::DbResult;

/// Set by the WeChat cloud gateway on requests coming from a mini-program.
pub const WX_SOURCE_HEADER: &str = "x-wx-source";
/// Caller's OpenID, injected by the gateway alongside `x-wx-source`.
pub const WX_OPENID_HEADER: &str = "x-wx-openid";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

const NOT_CONNECTED: &str = "database not connected";

const INDEX_HTML: &str = include_str!("../../static/index.html");

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn CounterStore>,
    pub gate: Arc<DbGate>,
    /// Effective listening port, reported by /health.
    pub port: u16,
    pub db_info: DbInfo,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/count", get(get_count).post(update_count))
        .route("/api/db-status", get(db_status))
        .route("/api/wx_openid", get(wx_openid))
        .layer(CorsLayer::permissive())
        .layer(
            // Access log, one line per response.
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountAction {
    Inc,
    Clear,
}

impl CountAction {
    /// Only the exact strings `inc` and `clear` are actions.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "inc" => Some(Self::Inc),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }
}

/// JSON body of POST /api/count. `action` is kept untyped so that a
/// non-string value is a no-op rather than a parse failure.
#[derive(Debug, Deserialize)]
pub struct CountRequest {
    #[serde(default)]
    pub action: Option<serde_json::Value>,
}

/// Form-encoded body of POST /api/count.
#[derive(Debug, Deserialize)]
pub struct CountForm {
    pub action: Option<String>,
}

/// Envelope for the counter endpoints. HTTP status is always 200; `code`
/// is 0 on success and -1 on any failure.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CountResponse {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: i64,
}

impl CountResponse {
    pub fn ok(count: i64) -> Self {
        Self { code: 0, error: None, data: count }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { code: -1, error: Some(message.into()), data: 0 }
    }

    pub fn not_connected() -> Self {
        Self::error(NOT_CONNECTED)
    }
}

/// Database target echoed by /api/db-status. Never carries the password.
#[derive(Debug, Clone, Serialize)]
pub struct DbInfo {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub database: &'static str,
}

impl From<&DbConfig> for DbInfo {
    fn from(cfg: &DbConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            username: cfg.username.clone(),
            database: DB_NAME,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DbStatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<DbInfo>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse::snapshot(&state.gate, state.port))
}

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE))
}

/// Reads `action` from a JSON or form-encoded body. Any other content type,
/// an unparsable body, or an `action` that is not exactly "inc" or "clear"
/// yields `None`, which is a plain read.
async fn read_action(req: Request) -> Option<CountAction> {
    if is_form(&req) {
        let Form(form) = Form::<CountForm>::from_request(req, &()).await.ok()?;
        return form.action.as_deref().and_then(CountAction::from_name);
    }

    let Json(body) = Json::<CountRequest>::from_request(req, &()).await.ok()?;
    match body.action {
        Some(serde_json::Value::String(name)) => CountAction::from_name(&name),
        _ => None,
    }
}

async fn apply_action(store: &dyn CounterStore, action: Option<CountAction>) -> DbResult<i64> {
    match action {
        Some(CountAction::Inc) => store.insert_row().await?,
        Some(CountAction::Clear) => store.truncate().await?,
        None => {}
    }
    store.count_rows().await
}

async fn update_count(State(state): State<ApiState>, req: Request) -> Json<CountResponse> {
    if !state.gate.is_connected() {
        return Json(CountResponse::not_connected());
    }

    let action = read_action(req).await;
    match apply_action(state.store.as_ref(), action).await {
        Ok(count) => Json(CountResponse::ok(count)),
        Err(e) => {
            error!("Count API error: {e}");
            Json(CountResponse::error(e.to_string()))
        }
    }
}

async fn get_count(State(state): State<ApiState>) -> Json<CountResponse> {
    if !state.gate.is_connected() {
        return Json(CountResponse::not_connected());
    }

    match state.store.count_rows().await {
        Ok(count) => Json(CountResponse::ok(count)),
        Err(e) => {
            error!("Get count error: {e}");
            Json(CountResponse::error(e.to_string()))
        }
    }
}

/// Live check, independent of the gate's cached value once the gate is open.
async fn db_status(State(state): State<ApiState>) -> Json<DbStatusResponse> {
    if !state.gate.is_connected() {
        return Json(DbStatusResponse {
            status: "disconnected",
            message: None,
            error: Some(NOT_CONNECTED.to_string()),
            config: Some(state.db_info.clone()),
        });
    }

    match state.store.connect().await {
        Ok(()) => Json(DbStatusResponse {
            status: "connected",
            message: Some("database connection ok".to_string()),
            error: None,
            config: None,
        }),
        Err(e) => {
            error!("DB status check failed: {e}");
            Json(DbStatusResponse {
                status: "error",
                message: None,
                error: Some(e.to_string()),
                config: Some(state.db_info.clone()),
            })
        }
    }
}

/// Echo the caller's OpenID when the request came through the WeChat
/// gateway. The header is trusted as-is.
async fn wx_openid(headers: HeaderMap) -> Response {
    if !headers.contains_key(WX_SOURCE_HEADER) {
        return StatusCode::OK.into_response();
    }

    let openid = headers
        .get(WX_OPENID_HEADER)
        .map(|v| Bytes::copy_from_slice(v.as_bytes()))
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        openid,
    )
        .into_response()
}
