use axum::extract::FromRef;
use axum::http::{header, HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::models::Category;
use crate::services::classifier::Classifier;
use crate::services::index_service::EmailIndex;
use crate::services::notification_service::Notifier;
use crate::services::reply_service::ReplyService;
use crate::services::summary_service::SummaryService;
use crate::services::sync_service::SyncManager;

pub mod ai;
pub mod emails;
pub mod events;

pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

#[derive(Clone)]
pub struct AppState {
    pub index: EmailIndex,
    pub classifier: Arc<Classifier>,
    pub notifier: Notifier,
    pub summaries: Arc<SummaryService>,
    pub replies: Arc<ReplyService>,
    pub sync: Arc<SyncManager>,
    /// Category `/api/classify` answers with when the oracle gives nothing usable.
    pub classify_fallback: Category,
}

impl FromRef<AppState> for EmailIndex {
    fn from_ref(state: &AppState) -> Self {
        state.index.clone()
    }
}

impl FromRef<AppState> for Arc<SyncManager> {
    fn from_ref(state: &AppState) -> Self {
        state.sync.clone()
    }
}

pub fn router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .route("/", get(|| async { "inbox-triage backend is running" }))
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/emails", get(emails::list_emails))
        .route("/api/emails/search", get(emails::search_emails))
        .route("/api/emails/:id", get(emails::get_email))
        .route("/api/classify", post(ai::classify))
        .route("/api/summary", post(ai::summarize))
        .route("/api/suggest-reply", post(ai::suggest_reply))
        .route("/api/accounts/status", get(events::account_status))
        .route("/api/events", get(events::sync_events_stream))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let origin = HeaderValue::from_str(origin).unwrap_or_else(|_| {
        tracing::warn!(origin=%origin, "invalid CORS_ORIGIN, using {DEFAULT_CORS_ORIGIN}");
        HeaderValue::from_static(DEFAULT_CORS_ORIGIN)
    });
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}
