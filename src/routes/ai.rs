/// Model-backed assists: classify, summarize, suggest a reply
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::models::message::INBOX;
use crate::models::{ClassifiedMessage, NormalizedMessage};
use crate::services::reply_service::{REPLY_EMPTY, REPLY_FAILED};

/// Sender recorded on alerts raised from ad-hoc classification.
pub const API_SENDER: &str = "unknown@lead.com";

#[derive(Debug, Deserialize)]
pub struct EmailInput {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

impl EmailInput {
    fn is_empty(&self) -> bool {
        self.subject.trim().is_empty() && self.body.trim().is_empty()
    }
}

fn missing_input(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

/// POST /api/classify
pub async fn classify(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if input.is_empty() {
        return Err(missing_input("Subject or body required"));
    }

    let category = state
        .classifier
        .classify(&input.subject, &input.body, state.classify_fallback)
        .await;
    tracing::info!(subject=%input.subject, category=%category, "classified ad-hoc email");

    let now = crate::imap::parse::whole_seconds(chrono::Utc::now());
    state.notifier.notify(&ClassifiedMessage {
        message: NormalizedMessage {
            subject: input.subject,
            body: input.body,
            from: API_SENDER.to_string(),
            to: String::new(),
            received_at: now,
            account_id: "api".to_string(),
            folder: INBOX.to_string(),
        },
        category,
    });

    Ok(Json(json!({ "category": category })))
}

/// POST /api/summary
pub async fn summarize(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if input.is_empty() {
        return Err(missing_input("Missing email data"));
    }
    let summary = state.summaries.summarize(&input.subject, &input.body).await;
    Ok(Json(json!({ "summary": summary })))
}

/// POST /api/suggest-reply
pub async fn suggest_reply(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> (StatusCode, Json<Value>) {
    if input.is_empty() {
        return missing_input("Subject or body required");
    }
    match state.replies.suggest(&input.subject, &input.body).await {
        Ok(Some(reply)) => (StatusCode::OK, Json(json!({ "reply": reply }))),
        Ok(None) => {
            tracing::warn!(subject=%input.subject, "oracle returned no reply text");
            (StatusCode::OK, Json(json!({ "reply": REPLY_EMPTY })))
        }
        Err(e) => {
            tracing::error!(subject=%input.subject, error=%e, "reply generation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "reply": REPLY_FAILED })))
        }
    }
}
