/// Indexed email listing and lookup
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{Category, IndexedRecord};
use crate::services::index_service::{EmailIndex, MAX_LISTING};

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// GET /api/emails - newest 50, `[]` when the store is empty or failing
pub async fn list_emails(State(index): State<EmailIndex>) -> Json<Vec<IndexedRecord>> {
    Json(index.query_recent(MAX_LISTING).await)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/emails/search?q=&category=&limit=
pub async fn search_emails(
    State(index): State<EmailIndex>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<IndexedRecord>>, ApiError> {
    let category = match params.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(name) => Some(
            Category::from_name(name)
                .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, format!("unknown category: {name}")))?,
        ),
        None => None,
    };
    let limit = params.limit.unwrap_or(MAX_LISTING).clamp(1, MAX_LISTING);
    Ok(Json(index.search(params.q.as_deref(), category, limit).await))
}

/// GET /api/emails/:id
pub async fn get_email(
    State(index): State<EmailIndex>,
    Path(id): Path<String>,
) -> Result<Json<IndexedRecord>, ApiError> {
    match index.get(&id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, format!("email {id} not found"))),
        Err(e) => {
            tracing::error!(id=%id, error=%e, "email lookup failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch email"))
        }
    }
}
