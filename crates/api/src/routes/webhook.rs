//! PayHero callback endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use checkout::WebhookAck;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub result: &'static str,
}

/// Token from `Authorization`, with or without a `Bearer` prefix.
fn auth_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    Some(
        value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .unwrap_or(value),
    )
}

/// POST /payment/webhook
///
/// Duplicate and non-terminal callbacks are acknowledged with 200 so the
/// provider stops retrying them.
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let ack = state.webhook.handle(&body, auth_token(&headers)).await?;
    let result = match ack {
        WebhookAck::Applied { .. } => "applied",
        WebhookAck::AlreadyResolved { .. } => "already_resolved",
        WebhookAck::NoChange { .. } => "no_change",
        WebhookAck::Superseded { .. } => "superseded",
    };
    Ok(Json(WebhookResponse {
        success: true,
        result,
    }))
}
