//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, WebhookError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No identity on the request.
    Unauthorized,
    /// Identity present but not allowed.
    Forbidden,
    /// Checkout workflow error.
    Checkout(CheckoutError),
    /// Rejected webhook delivery.
    Webhook(WebhookError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Webhook(err) => webhook_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::Validation(_)
        | CheckoutError::ProductNotFound(_)
        | CheckoutError::PaymentDeclined(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CheckoutError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        CheckoutError::GatewayUnavailable(detail) => {
            tracing::warn!(%detail, "payment provider unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        CheckoutError::GatewayMisconfigured(detail) => {
            tracing::error!(%detail, "payment provider rejected credentials");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        CheckoutError::PaymentNotRecorded { .. } | CheckoutError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

fn webhook_error_to_response(err: WebhookError) -> (StatusCode, String) {
    match err {
        WebhookError::Unauthorized => (StatusCode::UNAUTHORIZED, err.to_string()),
        WebhookError::InvalidPayload(_)
        | WebhookError::MissingReference
        | WebhookError::InvalidReference(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        WebhookError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        WebhookError::Checkout(inner) => checkout_error_to_response(inner),
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError::Webhook(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use domain::OrderStatus;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_checkout_errors_map_to_status_codes() {
        assert_eq!(
            status_of(CheckoutError::Validation("empty cart".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CheckoutError::ProductNotFound("toner".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CheckoutError::OrderNotFound(OrderId::new()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                CheckoutError::InvalidTransition {
                    from: OrderStatus::Paid,
                    to: OrderStatus::Processing,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CheckoutError::GatewayUnavailable("timeout".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(CheckoutError::GatewayMisconfigured("401".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_webhook_errors_map_to_status_codes() {
        assert_eq!(
            status_of(WebhookError::Unauthorized.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(WebhookError::MissingReference.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(WebhookError::OrderNotFound(OrderId::new()).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_identity_errors() {
        assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ApiError::Forbidden), StatusCode::FORBIDDEN);
    }
}
