//! M-Pesa initiation, status polling and Google Pay confirmation.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use checkout::{PaymentRequest, PaymentStatus};
use domain::{Money, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::orders::{OrderEnvelope, parse_order_id};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub order_id: Option<String>,
    pub phone: Option<String>,
    /// Order total as shown at checkout, in dollars.
    pub amount: Option<f64>,
    pub customer_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub success: bool,
    pub reference: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub reference: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePayRequest {
    pub order_id: Option<String>,
    #[serde(default)]
    pub payment_token: serde_json::Value,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /payment/initiate: send an STK push for an order.
#[tracing::instrument(skip(state, payload))]
pub async fn initiate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<InitiatePaymentResponse>, ApiError> {
    let Json(req) = payload?;
    let (Some(order_id), Some(phone)) = (required(req.order_id), required(req.phone)) else {
        return Err(ApiError::BadRequest(
            "Missing required fields: orderId, phone".to_string(),
        ));
    };

    let amount = req
        .amount
        .map(|amount| {
            Money::from_major(amount)
                .ok_or_else(|| ApiError::BadRequest("Invalid amount".to_string()))
        })
        .transpose()?;

    let initiated = state
        .checkout
        .initiate_payment(PaymentRequest {
            order_id: parse_order_id(&order_id)?,
            phone,
            amount,
            customer_name: req.customer_name,
        })
        .await?;

    Ok(Json(InitiatePaymentResponse {
        success: true,
        reference: initiated.reference,
        message: initiated.message,
    }))
}

/// GET /payment/status?reference=&orderId=: one poll of the payment status.
#[tracing::instrument(skip(state, query))]
pub async fn status(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Query(query) = query?;
    let order_id = required(query.order_id)
        .map(|id| parse_order_id(&id))
        .transpose()?;
    let reference = required(query.reference);

    let check = state
        .checkout
        .check_payment_status(reference.as_deref(), order_id)
        .await?;

    Ok(Json(StatusResponse {
        status: check.status,
        order_status: check.order_status,
    }))
}

/// POST /payments/google-pay: record a Google Pay payment.
#[tracing::instrument(skip(state, payload))]
pub async fn google_pay(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GooglePayRequest>, JsonRejection>,
) -> Result<Json<OrderEnvelope>, ApiError> {
    let Json(req) = payload?;
    let Some(order_id) = required(req.order_id) else {
        return Err(ApiError::BadRequest(
            "Missing required fields: orderId, paymentToken".to_string(),
        ));
    };

    let order = state
        .checkout
        .confirm_google_pay(parse_order_id(&order_id)?, req.payment_token)
        .await?;
    Ok(Json(order.into()))
}
