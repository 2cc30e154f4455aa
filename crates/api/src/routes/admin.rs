//! Back-office order management. Every route here sits behind
//! [`crate::auth::require_admin`].

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use domain::OrderStatus;
use order_store::{DEFAULT_PAGE_SIZE, OrderQuery};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::orders::{OrderEnvelope, OrderResponse, parse_order_id};

#[derive(Debug, Deserialize)]
pub struct AdminOrdersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminOrdersResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub pages: u32,
    pub page: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub order_id: Option<String>,
    pub status: Option<String>,
}

fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    OrderStatus::from_str(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// GET /admin/orders?page=&limit=&status=
#[tracing::instrument(skip(state, query))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AdminOrdersQuery>, QueryRejection>,
) -> Result<Json<AdminOrdersResponse>, ApiError> {
    let Query(query) = query?;

    let mut filter = OrderQuery::new()
        .page(query.page.unwrap_or(1))
        .limit(query.limit.unwrap_or(DEFAULT_PAGE_SIZE));
    if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        filter = filter.status(parse_status(status)?);
    }

    let page = state.checkout.list_orders(filter).await?;
    Ok(Json(AdminOrdersResponse {
        orders: page.orders.into_iter().map(Into::into).collect(),
        total: page.total,
        pages: page.pages,
        page: page.page,
    }))
}

/// PUT /admin/orders: move an order along its fulfilment path.
#[tracing::instrument(skip(state, payload))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderEnvelope>, ApiError> {
    let Json(req) = payload?;
    let (Some(order_id), Some(status)) = (req.order_id, req.status) else {
        return Err(ApiError::BadRequest(
            "Missing required fields: orderId, status".to_string(),
        ));
    };

    let order = state
        .checkout
        .update_status(parse_order_id(&order_id)?, parse_status(&status)?)
        .await?;
    Ok(Json(order.into()))
}
