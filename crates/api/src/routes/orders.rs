//! Order creation and lookup endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use checkout::CartLine;
use common::OrderId;
use domain::{BuyerInfo, Order, OrderItem, OrderStatus, PaymentMethod};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<CartItemRequest>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: String,
    #[serde(default)]
    pub shipping_address: String,
    pub user_id: Option<String>,
}

/// A cart line. Client-side names and prices are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    /// Canonical id or slug.
    #[serde(alias = "id", default)]
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub size: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersQuery {
    pub user_id: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub status: OrderStatus,
    pub subtotal: f64,
    pub shipping: f64,
    pub total: f64,
    /// Amount charged through M-Pesa, in shillings.
    pub total_kes: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub user_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub provider_reference: Option<String>,
    pub payment_ref: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    pub size: Option<String>,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            name: item.name,
            price: item.price.to_major(),
            quantity: item.quantity,
            size: item.size,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            status: order.status,
            subtotal: order.subtotal.to_major(),
            shipping: order.shipping.to_major(),
            total: order.total.to_major(),
            total_kes: order.amount_kes(),
            customer_name: order.buyer.customer_name,
            customer_email: order.buyer.customer_email,
            customer_phone: order.buyer.customer_phone,
            shipping_address: order.buyer.shipping_address,
            user_id: order.user_id,
            payment_method: order.payment_method,
            provider_reference: order.provider_reference,
            payment_ref: order.payment_ref,
            items: order.items.into_iter().map(Into::into).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderEnvelope {
    pub success: bool,
    pub order: OrderResponse,
}

impl From<Order> for OrderEnvelope {
    fn from(order: Order) -> Self {
        Self {
            success: true,
            order: order.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
}

/// Parses an order id taken from a path or query.
pub(crate) fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    OrderId::from_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid order id: {raw}")))
}

// -- Handlers --

/// POST /orders: create an order from a cart.
///
/// Prices and totals come from the catalog. When the body has no `userId`
/// the signed-in user, if any, owns the order.
#[tracing::instrument(skip(state, identity, payload))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderEnvelope>, ApiError> {
    let Json(req) = payload?;

    let lines = req
        .items
        .into_iter()
        .map(|item| CartLine {
            product: item.product_id,
            quantity: item.quantity,
            size: item.size,
        })
        .collect();
    let buyer = BuyerInfo {
        customer_name: req.customer_name,
        customer_email: req.customer_email,
        customer_phone: req.customer_phone,
        shipping_address: req.shipping_address,
    };
    let user_id = req
        .user_id
        .filter(|id| !id.trim().is_empty())
        .or(identity.user_id);

    let order = state.checkout.create_order(lines, buyer, user_id).await?;
    Ok(Json(order.into()))
}

/// GET /orders?userId=: every order of an account, newest first.
#[tracing::instrument(skip(state, query))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    query: Result<Query<OrdersQuery>, QueryRejection>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let Query(query) = query?;
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("userId required".to_string()))?;

    let orders = state.checkout.orders_for_user(&user_id).await?;
    Ok(Json(OrderListResponse {
        orders: orders.into_iter().map(Into::into).collect(),
    }))
}

/// GET /orders/{id}: a single order.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderEnvelope>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.checkout.get_order(order_id).await?;
    Ok(Json(order.into()))
}
