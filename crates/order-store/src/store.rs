use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{NewOrder, Order, OrderStatus, PaymentMethod};

use crate::{OrderPage, OrderQuery, Result, StoreError};

/// A conditional status change.
///
/// The change is applied only if the order's current status is one of
/// `allowed_from`; the check and the write happen atomically. Payment fields
/// set to `Some` overwrite the stored value, `None` leaves it untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub to: OrderStatus,
    pub allowed_from: Vec<OrderStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub provider_reference: Option<String>,
    pub payment_ref: Option<String>,
    pub google_pay_token: Option<serde_json::Value>,
}

impl StatusUpdate {
    /// Creates an update to `to`, allowed from every legal predecessor.
    pub fn new(to: OrderStatus) -> Self {
        Self {
            to,
            allowed_from: OrderStatus::predecessors(to),
            payment_method: None,
            provider_reference: None,
            payment_ref: None,
            google_pay_token: None,
        }
    }

    /// Restricts the statuses the update may be applied from.
    pub fn from_statuses(mut self, allowed_from: impl Into<Vec<OrderStatus>>) -> Self {
        self.allowed_from = allowed_from.into();
        self
    }

    /// Records the payment method.
    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    /// Records the provider reference of the active payment attempt.
    pub fn provider_reference(mut self, reference: impl Into<String>) -> Self {
        self.provider_reference = Some(reference.into());
        self
    }

    /// Records the payment receipt reference.
    pub fn payment_ref(mut self, payment_ref: impl Into<String>) -> Self {
        self.payment_ref = Some(payment_ref.into());
        self
    }

    /// Records an opaque wallet token.
    pub fn google_pay_token(mut self, token: serde_json::Value) -> Self {
        self.google_pay_token = Some(token);
        self
    }

    /// Returns true if the update may be applied to an order in `current`.
    pub fn allows(&self, current: OrderStatus) -> bool {
        self.allowed_from.contains(&current)
    }

    /// Applies the update to an in-memory order.
    ///
    /// The caller is responsible for having checked [`StatusUpdate::allows`].
    pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) {
        order.status = self.to;
        if let Some(method) = self.payment_method {
            order.payment_method = Some(method);
        }
        if let Some(ref reference) = self.provider_reference {
            order.provider_reference = Some(reference.clone());
        }
        if let Some(ref payment_ref) = self.payment_ref {
            order.payment_ref = Some(payment_ref.clone());
        }
        if let Some(ref token) = self.google_pay_token {
            order.google_pay_token = Some(token.clone());
        }
        order.updated_at = now;
    }
}

/// Result of a conditional transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The update was written; holds the order as stored afterwards.
    Applied(Order),

    /// The order was not in an allowed status; nothing was written.
    Rejected { current: Order },
}

impl TransitionOutcome {
    /// Returns true if the update was written.
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }

    /// The order as it stands after the attempt.
    pub fn order(&self) -> &Order {
        match self {
            TransitionOutcome::Applied(order) => order,
            TransitionOutcome::Rejected { current } => current,
        }
    }

    /// Consumes the outcome, returning the order.
    pub fn into_order(self) -> Order {
        match self {
            TransitionOutcome::Applied(order) => order,
            TransitionOutcome::Rejected { current } => current,
        }
    }
}

/// Core trait for order persistence.
///
/// Implementations must create an order and its items atomically and apply
/// [`StatusUpdate`]s as a single compare-and-set, so that concurrent writers
/// (webhook, status poll, admin) cannot both succeed from the same status.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order with all of its items, or nothing.
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    /// Retrieves an order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Finds the order whose active payment attempt has this provider reference.
    async fn find_by_provider_reference(&self, reference: &str) -> Result<Option<Order>>;

    /// Lists orders, newest first.
    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage>;

    /// Applies a conditional status change.
    ///
    /// Returns [`StoreError::OrderNotFound`] if the order does not exist.
    async fn transition(&self, id: OrderId, update: StatusUpdate) -> Result<TransitionOutcome>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Retrieves an order, failing if it does not exist.
    async fn require_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or(StoreError::OrderNotFound(id))
    }

    /// Lists every order placed by an account, newest first.
    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let mut query = OrderQuery::for_user(user_id).limit(crate::query::MAX_PAGE_SIZE);
        let mut orders = Vec::new();
        loop {
            let page = self.list_orders(query.clone()).await?;
            let done = page.page >= page.pages;
            orders.extend(page.orders);
            if done {
                return Ok(orders);
            }
            query = query.clone().page(query.page + 1);
        }
    }
}

impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

/// Checks a new order before writing it.
pub(crate) fn validate_new_order(order: &NewOrder) -> Result<()> {
    if order.items.is_empty() {
        return Err(StoreError::EmptyOrder(order.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_defaults_to_legal_predecessors() {
        let update = StatusUpdate::new(OrderStatus::Paid);
        assert!(update.allows(OrderStatus::Pending));
        assert!(update.allows(OrderStatus::Processing));
        assert!(!update.allows(OrderStatus::Cancelled));
        assert!(!update.allows(OrderStatus::Paid));
    }

    #[test]
    fn test_update_can_be_narrowed() {
        let update =
            StatusUpdate::new(OrderStatus::Paid).from_statuses(vec![OrderStatus::Pending]);
        assert!(update.allows(OrderStatus::Pending));
        assert!(!update.allows(OrderStatus::Processing));
    }
}
