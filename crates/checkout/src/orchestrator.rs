//! Order-payment orchestrator.
//!
//! Drives an order from creation through payment initiation to a terminal
//! payment status:
//!
//! ```text
//! PENDING ──initiate──► PROCESSING ──┬──► PAID       (webhook or poll)
//!    ▲                      │        └──► CANCELLED  (webhook or poll)
//!    └── gateway failure ───┘ (no write)
//! ```
//!
//! Every status write goes through the store's conditional transition, so the
//! webhook and poll paths can race freely: the first terminal write wins and
//! the loser observes an already-resolved order and skips its side effects.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::OrderId;
use domain::{
    BuyerInfo, Money, NewOrder, Order, OrderError, OrderStatus, PaymentMethod, ProductRef,
};
use order_store::{
    OrderPage, OrderQuery, OrderStore, OrderStoreExt, ProductCatalog, StatusUpdate,
    TransitionOutcome,
};
use serde::Serialize;

use crate::error::{CheckoutError, GatewayError, Result};
use crate::services::notification::{Notifier, OrderNotification};
use crate::services::payment::{PaymentGateway, ProviderPaymentState, StkPushRequest};

/// Attempts made to record an accepted payment request on the order.
const PERSIST_ATTEMPTS: u32 = 3;

/// Delay between record attempts; grows linearly.
const PERSIST_BACKOFF: Duration = Duration::from_millis(50);

/// Statuses the back office may set by hand. Payment results only come
/// from the provider or the wallet.
const ADMIN_TARGETS: [OrderStatus; 4] = [
    OrderStatus::Shipped,
    OrderStatus::Delivered,
    OrderStatus::Refunded,
    OrderStatus::Cancelled,
];

/// Statuses from which a terminal payment result may be applied.
const AWAITING_PAYMENT: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Processing];

/// One line of a submitted cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    /// Canonical product id or slug.
    pub product: String,
    pub quantity: u32,
    pub size: Option<String>,
}

impl CartLine {
    pub fn new(product: impl Into<String>, quantity: u32) -> Self {
        Self {
            product: product.into(),
            quantity,
            size: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }
}

/// A request to start an M-Pesa payment for an order.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub phone: String,
    /// Amount the client believes it is paying, in the canonical currency.
    /// Checked against the order total when present; never sent to the
    /// provider.
    pub amount: Option<Money>,
    pub customer_name: Option<String>,
}

/// An accepted payment request, recorded on the order.
#[derive(Debug, Clone)]
pub struct PaymentInitiated {
    pub reference: String,
    pub message: String,
    pub order: Order,
}

/// Where a payment result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationSource {
    Webhook,
    Poll,
    GooglePay,
    Admin,
}

impl ConfirmationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationSource::Webhook => "webhook",
            ConfirmationSource::Poll => "poll",
            ConfirmationSource::GooglePay => "google_pay",
            ConfirmationSource::Admin => "admin",
        }
    }
}

/// A terminal payment result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    Declined,
}

impl PaymentOutcome {
    /// The order status this outcome resolves to.
    pub fn target_status(&self) -> OrderStatus {
        match self {
            PaymentOutcome::Paid => OrderStatus::Paid,
            PaymentOutcome::Declined => OrderStatus::Cancelled,
        }
    }

    /// Maps a provider state; `None` while the payment is still pending.
    pub fn from_provider_state(state: ProviderPaymentState) -> Option<Self> {
        match state {
            ProviderPaymentState::Success => Some(PaymentOutcome::Paid),
            ProviderPaymentState::Failed => Some(PaymentOutcome::Declined),
            ProviderPaymentState::Pending => None,
        }
    }
}

/// Result of applying a terminal payment result.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// This call moved the order to its terminal status.
    Applied(Order),
    /// The order was already resolved; nothing changed.
    AlreadyResolved(Order),
}

impl Confirmation {
    pub fn order(&self) -> &Order {
        match self {
            Confirmation::Applied(order) | Confirmation::AlreadyResolved(order) => order,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Confirmation::Applied(_))
    }
}

/// Payment status as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Pending,
    Failed,
}

impl PaymentStatus {
    fn for_order(status: OrderStatus) -> Self {
        if status.is_paid() {
            PaymentStatus::Paid
        } else if status.is_payment_resolved() {
            PaymentStatus::Failed
        } else {
            PaymentStatus::Pending
        }
    }

    fn for_provider(state: ProviderPaymentState) -> Self {
        match state {
            ProviderPaymentState::Success => PaymentStatus::Paid,
            ProviderPaymentState::Failed => PaymentStatus::Failed,
            ProviderPaymentState::Pending => PaymentStatus::Pending,
        }
    }
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCheck {
    pub status: PaymentStatus,
    /// Stored order status, when the order is known.
    pub order_status: Option<OrderStatus>,
    /// Provider response, when the provider was asked.
    pub raw: Option<serde_json::Value>,
}

/// Coordinates the order store, product catalog, payment gateway and
/// notifier. Holds no order state of its own.
#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn ProductCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl CheckoutService {
    /// Creates a new checkout service.
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn ProductCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            catalog,
            gateway,
            notifier,
        }
    }

    /// Creates an order from a cart.
    ///
    /// Every line is resolved against the catalog before anything is written;
    /// an unknown product aborts the whole order. Prices come from the
    /// catalog and totals are computed here.
    #[tracing::instrument(skip(self, lines, buyer), fields(lines = lines.len()))]
    pub async fn create_order(
        &self,
        lines: Vec<CartLine>,
        buyer: BuyerInfo,
        user_id: Option<String>,
    ) -> Result<Order> {
        if lines.is_empty() {
            return Err(OrderError::EmptyCart.into());
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let reference = ProductRef::parse(&line.product).ok_or_else(|| {
                CheckoutError::Validation("Cart item is missing a product id".to_string())
            })?;
            let product = self
                .catalog
                .resolve(&reference)
                .await?
                .ok_or_else(|| CheckoutError::ProductNotFound(reference.to_string()))?;
            items.push(product.order_item(line.quantity, line.size)?);
        }

        let order = self
            .store
            .create_order(NewOrder::new(buyer, user_id, items)?)
            .await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total, "order created");
        Ok(order)
    }

    /// Retrieves an order.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.store.require_order(order_id).await?)
    }

    /// Lists every order of an account, newest first.
    pub async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_user(user_id).await?)
    }

    /// Lists orders for the back office.
    pub async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        Ok(self.store.list_orders(query).await?)
    }

    /// Starts an M-Pesa STK push for an order.
    ///
    /// The order moves to PROCESSING with the new provider reference only
    /// after the provider accepted the request. A gateway failure leaves the
    /// order exactly as it was. A re-initiation on a PROCESSING order
    /// replaces the stored reference.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn initiate_payment(&self, request: PaymentRequest) -> Result<PaymentInitiated> {
        let order = self.get_order(request.order_id).await?;

        if !order.status.can_initiate_payment() {
            return Err(CheckoutError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Processing,
            });
        }

        if let Some(amount) = request.amount
            && amount != order.total
        {
            return Err(CheckoutError::Validation(format!(
                "Amount {amount} does not match order total {}",
                order.total
            )));
        }

        let customer_name = request
            .customer_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| Some(order.buyer.customer_name.clone()));
        let push = StkPushRequest::new(order.amount_kes(), &request.phone, order.id, customer_name)?;

        let accepted = match self.gateway.initiate(push).await {
            Ok(accepted) => accepted,
            Err(err) => {
                let outcome = match err {
                    GatewayError::Transient(_) => "unavailable",
                    GatewayError::Unauthorized(_) => "misconfigured",
                    GatewayError::Declined(_) | GatewayError::InvalidPhone(_) => "declined",
                };
                metrics::counter!("payment_initiations_total", "outcome" => outcome).increment(1);
                tracing::warn!(order_id = %order.id, error = %err, "payment initiation failed");
                return Err(err.into());
            }
        };

        let update = StatusUpdate::new(OrderStatus::Processing)
            .from_statuses(AWAITING_PAYMENT)
            .payment_method(PaymentMethod::Mpesa)
            .provider_reference(accepted.reference.clone());

        let order = self
            .record_initiation(order.id, &accepted.reference, update)
            .await?;

        metrics::counter!("payment_initiations_total", "outcome" => "accepted").increment(1);
        tracing::info!(
            order_id = %order.id,
            reference = %accepted.reference,
            amount_kes = order.amount_kes(),
            "payment initiated"
        );

        Ok(PaymentInitiated {
            reference: accepted.reference,
            message: accepted
                .message
                .unwrap_or_else(|| "STK Push sent. Check your phone.".to_string()),
            order,
        })
    }

    /// Writes an accepted initiation, retrying storage failures.
    ///
    /// The provider already holds a live payment request at this point, so a
    /// write that cannot be completed is raised as an operational alert.
    async fn record_initiation(
        &self,
        order_id: OrderId,
        reference: &str,
        update: StatusUpdate,
    ) -> Result<Order> {
        let mut attempt = 1;
        loop {
            match self.store.transition(order_id, update.clone()).await {
                Ok(TransitionOutcome::Applied(order)) => return Ok(order),
                Ok(TransitionOutcome::Rejected { current }) => {
                    if !current.status.is_payment_resolved() {
                        return Err(CheckoutError::InvalidTransition {
                            from: current.status,
                            to: OrderStatus::Processing,
                        });
                    }
                    tracing::warn!(
                        %order_id,
                        reference,
                        current = %current.status,
                        "order resolved while payment was being initiated"
                    );
                    return Ok(self.attach_reference(current, reference).await);
                }
                Err(order_store::StoreError::OrderNotFound(id)) => {
                    return Err(CheckoutError::OrderNotFound(id));
                }
                Err(err) if attempt < PERSIST_ATTEMPTS => {
                    tracing::warn!(%order_id, reference, attempt, error = %err, "retrying payment record");
                    tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    metrics::counter!("payment_persist_failures_total").increment(1);
                    tracing::error!(
                        alert = true,
                        %order_id,
                        reference,
                        error = %err,
                        "payment accepted by provider but not recorded on order"
                    );
                    return Err(CheckoutError::PaymentNotRecorded {
                        order_id,
                        reference: reference.to_string(),
                    });
                }
            }
        }
    }

    /// Records the provider reference on an order that was resolved before
    /// its initiation could be written. The status is left as it is.
    async fn attach_reference(&self, order: Order, reference: &str) -> Order {
        if order.provider_reference.is_some() {
            return order;
        }
        let update = StatusUpdate::new(order.status)
            .from_statuses([order.status])
            .provider_reference(reference);
        match self.store.transition(order.id, update).await {
            Ok(outcome) => outcome.into_order(),
            Err(err) => {
                tracing::warn!(order_id = %order.id, reference, error = %err, "could not record provider reference");
                order
            }
        }
    }

    /// Applies a terminal payment result.
    ///
    /// Idempotent: if the order already left PENDING/PROCESSING the call is
    /// a no-op that returns [`Confirmation::AlreadyResolved`], and no
    /// notification is sent.
    #[tracing::instrument(skip(self, payment_ref), fields(source = source.as_str()))]
    pub async fn apply_payment_result(
        &self,
        order_id: OrderId,
        outcome: PaymentOutcome,
        payment_ref: Option<String>,
        source: ConfirmationSource,
    ) -> Result<Confirmation> {
        let target = outcome.target_status();
        let mut update = StatusUpdate::new(target).from_statuses(AWAITING_PAYMENT);
        if let Some(payment_ref) = payment_ref.filter(|r| !r.is_empty()) {
            update = update.payment_ref(payment_ref);
        }

        match self.store.transition(order_id, update).await? {
            TransitionOutcome::Applied(order) => {
                metrics::counter!(
                    "payment_confirmations_total",
                    "source" => source.as_str(),
                    "outcome" => "applied"
                )
                .increment(1);
                tracing::info!(%order_id, status = %order.status, "payment result applied");
                self.notify(&order).await;
                Ok(Confirmation::Applied(order))
            }
            TransitionOutcome::Rejected { current } => {
                metrics::counter!(
                    "payment_confirmations_total",
                    "source" => source.as_str(),
                    "outcome" => "ignored"
                )
                .increment(1);
                if current.status == target {
                    tracing::debug!(%order_id, status = %current.status, "duplicate payment result ignored");
                } else {
                    tracing::warn!(
                        %order_id,
                        current = %current.status,
                        reported = %target,
                        "conflicting payment result ignored"
                    );
                }
                Ok(Confirmation::AlreadyResolved(current))
            }
        }
    }

    /// Reports the payment status of an order or provider reference.
    ///
    /// Resolved orders are answered from the store. Otherwise the provider is
    /// asked about the order's active attempt and a terminal answer is
    /// applied exactly like a webhook. A reference that belongs to no order
    /// is reported as the provider sees it and applied to nothing. A
    /// provider that cannot be reached yields `pending`.
    #[tracing::instrument(skip(self))]
    pub async fn check_payment_status(
        &self,
        reference: Option<&str>,
        order_id: Option<OrderId>,
    ) -> Result<StatusCheck> {
        let reference = reference.map(str::trim).filter(|r| !r.is_empty());

        let order = match (order_id, reference) {
            (Some(id), _) => Some(self.get_order(id).await?),
            (None, Some(reference)) => self.store.find_by_provider_reference(reference).await?,
            (None, None) => {
                return Err(CheckoutError::Validation(
                    "reference or orderId required".to_string(),
                ));
            }
        };

        if let Some(ref order) = order
            && order.status.is_payment_resolved()
        {
            return Ok(StatusCheck {
                status: PaymentStatus::for_order(order.status),
                order_status: Some(order.status),
                raw: None,
            });
        }

        // A known order is only ever checked against its own active attempt.
        let reference = match order {
            Some(ref order) => {
                if let Some(claimed) = reference
                    && order.provider_reference.as_deref() != Some(claimed)
                {
                    metrics::counter!("payment_status_reference_mismatches_total").increment(1);
                    tracing::warn!(
                        order_id = %order.id,
                        claimed,
                        "status check reference is not the order's active attempt, ignoring it"
                    );
                }
                order.provider_reference.clone()
            }
            None => reference.map(String::from),
        };
        let Some(reference) = reference else {
            return Ok(StatusCheck {
                status: PaymentStatus::Pending,
                order_status: order.map(|o| o.status),
                raw: None,
            });
        };

        let report = match self.gateway.check_status(&reference).await {
            Ok(report) => report,
            Err(GatewayError::Unauthorized(msg)) => {
                return Err(CheckoutError::GatewayMisconfigured(msg));
            }
            Err(err) => {
                tracing::warn!(%reference, error = %err, "status check failed, reporting pending");
                return Ok(StatusCheck {
                    status: PaymentStatus::Pending,
                    order_status: order.map(|o| o.status),
                    raw: None,
                });
            }
        };

        let Some(order) = order else {
            return Ok(StatusCheck {
                status: PaymentStatus::for_provider(report.state),
                order_status: None,
                raw: Some(report.raw),
            });
        };

        let Some(outcome) = PaymentOutcome::from_provider_state(report.state) else {
            return Ok(StatusCheck {
                status: PaymentStatus::Pending,
                order_status: Some(order.status),
                raw: Some(report.raw),
            });
        };

        let confirmation = self
            .apply_payment_result(order.id, outcome, None, ConfirmationSource::Poll)
            .await?;
        let status = confirmation.order().status;
        Ok(StatusCheck {
            status: PaymentStatus::for_order(status),
            order_status: Some(status),
            raw: Some(report.raw),
        })
    }

    /// Records a Google Pay payment captured in the browser.
    ///
    /// Only a PENDING order without an M-Pesa attempt can be paid this way.
    #[tracing::instrument(skip(self, token))]
    pub async fn confirm_google_pay(
        &self,
        order_id: OrderId,
        token: serde_json::Value,
    ) -> Result<Order> {
        if token.is_null() {
            return Err(CheckoutError::Validation(
                "Missing required fields: orderId, paymentToken".to_string(),
            ));
        }

        let order = self.get_order(order_id).await?;
        if order.status != OrderStatus::Pending || order.provider_reference.is_some() {
            return Err(CheckoutError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Paid,
            });
        }

        let update = StatusUpdate::new(OrderStatus::Paid)
            .from_statuses([OrderStatus::Pending])
            .payment_method(PaymentMethod::GooglePay)
            .payment_ref(format!("gpay_{}", Utc::now().timestamp_millis()))
            .google_pay_token(token);

        match self.store.transition(order_id, update).await? {
            TransitionOutcome::Applied(order) => {
                metrics::counter!(
                    "payment_confirmations_total",
                    "source" => ConfirmationSource::GooglePay.as_str(),
                    "outcome" => "applied"
                )
                .increment(1);
                tracing::info!(%order_id, "google pay payment recorded");
                self.notify(&order).await;
                Ok(order)
            }
            TransitionOutcome::Rejected { current } => Err(CheckoutError::InvalidTransition {
                from: current.status,
                to: OrderStatus::Paid,
            }),
        }
    }

    /// Moves an order to `status` on behalf of the back office.
    ///
    /// Only fulfilment, refund and cancellation targets are accepted, and
    /// only along transitions allowed by the status machine.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        if !ADMIN_TARGETS.contains(&status) {
            let order = self.get_order(order_id).await?;
            return Err(CheckoutError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }

        match self
            .store
            .transition(order_id, StatusUpdate::new(status))
            .await?
        {
            TransitionOutcome::Applied(order) => {
                tracing::info!(%order_id, %status, "order status updated by admin");
                if status == OrderStatus::Cancelled {
                    metrics::counter!(
                        "payment_confirmations_total",
                        "source" => ConfirmationSource::Admin.as_str(),
                        "outcome" => "applied"
                    )
                    .increment(1);
                    self.notify(&order).await;
                }
                Ok(order)
            }
            TransitionOutcome::Rejected { current } => Err(CheckoutError::InvalidTransition {
                from: current.status,
                to: status,
            }),
        }
    }

    async fn notify(&self, order: &Order) {
        if let Some(notification) = OrderNotification::for_order(order) {
            self.notifier.notify(notification).await;
        }
    }
}
