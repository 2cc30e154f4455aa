//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// This is the single status vocabulary shared by the store, the checkout
/// orchestrator, the webhook receiver and the HTTP layer.
///
/// Payment workflow:
/// ```text
/// Pending ──► Processing ──┬──► Paid ──► Shipped ──► Delivered
///    │            ▲  │     │     │          │           │
///    │            └──┘     └─────┴──────────┴───────────┴──► Refunded
///    └────────────┴──────────► Cancelled
/// ```
///
/// `Processing ──► Processing` is a re-initiation that supersedes the stored
/// provider reference. Shipped and Delivered are set by the admin back office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created, no payment initiated yet.
    #[default]
    Pending,

    /// A payment request was accepted by the provider; awaiting confirmation.
    Processing,

    /// Payment confirmed.
    Paid,

    /// Handed to the courier.
    Shipped,

    /// Received by the customer.
    Delivered,

    /// Payment declined or order cancelled.
    Cancelled,

    /// Money returned to the customer.
    Refunded,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Returns true if a payment may be initiated in this status.
    pub fn can_initiate_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if a terminal payment result may still be applied.
    pub fn awaits_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true once the payment workflow has reached a final answer.
    ///
    /// Shipped and Delivered come after Paid, so they count as resolved too.
    pub fn is_payment_resolved(&self) -> bool {
        !self.awaits_payment()
    }

    /// Returns true if the status means money was received.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Pending | Processing, Paid)
                | (Pending | Processing, Cancelled)
                | (Paid, Shipped)
                | (Shipped, Delivered)
                | (Paid | Shipped | Delivered, Refunded)
        )
    }

    /// Returns the statuses from which `next` may be reached.
    pub fn predecessors(next: OrderStatus) -> Vec<OrderStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = super::OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| super::OrderError::UnknownStatus(s.to_string()))
    }
}
