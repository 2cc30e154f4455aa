//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use common::OrderId;
use serde::Serialize;

use crate::error::GatewayError;
use crate::services::phone::normalize_msisdn;

/// An STK push request, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StkPushRequest {
    /// Amount in whole shillings, derived from the stored order total.
    pub amount_kes: i64,
    /// Normalized MSISDN.
    pub phone: String,
    pub order_id: OrderId,
    pub customer_name: Option<String>,
}

impl StkPushRequest {
    /// Builds a request, normalizing the phone number.
    pub fn new(
        amount_kes: i64,
        phone: &str,
        order_id: OrderId,
        customer_name: Option<String>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            amount_kes,
            phone: normalize_msisdn(phone)?,
            order_id,
            customer_name: customer_name.filter(|name| !name.trim().is_empty()),
        })
    }
}

/// The provider's acknowledgment of an STK push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StkPushAccepted {
    /// Provider reference of the new payment attempt.
    pub reference: String,
    /// Human-readable message from the provider, if any.
    pub message: Option<String>,
}

/// Payment state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderPaymentState {
    Pending,
    Success,
    Failed,
}

impl ProviderPaymentState {
    /// Maps the provider's status vocabulary.
    ///
    /// Anything that is not a recognized terminal value is pending, so an
    /// unfamiliar status never resolves an order.
    pub fn from_provider_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" | "completed" => ProviderPaymentState::Success,
            "failed" | "cancelled" | "canceled" => ProviderPaymentState::Failed,
            _ => ProviderPaymentState::Pending,
        }
    }
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentStatusReport {
    pub state: ProviderPaymentState,
    /// Provider response body, for diagnostics.
    pub raw: serde_json::Value,
}

/// Outbound client for the mobile-money provider.
///
/// Every error is classified into a [`GatewayError`] before it is returned.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Sends an STK push prompt to the customer's phone.
    async fn initiate(&self, request: StkPushRequest) -> Result<StkPushAccepted, GatewayError>;

    /// Queries the state of a payment attempt.
    async fn check_status(&self, reference: &str) -> Result<PaymentStatusReport, GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    requests: Vec<StkPushRequest>,
    statuses: HashMap<String, ProviderPaymentState>,
    next_id: u32,
    initiate_failure: Option<GatewayError>,
    status_failure: Option<GatewayError>,
    status_checks: usize,
}

/// In-memory payment gateway for testing.
///
/// Accepted requests get sequential references (`PH-0001`, ...) that report
/// pending until a status is set with [`InMemoryPaymentGateway::set_status`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes initiation fail with `error` until cleared with `None`.
    pub fn set_initiate_failure(&self, error: Option<GatewayError>) {
        self.state().initiate_failure = error;
    }

    /// Makes status checks fail with `error` until cleared with `None`.
    pub fn set_status_failure(&self, error: Option<GatewayError>) {
        self.state().status_failure = error;
    }

    /// Sets the state reported for a reference.
    pub fn set_status(&self, reference: &str, state: ProviderPaymentState) {
        self.state().statuses.insert(reference.to_string(), state);
    }

    /// Returns every accepted request, oldest first.
    pub fn requests(&self) -> Vec<StkPushRequest> {
        self.state().requests.clone()
    }

    /// Returns the number of status checks made.
    pub fn status_check_count(&self) -> usize {
        self.state().status_checks
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn initiate(&self, request: StkPushRequest) -> Result<StkPushAccepted, GatewayError> {
        let mut state = self.state();

        if let Some(ref error) = state.initiate_failure {
            return Err(error.clone());
        }

        state.next_id += 1;
        let reference = format!("PH-{:04}", state.next_id);
        state
            .statuses
            .insert(reference.clone(), ProviderPaymentState::Pending);
        state.requests.push(request);

        Ok(StkPushAccepted {
            reference,
            message: Some("STK push sent".to_string()),
        })
    }

    async fn check_status(&self, reference: &str) -> Result<PaymentStatusReport, GatewayError> {
        let mut state = self.state();
        state.status_checks += 1;

        if let Some(ref error) = state.status_failure {
            return Err(error.clone());
        }

        let status = state
            .statuses
            .get(reference)
            .copied()
            .ok_or_else(|| GatewayError::Declined(format!("unknown reference {reference}")))?;

        Ok(PaymentStatusReport {
            state: status,
            raw: serde_json::json!({ "reference": reference, "status": status }),
        })
    }
}
