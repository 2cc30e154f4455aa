//! Payment provider webhook receiver.

use std::str::FromStr;

use common::OrderId;
use domain::OrderStatus;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::error::WebhookError;
use crate::orchestrator::{CheckoutService, Confirmation, ConfirmationSource, PaymentOutcome};
use crate::services::payment::ProviderPaymentState;

/// Callback body posted by PayHero.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    /// Our order id, echoed back by the provider.
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Provider reference of the payment attempt being reported.
    #[serde(default)]
    pub reference: Option<String>,
    /// Amount paid, in shillings.
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
}

impl PaymentCallback {
    fn amount_kes(&self) -> Option<f64> {
        match self.amount.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// How a webhook delivery was handled. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    /// The order moved to a terminal status.
    Applied { order_id: OrderId, status: OrderStatus },
    /// The order was already resolved; duplicate or late delivery.
    AlreadyResolved { order_id: OrderId, status: OrderStatus },
    /// The reported status is not terminal; nothing changed.
    NoChange { order_id: OrderId },
    /// The callback is for an attempt the order has since replaced.
    Superseded { order_id: OrderId, reference: String },
}

/// Authenticates and applies provider callbacks.
pub struct WebhookReceiver {
    checkout: CheckoutService,
    secret: String,
}

impl WebhookReceiver {
    /// Creates a receiver that accepts callbacks carrying `secret`.
    pub fn new(checkout: CheckoutService, secret: impl Into<String>) -> Self {
        Self {
            checkout,
            secret: secret.into(),
        }
    }

    /// Handles one delivery.
    ///
    /// The token is checked before the body is looked at. Unrecognized
    /// provider statuses leave the order unchanged instead of failing.
    #[tracing::instrument(skip(self, body, auth_token), fields(bytes = body.len()))]
    pub async fn handle(
        &self,
        body: &[u8],
        auth_token: Option<&str>,
    ) -> Result<WebhookAck, WebhookError> {
        let result = self.process(body, auth_token).await;
        let outcome = match &result {
            Ok(WebhookAck::Applied { .. }) => "applied",
            Ok(WebhookAck::AlreadyResolved { .. }) => "duplicate",
            Ok(WebhookAck::NoChange { .. }) => "no_change",
            Ok(WebhookAck::Superseded { .. }) => "stale",
            Err(WebhookError::Unauthorized) => "unauthorized",
            Err(WebhookError::Checkout(_)) => "error",
            Err(_) => "rejected",
        };
        metrics::counter!("webhook_requests_total", "outcome" => outcome).increment(1);
        if let Err(ref err) = result {
            tracing::warn!(error = %err, "webhook rejected");
        }
        result
    }

    async fn process(
        &self,
        body: &[u8],
        auth_token: Option<&str>,
    ) -> Result<WebhookAck, WebhookError> {
        if !self.is_authorized(auth_token) {
            return Err(WebhookError::Unauthorized);
        }

        let callback: PaymentCallback = serde_json::from_slice(body)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        let raw_reference = callback
            .external_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(WebhookError::MissingReference)?;
        let order_id = OrderId::from_str(raw_reference)
            .map_err(|_| WebhookError::InvalidReference(raw_reference.to_string()))?;

        let order = self.checkout.get_order(order_id).await?;

        let reference = callback
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        if let (Some(reported), Some(active)) = (reference, order.provider_reference.as_deref())
            && reported != active
        {
            tracing::info!(
                %order_id,
                reported,
                active,
                status = ?callback.status,
                "callback for a replaced payment attempt ignored"
            );
            return Ok(WebhookAck::Superseded {
                order_id,
                reference: reported.to_string(),
            });
        }

        if let Some(paid) = callback.amount_kes()
            && (paid - order.amount_kes() as f64).abs() >= 0.5
        {
            metrics::counter!("webhook_amount_mismatches_total").increment(1);
            tracing::warn!(
                %order_id,
                paid,
                expected = order.amount_kes(),
                "callback amount differs from order amount"
            );
        }

        let state = callback
            .status
            .as_deref()
            .map(ProviderPaymentState::from_provider_status)
            .unwrap_or(ProviderPaymentState::Pending);
        let Some(outcome) = PaymentOutcome::from_provider_state(state) else {
            tracing::info!(%order_id, status = ?callback.status, "non-terminal callback status");
            return Ok(WebhookAck::NoChange { order_id });
        };

        let confirmation = self
            .checkout
            .apply_payment_result(
                order_id,
                outcome,
                reference.map(String::from),
                ConfirmationSource::Webhook,
            )
            .await?;

        Ok(match confirmation {
            Confirmation::Applied(order) => WebhookAck::Applied {
                order_id,
                status: order.status,
            },
            Confirmation::AlreadyResolved(order) => WebhookAck::AlreadyResolved {
                order_id,
                status: order.status,
            },
        })
    }

    fn is_authorized(&self, token: Option<&str>) -> bool {
        match token {
            Some(token) if !self.secret.is_empty() => {
                token.as_bytes().ct_eq(self.secret.as_bytes()).into()
            }
            _ => false,
        }
    }
}
