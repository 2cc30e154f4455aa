//! Bounded payment status polling.
//!
//! The fallback for a webhook that never arrives: ask for the payment status
//! at a fixed interval until it resolves, the time bound elapses, or the
//! caller cancels. Timing out only stops the waiting. The order is left in
//! PROCESSING so a late webhook can still resolve it.

use std::sync::Arc;
use std::time::Duration;

use common::OrderId;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::Result;
use crate::orchestrator::{CheckoutService, PaymentStatus};

/// Default time between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on the whole poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Interval and time bound of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// How a poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The payment was confirmed.
    Paid,
    /// The payment was declined.
    Declined,
    /// The bound elapsed without a terminal answer. Distinct from a decline.
    TimedOut,
    /// The caller stopped waiting.
    Cancelled,
}

impl PollOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollOutcome::Paid => "paid",
            PollOutcome::Declined => "declined",
            PollOutcome::TimedOut => "timed_out",
            PollOutcome::Cancelled => "cancelled",
        }
    }
}

/// Polls an order's payment status through the checkout service.
pub struct StatusPoller {
    checkout: CheckoutService,
    clock: Arc<dyn Clock>,
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(checkout: CheckoutService, clock: Arc<dyn Clock>, config: PollConfig) -> Self {
        Self {
            checkout,
            clock,
            config,
        }
    }

    /// Polls until the payment resolves, the bound elapses or `cancel` fires.
    ///
    /// A terminal answer is applied to the order by the status check itself.
    /// Only a misconfigured gateway or a storage failure ends the poll with
    /// an error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn poll(
        &self,
        order_id: OrderId,
        reference: Option<String>,
        cancel: CancellationToken,
    ) -> Result<PollOutcome> {
        let started = self.clock.now();
        let mut checks = 0u32;

        let outcome = loop {
            if cancel.is_cancelled() {
                break PollOutcome::Cancelled;
            }

            checks += 1;
            let check = self
                .checkout
                .check_payment_status(reference.as_deref(), Some(order_id))
                .await?;
            match check.status {
                PaymentStatus::Paid => break PollOutcome::Paid,
                PaymentStatus::Failed => break PollOutcome::Declined,
                PaymentStatus::Pending => {}
            }

            if self.clock.now().duration_since(started) >= self.config.timeout {
                break PollOutcome::TimedOut;
            }

            tokio::select! {
                () = cancel.cancelled() => break PollOutcome::Cancelled,
                () = self.clock.sleep(self.config.interval) => {}
            }
        };

        let elapsed = self.clock.now().duration_since(started);
        metrics::histogram!("payment_poll_duration_seconds", "outcome" => outcome.as_str())
            .record(elapsed.as_secs_f64());
        tracing::info!(
            %order_id,
            outcome = outcome.as_str(),
            checks,
            elapsed_secs = elapsed.as_secs_f64(),
            "payment poll finished"
        );
        Ok(outcome)
    }
}
