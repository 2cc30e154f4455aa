//! Order-payment reconciliation.
//!
//! This crate turns carts into orders and drives their M-Pesa payments to a
//! terminal status:
//! 1. Create the order from catalog prices
//! 2. Initiate an STK push and record the provider reference
//! 3. Confirm through the provider webhook or by polling the provider
//!
//! Both confirmation paths use the same conditional status transition, so
//! duplicate and racing signals resolve an order exactly once.

pub mod clock;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod services;
pub mod webhook;

pub use clock::{Clock, ManualClock, TokioClock};
pub use error::{CheckoutError, GatewayError, Result, WebhookError};
pub use orchestrator::{
    CartLine, CheckoutService, Confirmation, ConfirmationSource, PaymentInitiated,
    PaymentOutcome, PaymentRequest, PaymentStatus, StatusCheck,
};
pub use poller::{PollConfig, PollOutcome, StatusPoller};
pub use services::{
    InMemoryPaymentGateway, Notifier, OrderNotification, PayHeroConfig, PayHeroGateway,
    PaymentGateway, ProviderPaymentState, RecordingNotifier, TracingNotifier,
};
pub use webhook::{PaymentCallback, WebhookAck, WebhookReceiver};
