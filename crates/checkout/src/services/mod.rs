//! External collaborators of the checkout workflow.

pub mod notification;
pub mod payhero;
pub mod payment;
pub mod phone;

pub use notification::{Notifier, OrderNotification, RecordingNotifier, TracingNotifier};
pub use payhero::{PayHeroConfig, PayHeroGateway};
pub use payment::{
    InMemoryPaymentGateway, PaymentGateway, PaymentStatusReport, ProviderPaymentState,
    StkPushAccepted, StkPushRequest,
};
pub use phone::normalize_msisdn;
