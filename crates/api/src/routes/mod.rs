//! HTTP handlers, one module per resource.

pub mod admin;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payment;
pub mod webhook;
