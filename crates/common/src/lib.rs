//! Shared types used across the storefront checkout crates.

mod types;

pub use types::OrderId;
