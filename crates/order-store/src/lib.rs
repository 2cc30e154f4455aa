//! Order persistence.
//!
//! Provides the [`OrderStore`] and [`ProductCatalog`] traits with in-memory
//! implementations for tests and PostgreSQL implementations for production.
//! Status changes go through [`OrderStore::transition`], a conditional update
//! that is the only place order status is written after creation.

pub mod catalog;
mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use catalog::ProductCatalog;
pub use common::OrderId;
pub use error::{Result, StoreError};
pub use memory::{InMemoryOrderStore, InMemoryProductCatalog};
pub use postgres::{PostgresOrderStore, PostgresProductCatalog};
pub use query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, OrderPage, OrderQuery};
pub use store::{OrderStore, OrderStoreExt, StatusUpdate, TransitionOutcome};
