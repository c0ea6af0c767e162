//! `mensa-core` — shared foundation for the order-fulfillment services.
//!
//! This crate contains **pure domain** primitives (no infrastructure
//! concerns): strongly-typed identifiers and the error taxonomy shared by
//! the stock ledger, the order relay, and the kitchen processor.

pub mod error;
pub mod id;

pub use error::{CoreError, CoreResult};
pub use id::{ItemId, OrderId, StudentId, TransactionId};
