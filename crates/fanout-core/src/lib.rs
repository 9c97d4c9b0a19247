//! Core domain models and storage layer for the fanout webhook service.
//!
//! Provides strongly-typed identifiers, the registration/event/delivery data
//! model, the error taxonomy shared by all crates, and the PostgreSQL
//! repositories that form the persistent source of truth. Workers and the
//! public service facade are built on top of these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    Delivery, DeliveryId, DeliveryStatus, EventId, EventRecord, WebhookId, WebhookRegistration,
};
pub use storage::Storage;
pub use time::{Clock, ManualClock, RealClock};
