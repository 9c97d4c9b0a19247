//! Webhook delivery: HTTP dispatch and the `webhook_delivery` worker.
//!
//! The delivery client performs the outbound POST with per-registration
//! timeouts and classifies the outcome; the worker drives the delivery row
//! through its lifecycle (`sending`, then `success`, `failed`, or
//! `expired`) and translates outcomes into queue retry decisions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod worker;

pub use client::{ClientConfig, DeliveryClient, DeliveryRequest, DeliveryResponse};
pub use error::{DeliveryError, Result};
pub use worker::{DeliveryHandler, WebhookDeliveryArgs};
