//! Core service API and event fan-out for the fanout webhook service.
//!
//! [`WebhookService`] is the in-process facade front-end adapters call:
//! registration lifecycle, event publication, and delivery inspection.
//! The event-processing worker expands one published event into a delivery
//! row plus a `webhook_delivery` job per matching active registration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event_worker;
pub mod reaper;
pub mod service;

pub use event_worker::{EventProcessingArgs, EventProcessingHandler};
pub use reaper::{EventReaperArgs, EventReaperHandler};
pub use service::{NewWebhook, PushedEvent, RegisteredWebhook, StatusSelector, WebhookService};
