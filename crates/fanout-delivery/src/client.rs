//! HTTP client for webhook delivery.
//!
//! Handles request construction, header precedence, response truncation,
//! and transport error categorization. The client is connection-pooled and
//! shared by every delivery worker.

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use fanout_core::models::truncate_response_body;
use fanout_core::{DeliveryId, EventId};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::error::{DeliveryError, Result};

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Fallback timeout when a registration does not carry one.
    pub default_timeout: Duration,
    /// User agent string for outbound requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            user_agent: "fanout-webhook-delivery/0.1".to_string(),
            max_redirects: 3,
            verify_tls: true,
        }
    }
}

/// One outbound delivery request.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Delivery row this request belongs to.
    pub delivery_id: DeliveryId,
    /// Event being delivered.
    pub event_id: EventId,
    /// Destination URL.
    pub url: String,
    /// Registration-supplied headers, overlaid on the defaults.
    pub headers: HashMap<String, String>,
    /// Raw event payload, sent byte-for-byte as the body.
    pub payload: Bytes,
    /// Total-request timeout.
    pub timeout: Duration,
}

/// Classified response from a delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Canonical reason phrase for the status code.
    pub reason: String,
    /// Response body, truncated to the stored limit.
    pub body: String,
    /// Wall-clock duration of the request.
    pub duration: Duration,
    /// Whether the status was 2xx.
    pub is_success: bool,
}

/// HTTP client optimized for webhook delivery.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.default_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Creates a new delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` on client build failure.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// POSTs the payload to the destination and classifies the outcome.
    ///
    /// An `Err` means no well-formed HTTP response arrived (DNS, TCP, TLS,
    /// or timeout). Any response, success or not, comes back as `Ok`; the
    /// caller classifies by status code.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Timeout` or `DeliveryError::Network` for
    /// transport failures.
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryResponse> {
        let start = std::time::Instant::now();

        debug!(
            delivery_id = %request.delivery_id,
            event_id = %request.event_id,
            url = %request.url,
            "dispatching webhook"
        );

        let headers = build_headers(&request);

        let response = match self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .headers(headers)
            .body(request.payload.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let duration = start.elapsed();
                warn!(
                    delivery_id = %request.delivery_id,
                    duration_ms = duration.as_millis(),
                    "webhook dispatch failed: {e}"
                );

                if e.is_timeout() {
                    return Err(DeliveryError::timeout(request.timeout.as_secs()));
                }
                if e.is_connect() {
                    return Err(DeliveryError::network(format!("connection failed: {e}")));
                }
                return Err(DeliveryError::network(e.to_string()));
            },
        };

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();

        let body = match response.bytes().await {
            Ok(bytes) => truncate_response_body(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                warn!(delivery_id = %request.delivery_id, "failed to read response body: {e}");
                String::new()
            },
        };

        let duration = start.elapsed();

        debug!(
            delivery_id = %request.delivery_id,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "webhook response received"
        );

        Ok(DeliveryResponse {
            status_code: status.as_u16(),
            reason,
            body,
            duration,
            is_success: status.is_success(),
        })
    }
}

/// Builds the outbound header map.
///
/// `Content-Type: application/json` and the delivery metadata headers go in
/// first; registration headers overlay them afterwards, so a user-supplied
/// `Content-Type` wins. Headers that fail to parse are skipped with a
/// warning rather than failing the delivery.
fn build_headers(request: &DeliveryRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Ok(value) = HeaderValue::try_from(request.event_id.to_string()) {
        headers.insert(HeaderName::from_static("x-fanout-event-id"), value);
    }
    if let Ok(value) = HeaderValue::try_from(request.delivery_id.to_string()) {
        headers.insert(HeaderName::from_static("x-fanout-delivery-id"), value);
    }

    for (key, value) in &request.headers {
        let name = match HeaderName::try_from(key.as_str()) {
            Ok(name) => name,
            Err(_) => {
                warn!(header = %key, "skipping invalid header name");
                continue;
            },
        };
        let value = match HeaderValue::try_from(value.as_str()) {
            Ok(value) => value,
            Err(_) => {
                warn!(header = %key, "skipping invalid header value");
                continue;
            },
        };
        headers.insert(name, value);
    }

    headers
}
