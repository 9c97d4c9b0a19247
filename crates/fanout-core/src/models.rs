//! Domain models and strongly-typed identifiers.
//!
//! Defines webhook registrations, event records, delivery rows, and newtype
//! ID wrappers for compile-time type safety. Includes database serialization
//! traits and the delivery status state machine.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Default per-registration request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: i32 = 30;

/// Upper bound on the per-registration request timeout.
pub const MAX_TIMEOUT_SECONDS: i32 = 300;

/// Default event time-to-live in seconds when the caller passes none.
pub const DEFAULT_TTL_SECONDS: i64 = 3600;

/// Default application-level attempt budget per delivery.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Response bodies stored on delivery rows are truncated to this many bytes.
pub const RESPONSE_BODY_LIMIT: usize = 1000;

/// Strongly-typed webhook registration identifier.
///
/// Wraps a UUID to prevent mixing with event or delivery ids. Assigned once
/// at registration time and stable for the lifetime of the subscription.
///
/// # Example
///
/// ```
/// use fanout_core::models::WebhookId;
/// let webhook_id = WebhookId::new();
/// println!("registered webhook: {}", webhook_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookId(pub Uuid);

impl WebhookId {
    /// Creates a new random webhook ID.
    ///
    /// Uses UUID v4 for globally unique identifiers without coordination.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WebhookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for WebhookId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for WebhookId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for WebhookId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for WebhookId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed event identifier.
///
/// Events are immutable once written; this ID follows the event from the
/// `PushEvent` call through fan-out and every delivery that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for EventId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for EventId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed delivery identifier.
///
/// One delivery tracks the attempt sequence of one event against one
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    /// Creates a new random delivery ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DeliveryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for DeliveryId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Delivery lifecycle status.
///
/// Deliveries progress through these states while the delivery worker drives
/// HTTP attempts:
///
/// ```text
/// Pending -> Sending -> Success
///                    -> Failed  -> Sending (queue retry)
///                    -> Expired
/// ```
///
/// `Success` and `Expired` are terminal: once reached, no further
/// transitions are accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created during fan-out, no attempt made yet.
    Pending,

    /// A worker is performing the HTTP request right now.
    Sending,

    /// Endpoint answered with a 2xx response. Terminal.
    Success,

    /// The last concluded attempt failed.
    ///
    /// The queue may still retry; the row stays `failed` between attempts
    /// and after the queue gives up.
    Failed,

    /// Waiting for the next scheduled attempt.
    ///
    /// Transient bookkeeping state between attempts. Writing it is
    /// optional; rows may go straight from `failed` back to `sending`.
    Retrying,

    /// The event's TTL elapsed before a successful delivery. Terminal.
    Expired,
}

impl DeliveryStatus {
    /// Returns true for statuses that accept no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Expired)
    }

    /// Returns true for statuses that conclude a dispatch attempt.
    ///
    /// Only these writes advance `attempt_count`; the `sending` mark and
    /// the expiry guard record state without consuming an attempt.
    pub const fn concludes_attempt(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Retrying)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sending => write!(f, "sending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Retrying => write!(f, "retrying"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl sqlx::Type<PgDb> for DeliveryStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("invalid delivery status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// A webhook registration: a durable subscription binding a namespace and a
/// set of event names to a delivery URL and request shape.
///
/// Registrations with `active = false` never produce new deliveries, but
/// deliveries already fanned out proceed to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookRegistration {
    /// Unique identifier for this registration.
    pub id: WebhookId,

    /// Namespace the subscription is scoped to.
    pub namespace: String,

    /// Event names this registration subscribes to.
    ///
    /// Stored as a JSON array treated as a set: duplicates collapse at
    /// registration time and matching is exact-equal.
    pub events: sqlx::types::Json<Vec<String>>,

    /// Destination URL for webhook delivery.
    pub url: String,

    /// User-supplied request headers, overlaid on the defaults at dispatch.
    pub headers: sqlx::types::Json<HashMap<String, String>>,

    /// HTTP request timeout in seconds for deliveries to this endpoint.
    #[sqlx(rename = "timeout")]
    pub timeout_seconds: i32,

    /// Whether this registration participates in fan-out.
    pub active: bool,

    /// Free-text description for operators.
    pub description: String,

    /// When this registration was created.
    pub created_at: DateTime<Utc>,

    /// When this registration was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl WebhookRegistration {
    /// Event names as a plain slice.
    pub fn events(&self) -> &[String] {
        &self.events.0
    }

    /// Headers as a regular map.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers.0
    }

    /// Returns true when this registration subscribes to `event`.
    ///
    /// Matching is exact string equality, no patterns.
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.0.iter().any(|e| e == event)
    }
}

/// One published event occurrence.
///
/// Written exactly once by the event-processing worker, before any delivery
/// row referencing it. Never mutated afterwards; rows past `expires_at` are
/// eligible for background reaping.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    /// Unique identifier, generated at `PushEvent` time.
    pub id: EventId,

    /// Namespace the event was published under.
    pub namespace: String,

    /// Event name, matched exactly against registration event sets.
    pub event: String,

    /// Opaque payload, validated as JSON at the boundary, stored verbatim.
    pub payload: String,

    /// Time-to-live in seconds from creation.
    #[sqlx(rename = "ttl")]
    pub ttl_seconds: i64,

    /// Caller-supplied metadata, not interpreted by the pipeline.
    pub metadata: sqlx::types::Json<HashMap<String, String>>,

    /// When the event was published.
    pub created_at: DateTime<Utc>,

    /// Retry deadline: `created_at + ttl_seconds`.
    pub expires_at: DateTime<Utc>,
}

impl EventRecord {
    /// Builds an event record, deriving `expires_at` from the TTL.
    pub fn new(
        id: EventId,
        namespace: String,
        event: String,
        payload: String,
        ttl_seconds: i64,
        metadata: HashMap<String, String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let expires_at = created_at + chrono::Duration::seconds(ttl_seconds);
        Self {
            id,
            namespace,
            event,
            payload,
            ttl_seconds,
            metadata: sqlx::types::Json(metadata),
            created_at,
            expires_at,
        }
    }
}

/// The attempt sequence of one event against one registration.
///
/// Tracks HTTP attempt outcomes so operators can inspect delivery state via
/// `GetWebhookStatus`. `attempt_count` counts concluded attempts; the
/// `sending` mark does not advance it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    /// Unique identifier for this delivery.
    pub id: DeliveryId,

    /// Registration this delivery targets.
    pub webhook_id: WebhookId,

    /// Event being delivered.
    pub event_id: EventId,

    /// Current state in the delivery lifecycle.
    pub status: DeliveryStatus,

    /// Concluded attempts so far.
    pub attempt_count: i32,

    /// Application-level attempt budget before the row parks in `failed`.
    pub max_attempts: i32,

    /// When the delivery row was fanned out.
    pub created_at: DateTime<Utc>,

    /// Timestamp of the most recent status write, if any attempt started.
    pub last_attempted_at: Option<DateTime<Utc>>,

    /// When the next retry is scheduled, if known.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Deadline inherited from the event's `expires_at`.
    pub expires_at: DateTime<Utc>,

    /// HTTP status of the last response, 0 when none was received.
    pub response_code: i32,

    /// Response body of the last attempt, truncated to
    /// [`RESPONSE_BODY_LIMIT`] bytes. Empty when none was received.
    pub response_body: String,

    /// Textual failure description.
    ///
    /// Non-empty exactly when the attempt produced no well-formed HTTP
    /// response or the status classified as failure.
    pub error_message: String,
}

impl Delivery {
    /// Builds a fresh pending delivery for fan-out.
    pub fn pending(
        webhook_id: WebhookId,
        event_id: EventId,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            webhook_id,
            event_id,
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at,
            last_attempted_at: None,
            next_retry_at: None,
            expires_at,
            response_code: 0,
            response_body: String::new(),
            error_message: String::new(),
        }
    }
}

/// Truncates a response body to the stored limit.
///
/// Cuts on a UTF-8 boundary so the stored prefix stays valid text.
pub fn truncate_response_body(body: &str) -> String {
    if body.len() <= RESPONSE_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = RESPONSE_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
