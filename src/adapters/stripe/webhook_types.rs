//! Stripe wire types.
//!
//! These types mirror the Stripe JSON objects the service reads, both in
//! webhook payloads and in API responses. Only the fields reconciliation
//! needs are modelled; everything else is ignored on deserialization.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::ports::{
    CheckoutSessionDetails, PaymentError, Subscription, WebhookEvent, WebhookEventData,
    WebhookEventKind,
};

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// Header is empty or missing.
    MissingHeader,
    /// Missing timestamp component (t=...).
    MissingTimestamp,
    /// Missing v1 signature component.
    MissingV1Signature,
    /// Invalid timestamp format.
    InvalidTimestamp,
    /// Invalid signature format (not valid hex).
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing Stripe-Signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed Stripe-Signature header components.
///
/// The header format is `t=timestamp,v1=signature[,v1=signature...]`.
/// Stripe sends several `v1` entries while a signing secret is being
/// rolled; any of them may match.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    /// Unix timestamp when Stripe generated the event.
    pub timestamp: i64,

    /// v1 signatures (HMAC-SHA256, hex-decoded).
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse a Stripe-Signature header into components.
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MissingTimestamp)?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signatures.push(
                        hex_decode(value.trim()).ok_or(SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                // v0 and unknown schemes are ignored
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureParseError::MissingTimestamp)?;
        if v1_signatures.is_empty() {
            return Err(SignatureParseError::MissingV1Signature);
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

/// Decode a hex string to bytes.
fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// Encode bytes to hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Raw Stripe webhook event as received from the API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    pub created: i64,

    /// Event payload containing the affected object.
    pub data: StripeEventData,

    /// Whether this is a live or test event.
    #[serde(default)]
    pub livemode: bool,

    /// Stripe API version used for this event.
    pub api_version: Option<String>,
}

impl StripeWebhookEvent {
    /// Converts the envelope into the domain event, decoding `data.object`
    /// according to the event kind.
    pub fn into_webhook_event(self) -> Result<WebhookEvent, PaymentError> {
        let kind = WebhookEventKind::from_type(&self.event_type);
        let object = self.data.object;

        let data = match &kind {
            WebhookEventKind::CheckoutCompleted => {
                let session: StripeCheckoutSession = serde_json::from_value(object).map_err(|e| {
                    PaymentError::malformed_event(format!("Invalid checkout session: {}", e))
                })?;
                WebhookEventData::Checkout(session.into())
            }

            WebhookEventKind::SubscriptionUpdated | WebhookEventKind::SubscriptionDeleted => {
                let sub: StripeSubscription = serde_json::from_value(object).map_err(|e| {
                    PaymentError::malformed_event(format!("Invalid subscription: {}", e))
                })?;
                WebhookEventData::Subscription(sub.into())
            }

            WebhookEventKind::InvoicePaid | WebhookEventKind::InvoiceFailed => {
                let invoice: StripeInvoice = serde_json::from_value(object).map_err(|e| {
                    PaymentError::malformed_event(format!("Invalid invoice: {}", e))
                })?;
                WebhookEventData::Invoice {
                    invoice_id: invoice.id,
                    customer_id: invoice.customer,
                    subscription_id: invoice.subscription,
                }
            }

            WebhookEventKind::Other(_) => WebhookEventData::Raw {
                json: object.to_string(),
            },
        };

        Ok(WebhookEvent {
            id: self.id,
            kind,
            data,
            created_at: self.created,
        })
    }
}

/// Event data container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object affected by this event.
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Object Types
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Checkout Session object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCheckoutSession {
    /// Unique session identifier (cs_...).
    pub id: String,

    /// Customer ID if customer was created/attached.
    #[serde(default, deserialize_with = "optional_expandable_id")]
    pub customer: Option<String>,

    /// Subscription ID if checkout created a subscription.
    #[serde(default, deserialize_with = "optional_expandable_id")]
    pub subscription: Option<String>,

    /// Session payment status (paid, unpaid, no_payment_required).
    #[serde(default)]
    pub payment_status: String,

    /// Payment mode (payment, setup, subscription).
    #[serde(default)]
    pub mode: String,

    /// Our user id, set when the session was created.
    pub client_reference_id: Option<String>,

    /// Custom metadata attached to the session.
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Hosted checkout URL (present while the session is open).
    pub url: Option<String>,

    /// Totals, used to tell whether a discount applied.
    pub total_details: Option<StripeTotalDetails>,

    /// Applied discount, when expanded.
    pub discount: Option<StripeDiscount>,
}

/// Checkout session totals.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeTotalDetails {
    #[serde(default)]
    pub amount_discount: i64,
}

/// Discount applied to a checkout session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeDiscount {
    pub promotion_code: Option<StripePromotionCode>,
}

/// A promotion code is either an id or, when expanded, an object with a `code`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StripePromotionCode {
    Expanded { code: String },
    Id(String),
}

impl StripeCheckoutSession {
    /// Promotion code, only when a discount was actually granted.
    pub fn promotion_code(&self) -> Option<String> {
        let discounted = self
            .total_details
            .as_ref()
            .map_or(false, |t| t.amount_discount > 0);
        if !discounted {
            return None;
        }

        match self.discount.as_ref()?.promotion_code.as_ref()? {
            StripePromotionCode::Expanded { code } => Some(code.clone()),
            StripePromotionCode::Id(id) => Some(id.clone()),
        }
    }
}

impl From<StripeCheckoutSession> for CheckoutSessionDetails {
    fn from(session: StripeCheckoutSession) -> Self {
        let promotion_code = session.promotion_code();
        CheckoutSessionDetails {
            metadata_user_id: session.metadata.get("userId").cloned(),
            id: session.id,
            customer_id: session.customer,
            subscription_id: session.subscription,
            payment_status: session.payment_status,
            mode: session.mode,
            client_reference_id: session.client_reference_id,
            promotion_code,
        }
    }
}

/// Stripe Customer object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    /// Unique customer identifier (cus_...).
    pub id: String,

    /// Unix timestamp of creation.
    #[serde(default)]
    pub created: i64,

    /// Whether the customer has been deleted.
    #[serde(default)]
    pub deleted: bool,
}

/// Stripe Subscription object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    /// Customer ID owning this subscription.
    #[serde(deserialize_with = "expandable_id")]
    pub customer: String,

    /// Subscription status.
    pub status: String,

    /// Current period end (Unix timestamp).
    pub current_period_end: Option<i64>,

    /// Whether subscription cancels at period end.
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl From<StripeSubscription> for Subscription {
    fn from(sub: StripeSubscription) -> Self {
        Subscription {
            id: sub.id,
            customer_id: sub.customer,
            status: sub.status,
            current_period_end: sub.current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
        }
    }
}

/// Stripe Invoice object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeInvoice {
    /// Unique invoice identifier (in_...).
    pub id: String,

    /// Customer ID.
    #[serde(default, deserialize_with = "optional_expandable_id")]
    pub customer: Option<String>,

    /// Associated subscription ID.
    #[serde(default, deserialize_with = "optional_expandable_id")]
    pub subscription: Option<String>,
}

/// A page of a Stripe list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

/// Reference fields come back as an id, or as the full object when expanded.
#[derive(Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

fn expandable_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Expandable::deserialize(deserializer).map(Expandable::into_id)
}

fn optional_expandable_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Expandable>::deserialize(deserializer).map(|value| value.map(Expandable::into_id))
}

/// Stripe billing portal session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePortalSession {
    pub id: String,
    pub url: String,
}

/// Error envelope returned by the Stripe API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiError {
    pub error: StripeApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiErrorBody {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}
