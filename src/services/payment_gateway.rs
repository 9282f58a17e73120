use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::common::Currency;

type HmacSha256 = Hmac<Sha256>;

/// Signed webhook timestamps older than this are rejected as replays.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::RequiresCapture => "requires_capture",
            IntentStatus::Canceled => "canceled",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentError {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub last_payment_error: Option<PaymentError>,
}

impl PaymentIntent {
    pub fn failure_message(&self) -> Option<String> {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.message.clone())
    }
}

#[derive(Debug, Clone)]
pub struct IntentRequest {
    /// Amount in minor units (cents).
    pub amount_minor: i64,
    pub currency: Currency,
    pub campaign_id: String,
    pub donor_email: String,
    pub donor_name: String,
    pub is_anonymous: bool,
    pub message: Option<String>,
}

/// Converts a major-unit amount to the gateway's minor units.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: PaymentError,
}

#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(StripeGateway {
            client,
            api_base: config.stripe_api_base.clone(),
            secret_key: config.stripe_secret_key.clone(),
        })
    }

    async fn read_intent(response: reqwest::Response) -> Result<PaymentIntent> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| status.to_string());
            tracing::error!(%status, "payment gateway rejected request: {}", message);
            return Err(AppError::external_service(message));
        }
        Ok(response.json::<PaymentIntent>().await?)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent> {
        let form = [
            ("amount", request.amount_minor.to_string()),
            ("currency", request.currency.code().to_lowercase()),
            ("metadata[campaignId]", request.campaign_id.clone()),
            ("metadata[donorEmail]", request.donor_email.clone()),
            ("metadata[donorName]", request.donor_name.clone()),
            ("metadata[isAnonymous]", request.is_anonymous.to_string()),
            ("metadata[message]", request.message.clone().unwrap_or_default()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let intent = Self::read_intent(response).await?;
        tracing::info!(intent = %intent.id, amount = request.amount_minor, "payment intent created");
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::read_intent(response).await
    }
}

/// Event types the donation flow reacts to.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    PaymentSucceeded(PaymentIntent),
    PaymentFailed(PaymentIntent),
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| AppError::WebhookSignature(format!("malformed event: {}", e)))?;

    let intent = |object: serde_json::Value| {
        serde_json::from_value::<PaymentIntent>(object)
            .map_err(|e| AppError::WebhookSignature(format!("malformed payment intent: {}", e)))
    };

    match raw.event_type.as_str() {
        "payment_intent.succeeded" => Ok(GatewayEvent::PaymentSucceeded(intent(raw.data.object)?)),
        "payment_intent.payment_failed" => Ok(GatewayEvent::PaymentFailed(intent(raw.data.object)?)),
        _ => Ok(GatewayEvent::Ignored(raw.event_type)),
    }
}

/// Verifies a `t=<unix>,v1=<hex>` signature header over `"<t>.<payload>"`.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::WebhookSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(AppError::WebhookSignature("missing v1 signature".into()));
    }
    if now_unix - timestamp > WEBHOOK_TOLERANCE_SECS {
        return Err(AppError::WebhookSignature("timestamp outside tolerance".into()));
    }

    let matches = signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(AppError::WebhookSignature(
            "no signatures found matching the expected signature for payload".into(),
        ))
    }
}

#[cfg(test)]
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Gateway double whose intents are created and settled by the test.
#[cfg(test)]
pub mod scripted {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct ScriptedGateway {
        intents: Mutex<HashMap<String, PaymentIntent>>,
        next_id: AtomicUsize,
        pub unavailable: AtomicBool,
    }

    impl ScriptedGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn settle(&self, intent_id: &str, status: IntentStatus) {
            if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
                intent.status = status;
            }
        }

        pub fn intent_count(&self) -> usize {
            self.intents.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::external_service("gateway unavailable"));
            }
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let intent = PaymentIntent {
                id: format!("pi_test_{}", n),
                client_secret: Some(format!("pi_test_{}_secret", n)),
                status: IntentStatus::RequiresPaymentMethod,
                amount: request.amount_minor,
                last_payment_error: None,
            };
            self.intents
                .lock()
                .unwrap()
                .insert(intent.id.clone(), intent.clone());
            Ok(intent)
        }

        async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
            self.intents
                .lock()
                .unwrap()
                .get(intent_id)
                .cloned()
                .ok_or_else(|| AppError::external_service("No such payment_intent"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let header = signature_header(SECRET, 1_700_000_000, body);
        assert!(verify_webhook_signature(body, &header, SECRET, 1_700_000_010).is_ok());
    }

    #[test]
    fn rejects_tampered_body_wrong_secret_and_stale_timestamp() {
        let body = br#"{"amount":100}"#;
        let header = signature_header(SECRET, 1_700_000_000, body);

        assert!(verify_webhook_signature(br#"{"amount":999}"#, &header, SECRET, 1_700_000_000).is_err());
        assert!(verify_webhook_signature(body, &header, "whsec_other", 1_700_000_000).is_err());
        assert!(verify_webhook_signature(body, &header, SECRET, 1_700_000_000 + 301).is_err());
        assert!(verify_webhook_signature(body, "v1=abcd", SECRET, 1_700_000_000).is_err());
        assert!(verify_webhook_signature(body, "t=1700000000", SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn any_matching_v1_is_enough() {
        let body = b"{}";
        let good = signature_header(SECRET, 42, body);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t=42,v1=deadbeef,v1={}", good_sig);
        assert!(verify_webhook_signature(body, &header, SECRET, 42).is_ok());
    }

    #[test]
    fn parses_known_and_unknown_events() {
        let succeeded = br#"{"id":"evt_1","type":"payment_intent.succeeded",
            "data":{"object":{"id":"pi_1","status":"succeeded","amount":2500}}}"#;
        match parse_event(succeeded).unwrap() {
            GatewayEvent::PaymentSucceeded(intent) => {
                assert_eq!(intent.id, "pi_1");
                assert_eq!(intent.status, IntentStatus::Succeeded);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let failed = br#"{"type":"payment_intent.payment_failed",
            "data":{"object":{"id":"pi_2","status":"requires_payment_method",
            "last_payment_error":{"message":"card declined"}}}}"#;
        match parse_event(failed).unwrap() {
            GatewayEvent::PaymentFailed(intent) => {
                assert_eq!(intent.failure_message().as_deref(), Some("card declined"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let other = br#"{"type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#;
        assert!(matches!(parse_event(other).unwrap(), GatewayEvent::Ignored(t) if t == "charge.refunded"));
    }

    #[test]
    fn minor_units_round() {
        assert_eq!(to_minor_units(25.0), 2_500);
        assert_eq!(to_minor_units(19.999), 2_000);
        assert_eq!(to_minor_units(10.5), 1_050);
    }
}
