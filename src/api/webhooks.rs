//! Payment provider notifications

use crate::api::webhooks::schemas::{Ack, Notification};
use crate::core::payments::ActivationReport;
use crate::core::traits::PaymentActivationService;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use di_axum::Inject;
use log::{error, warn};

pub fn router() -> Router {
    Router::new().route("/webhook", post(yookassa_webhook))
}

/// Acknowledges everything except storage failures and failed status lookups
/// at the provider, which are answered with 500 so YooKassa redelivers.
/// Redelivery is safe, activation is idempotent.
async fn yookassa_webhook(
    Inject(payments): Inject<dyn PaymentActivationService>,
    body: Bytes,
) -> (StatusCode, Json<Ack>) {
    let notification: Notification = match serde_json::from_slice(&body) {
        Ok(notification) => notification,
        Err(e) => {
            warn!("unreadable payment notification: {e}");
            return (StatusCode::OK, Ack::new("ignored"));
        }
    };

    match payments.activate(&notification.into_event(), Utc::now()).await {
        Ok(report) => (StatusCode::OK, Ack::new(status_of(&report))),
        Err(e) => {
            error!("payment activation failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Ack::new("error"))
        }
    }
}

fn status_of(report: &ActivationReport) -> &'static str {
    match report {
        ActivationReport::Ignored => "ignored",
        ActivationReport::Unresolved => "unresolved",
        ActivationReport::Untracked => "untracked",
        ActivationReport::Unconfirmed => "unconfirmed",
        ActivationReport::Replayed => "duplicate",
        ActivationReport::OutOfRange => "rejected",
        ActivationReport::Activated { .. } => "ok",
    }
}

pub mod schemas {
    use crate::core::payments::PaymentEvent;
    use crate::infrastructure::entities::UserId;
    use axum::Json;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::collections::BTreeMap;

    /// Metadata keys that may carry the paying user, in order of preference.
    const USER_KEYS: [&str; 3] = ["user_id", "chat_id", "bp_user_id"];

    #[derive(Serialize, Debug)]
    pub struct Ack {
        pub status: &'static str,
    }

    impl Ack {
        pub fn new(status: &'static str) -> Json<Ack> {
            Json(Ack { status })
        }
    }

    /// YooKassa's `{event, object: {id, description, metadata}}` shape. The flat
    /// `{event_type, payment_id, description, metadata}` shape is accepted too.
    #[derive(Deserialize, Debug, Default)]
    pub struct Notification {
        #[serde(default, alias = "event_type")]
        pub event: String,
        #[serde(default)]
        pub object: Option<PaymentObject>,
        #[serde(default)]
        pub payment_id: Option<String>,
        #[serde(default)]
        pub description: Option<String>,
        #[serde(default)]
        pub metadata: BTreeMap<String, Value>,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct PaymentObject {
        #[serde(default)]
        pub id: Option<String>,
        #[serde(default)]
        pub status: Option<String>,
        #[serde(default)]
        pub description: Option<String>,
        #[serde(default)]
        pub metadata: BTreeMap<String, Value>,
    }

    impl Notification {
        pub fn into_event(self) -> PaymentEvent {
            let object = self.object.unwrap_or_default();

            let mut metadata = self.metadata;
            metadata.extend(object.metadata);

            let event_type = if self.event.is_empty() {
                object.status.unwrap_or_default()
            } else {
                self.event
            };
            let description = object
                .description
                .or(self.description)
                .unwrap_or_default();

            let user_id = USER_KEYS
                .iter()
                .find_map(|key| metadata.get(*key).and_then(as_i64))
                .or_else(|| chat_id_in(&description))
                .map(UserId);

            PaymentEvent {
                event_type,
                payment_id: object.id.or(self.payment_id),
                user_id,
                plan_code: metadata
                    .get("tariff")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                days_override: metadata.get("days").and_then(as_i64),
                description,
            }
        }
    }

    /// Metadata values arrive as strings or numbers.
    fn as_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Finds `chat_id: 123` (colon and spaces optional) in free text.
    pub fn chat_id_in(description: &str) -> Option<i64> {
        let (_, rest) = description.split_once("chat_id")?;
        let rest = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        fn parse(value: Value) -> PaymentEvent {
            serde_json::from_value::<Notification>(value)
                .unwrap()
                .into_event()
        }

        #[test]
        fn test_yookassa_notification() {
            let event = parse(json!({
                "type": "notification",
                "event": "payment.succeeded",
                "object": {
                    "id": "2c5d3a1e-000f-5000-9000-1b8a3f6e7c11",
                    "status": "succeeded",
                    "description": "GPT-4o Pro",
                    "metadata": { "user_id": "1034982624", "tariff": "gpt4o_pro" }
                }
            }));

            assert!(event.is_succeeded());
            assert_eq!(
                event.payment_id.as_deref(),
                Some("2c5d3a1e-000f-5000-9000-1b8a3f6e7c11")
            );
            assert_eq!(event.user_id, Some(UserId(1034982624)));
            assert_eq!(event.plan_code.as_deref(), Some("gpt4o_pro"));
            assert_eq!(event.description, "GPT-4o Pro");
        }

        #[test]
        fn test_flat_notification() {
            let event = parse(json!({
                "event_type": "succeeded",
                "payment_id": "pay-1",
                "description": "GPT-3.5 Lite",
                "metadata": { "user_id": 42 }
            }));

            assert!(event.is_succeeded());
            assert_eq!(event.payment_id.as_deref(), Some("pay-1"));
            assert_eq!(event.user_id, Some(UserId(42)));
        }

        #[test]
        fn test_legacy_metadata_keys() {
            let business = parse(json!({
                "event": "payment.succeeded",
                "object": {
                    "id": "p",
                    "description": "GPT-4o Business Pro",
                    "metadata": { "tariff": "business_pro", "bp_user_id": "77", "days": 90 }
                }
            }));
            assert_eq!(business.user_id, Some(UserId(77)));
            assert_eq!(business.days_override, Some(90));

            let legacy = parse(json!({
                "event": "payment.succeeded",
                "object": { "id": "p", "metadata": { "chat_id": "88" } }
            }));
            assert_eq!(legacy.user_id, Some(UserId(88)));
        }

        #[test]
        fn test_user_from_description() {
            assert_eq!(chat_id_in("GPT-4o Lite, chat_id: 123456"), Some(123456));
            assert_eq!(chat_id_in("chat_id123"), Some(123));
            assert_eq!(chat_id_in("chat_id: none"), None);
            assert_eq!(chat_id_in("GPT-4o Lite"), None);

            let event = parse(json!({
                "event": "payment.succeeded",
                "object": { "id": "p", "description": "GPT-4o Lite chat_id 555" }
            }));
            assert_eq!(event.user_id, Some(UserId(555)));
        }

        #[test]
        fn test_missing_user() {
            let event = parse(json!({
                "event": "payment.succeeded",
                "object": { "id": "p", "description": "GPT-4o Lite" }
            }));
            assert_eq!(event.user_id, None);
        }
    }
}
