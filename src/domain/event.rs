//! Processor-pushed webhook events.

use super::intent::PaymentIntent;
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Event types the reconciler acts on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    IntentSucceeded,
    /// A payment attempt failed. The intent stays open for another attempt.
    IntentFailed,
    /// The intent was canceled and can no longer succeed.
    IntentCanceled,
    /// Anything else. Acknowledged, never acted on.
    Other(String),
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "payment_intent.succeeded" => Self::IntentSucceeded,
            "payment_intent.payment_failed" => Self::IntentFailed,
            "payment_intent.canceled" => Self::IntentCanceled,
            other => Self::Other(other.to_string()),
        })
    }
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::IntentSucceeded => "payment_intent.succeeded",
            Self::IntentFailed => "payment_intent.payment_failed",
            Self::IntentCanceled => "payment_intent.canceled",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic event envelope.
///
/// `data.object` stays untyped until the event type says what it holds, so
/// events about customers or invoices decode fine and get ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl ProcessorEvent {
    /// Decodes a raw webhook body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PaymentError::MalformedEvent(e.to_string()))
    }

    pub fn for_intent(event_type: EventType, intent: &PaymentIntent) -> Result<Self> {
        Ok(Self {
            id: None,
            event_type: event_type.as_str().to_string(),
            data: EventData {
                object: serde_json::to_value(intent)?,
            },
        })
    }

    pub fn typed_event_type(&self) -> EventType {
        match self.event_type.parse() {
            Ok(event_type) => event_type,
            Err(never) => match never {},
        }
    }

    /// Decodes the embedded payment-intent snapshot.
    pub fn intent(&self) -> Result<PaymentIntent> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            PaymentError::MalformedEvent(format!(
                "{} does not carry a payment intent: {}",
                self.event_type, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::IntentStatus;

    const SUCCEEDED: &str = r#"{
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": {"object": {
            "id": "pi_1",
            "amount": 2000,
            "currency": "usd",
            "status": "succeeded",
            "customer": "cus_1",
            "description": "top-up",
            "metadata": {"user_id": "u1"}
        }}
    }"#;

    #[test]
    fn test_decode_succeeded_event() {
        let event = ProcessorEvent::from_slice(SUCCEEDED.as_bytes()).unwrap();
        assert_eq!(event.typed_event_type(), EventType::IntentSucceeded);

        let intent = event.intent().unwrap();
        assert_eq!(intent.id.as_str(), "pi_1");
        assert_eq!(intent.amount.value(), 2000);
        assert_eq!(intent.status, IntentStatus::Succeeded);
    }

    #[test]
    fn test_unknown_event_with_foreign_object_decodes() {
        let body = r#"{"type": "customer.created", "data": {"object": {"id": "cus_1"}}}"#;
        let event = ProcessorEvent::from_slice(body.as_bytes()).unwrap();
        assert!(!event.typed_event_type().is_known());
        assert!(matches!(event.intent(), Err(PaymentError::MalformedEvent(_))));
    }

    #[test]
    fn test_garbage_body_is_malformed() {
        assert!(matches!(
            ProcessorEvent::from_slice(b"{not json"),
            Err(PaymentError::MalformedEvent(_))
        ));
        assert!(matches!(
            ProcessorEvent::from_slice(br#"{"type": "payment_intent.succeeded"}"#),
            Err(PaymentError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_bad_currency_in_snapshot_is_malformed() {
        let body = SUCCEEDED.replace("\"usd\"", "\"dollars\"");
        let event = ProcessorEvent::from_slice(body.as_bytes()).unwrap();
        assert!(matches!(event.intent(), Err(PaymentError::MalformedEvent(_))));
    }
}
