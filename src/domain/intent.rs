//! Processor-side objects as this system sees them.

use super::money::{Currency, MinorUnits};
use super::transaction::TransactionId;
use super::user::{CustomerRef, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Metadata key linking a processor object back to the local user.
pub const USER_ID_METADATA_KEY: &str = "user_id";

/// Payment-intent lifecycle status as reported by the processor.
///
/// ```text
/// requires_payment_method -> requires_confirmation -> requires_action (3DS)
///                                                  -> processing
///                                                  -> succeeded
/// ```
///
/// Statuses the processor may introduce later land in `Unhandled` with the
/// raw string preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    Unhandled(String),
}

impl IntentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Unhandled(raw) => raw,
        }
    }
}

impl FromStr for IntentStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "processing" => Self::Processing,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            "succeeded" => Self::Succeeded,
            other => Self::Unhandled(other.to_string()),
        })
    }
}

impl From<String> for IntentStatus {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<IntentStatus> for String {
    fn from(status: IntentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a payment intent returned by the processor or embedded in a
/// webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: TransactionId,
    pub amount: MinorUnits,
    pub currency: Currency,
    pub status: IntentStatus,
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// Local owner stamped on the intent at creation time.
    pub fn owner(&self) -> Option<UserId> {
        self.metadata
            .get(USER_ID_METADATA_KEY)
            .filter(|id| !id.is_empty())
            .map(|id| UserId::new(id.clone()))
    }
}

/// Processor-side intent reuse policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutureUsage {
    OffSession,
    OnSession,
}

/// Parameters for creating a payment intent.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentParams {
    pub amount: MinorUnits,
    pub currency: Currency,
    pub customer: CustomerRef,
    pub payment_method: String,
    pub setup_future_usage: FutureUsage,
    pub metadata: HashMap<String, String>,
}

/// Client input for creating an intent. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSubmission {
    pub amount: i64,
    pub currency: String,
    pub payment_method: String,
}

/// Processor customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerRef,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Parameters for creating a processor customer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub metadata: HashMap<String, String>,
}
