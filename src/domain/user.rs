use super::money::Balance;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque subject id issued by the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processor-side customer id (`cus_...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerRef(pub String);

impl CustomerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row of the Users table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub balance: Balance,
    /// Present once the user completed identity mapping.
    pub customer: Option<CustomerRef>,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            balance: Balance::ZERO,
            customer: None,
        }
    }

    /// Credits a settled deposit.
    pub fn credit(&mut self, amount: Balance) {
        self.balance += amount;
    }
}

/// Result of a compare-and-set on a user's customer reference.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachOutcome {
    /// The reference was written.
    Attached(CustomerRef),
    /// Someone else got there first; the stored value is returned untouched.
    Unchanged(Option<CustomerRef>),
}
