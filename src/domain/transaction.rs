use super::money::{Balance, Currency, MinorUnits};
use super::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger transaction id. Always the processor's payment-intent id, which
/// makes it the idempotency key for every ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Statuses only move `pending -> completed` or `pending -> failed`.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed) | (Self::Pending, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A row of the TransactionHistory table.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub owner: UserId,
    pub r#type: TransactionType,
    pub status: TransactionStatus,
    pub amount: MinorUnits,
    pub currency: Currency,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn deposit(
        id: TransactionId,
        owner: UserId,
        status: TransactionStatus,
        amount: MinorUnits,
        currency: Currency,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            r#type: TransactionType::Deposit,
            status,
            amount,
            currency,
            timestamp,
        }
    }

    /// Amount this record adds to its owner's balance once completed.
    pub fn settlement_amount(&self) -> Balance {
        self.amount.to_balance(&self.currency)
    }
}

/// What a ledger `apply` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No record existed; one was written with the given status.
    Inserted(TransactionStatus),
    /// An existing record moved forward.
    Advanced {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    /// The record already carries the requested status.
    Duplicate(TransactionStatus),
    /// The record is terminal and the request would move it elsewhere.
    AlreadyTerminal(TransactionStatus),
}

impl ApplyOutcome {
    /// Whether the ledger changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Inserted(_) | Self::Advanced { .. })
    }
}

/// Write plan for one `apply`, computed under the per-transaction lock.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Write {
        record: TransactionRecord,
        /// Balance credit that must commit together with `record`.
        credit: Option<(UserId, Balance)>,
        outcome: ApplyOutcome,
    },
    Skip(ApplyOutcome),
}

/// Plans the forward-only transition from the stored record (if any) to
/// `incoming`.
///
/// A credit is planned only on the step into `completed`, so replaying a
/// completion is a no-op. When advancing, ownership stays with the stored
/// record.
pub fn plan_transition(
    existing: Option<&TransactionRecord>,
    incoming: TransactionRecord,
) -> Transition {
    let credit_for = |record: &TransactionRecord| {
        (record.status == TransactionStatus::Completed)
            .then(|| (record.owner.clone(), record.settlement_amount()))
    };

    match existing {
        None => {
            let credit = credit_for(&incoming);
            let outcome = ApplyOutcome::Inserted(incoming.status);
            Transition::Write {
                record: incoming,
                credit,
                outcome,
            }
        }
        Some(current) if current.status == incoming.status => {
            Transition::Skip(ApplyOutcome::Duplicate(current.status))
        }
        Some(current) if current.status.can_advance_to(incoming.status) => {
            let record = TransactionRecord {
                owner: current.owner.clone(),
                ..incoming
            };
            let credit = credit_for(&record);
            let outcome = ApplyOutcome::Advanced {
                from: current.status,
                to: record.status,
            };
            Transition::Write {
                record,
                credit,
                outcome,
            }
        }
        Some(current) => Transition::Skip(ApplyOutcome::AlreadyTerminal(current.status)),
    }
}
