use super::locks::KeyedLocks;
use crate::domain::ports::LedgerStore;
use crate::domain::transaction::{
    ApplyOutcome, TransactionId, TransactionRecord, Transition, plan_transition,
};
use crate::domain::user::{AttachOutcome, CustomerRef, User, UserId};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    /// Unique index: processor customer -> owning user.
    customers: HashMap<CustomerRef, UserId>,
    transactions: HashMap<TransactionId, TransactionRecord>,
}

/// A thread-safe in-memory ledger.
///
/// Both tables sit behind one `Arc<RwLock<..>>` so a status change and its
/// balance credit land under a single write guard. `apply` additionally
/// holds the per-transaction lock across its read-plan-write sequence.
/// Ideal for testing or for replays where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    tables: Arc<RwLock<Tables>>,
    locks: KeyedLocks<TransactionId>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(user_id).cloned())
    }

    async fn insert_user(&self, user: User) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) {
            return Ok(false);
        }
        if let Some(customer) = &user.customer {
            if tables.customers.contains_key(customer) {
                return Err(PaymentError::PreconditionError(format!(
                    "customer {} is already mapped",
                    customer
                )));
            }
            tables.customers.insert(customer.clone(), user.id.clone());
        }
        tables.users.insert(user.id.clone(), user);
        Ok(true)
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn attach_customer(
        &self,
        user_id: &UserId,
        expected: Option<&CustomerRef>,
        customer: CustomerRef,
    ) -> Result<AttachOutcome> {
        let mut tables = self.tables.write().await;

        if let Some(owner) = tables.customers.get(&customer)
            && owner != user_id
        {
            return Err(PaymentError::PreconditionError(format!(
                "customer {} is already mapped to another user",
                customer
            )));
        }

        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| PaymentError::UserNotFound(user_id.to_string()))?;

        if user.customer.as_ref() != expected {
            return Ok(AttachOutcome::Unchanged(user.customer.clone()));
        }

        let previous = user.customer.replace(customer.clone());
        if let Some(previous) = previous {
            tables.customers.remove(&previous);
        }
        tables.customers.insert(customer.clone(), user_id.clone());
        Ok(AttachOutcome::Attached(customer))
    }

    async fn get_transaction(&self, tx_id: &TransactionId) -> Result<Option<TransactionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(tx_id).cloned())
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>> {
        let tables = self.tables.read().await;
        let mut transactions: Vec<TransactionRecord> =
            tables.transactions.values().cloned().collect();
        transactions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }

    async fn apply(&self, record: TransactionRecord) -> Result<ApplyOutcome> {
        let _guard = self.locks.lock(&record.id).await;

        let existing = self.get_transaction(&record.id).await?;
        let (record, credit, outcome) = match plan_transition(existing.as_ref(), record) {
            Transition::Skip(outcome) => return Ok(outcome),
            Transition::Write {
                record,
                credit,
                outcome,
            } => (record, credit, outcome),
        };

        let mut tables = self.tables.write().await;
        let owner = tables
            .users
            .get_mut(&record.owner)
            .ok_or_else(|| PaymentError::UserNotFound(record.owner.to_string()))?;
        if let Some((_, amount)) = credit {
            owner.credit(amount);
        }
        tables.transactions.insert(record.id.clone(), record);
        Ok(outcome)
    }
}
