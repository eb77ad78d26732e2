use super::locks::KeyedLocks;
use crate::domain::ports::LedgerStore;
use crate::domain::transaction::{
    ApplyOutcome, TransactionId, TransactionRecord, Transition, plan_transition,
};
use crate::domain::user::{AttachOutcome, CustomerRef, User, UserId};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for the Users table.
pub const CF_USERS: &str = "users";
/// Column Family for the TransactionHistory table.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for the unique processor-customer index.
pub const CF_CUSTOMERS: &str = "customers";

/// A persistent ledger implementation using RocksDB.
///
/// Users, transactions and the customer index live in separate Column
/// Families. Every multi-row change is committed as one `WriteBatch`, so a
/// status transition and its balance credit are durable together or not at
/// all. Read-modify-write sequences run under per-key locks, always taken
/// in the order transaction id, user id, customer id.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    transaction_locks: KeyedLocks<TransactionId>,
    user_locks: KeyedLocks<UserId>,
    customer_locks: KeyedLocks<CustomerRef>,
}

impl RocksDbLedger {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_USERS, CF_TRANSACTIONS, CF_CUSTOMERS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            transaction_locks: KeyedLocks::new(),
            user_locks: KeyedLocks::new(),
            customer_locks: KeyedLocks::new(),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::internal(format!("{} column family not found", name)))
    }

    fn read<T: DeserializeOwned>(&self, cf: &'static str, key: &str) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(cf)?, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_all<T: DeserializeOwned>(&self, cf: &'static str) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn put<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &'static str,
        key: &str,
        value: &T,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf)?, key.as_bytes(), serde_json::to_vec(value)?);
        Ok(())
    }

    fn customer_owner(&self, customer: &CustomerRef) -> Result<Option<UserId>> {
        self.read(CF_CUSTOMERS, customer.as_str())
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedger {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        self.read(CF_USERS, user_id.as_str())
    }

    async fn insert_user(&self, user: User) -> Result<bool> {
        let _guard = self.user_locks.lock(&user.id).await;
        if self.get_user(&user.id).await?.is_some() {
            return Ok(false);
        }

        let _customer_guard = match &user.customer {
            Some(customer) => Some(self.customer_locks.lock(customer).await),
            None => None,
        };
        let mut batch = WriteBatch::default();
        if let Some(customer) = &user.customer {
            if self.customer_owner(customer)?.is_some() {
                return Err(PaymentError::PreconditionError(format!(
                    "customer {} is already mapped",
                    customer
                )));
            }
            self.put(&mut batch, CF_CUSTOMERS, customer.as_str(), &user.id)?;
        }
        self.put(&mut batch, CF_USERS, user.id.as_str(), &user)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        self.read_all(CF_USERS)
    }

    async fn attach_customer(
        &self,
        user_id: &UserId,
        expected: Option<&CustomerRef>,
        customer: CustomerRef,
    ) -> Result<AttachOutcome> {
        let _guard = self.user_locks.lock(user_id).await;
        let _customer_guard = self.customer_locks.lock(&customer).await;

        if let Some(owner) = self.customer_owner(&customer)?
            && &owner != user_id
        {
            return Err(PaymentError::PreconditionError(format!(
                "customer {} is already mapped to another user",
                customer
            )));
        }

        let mut user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| PaymentError::UserNotFound(user_id.to_string()))?;

        if user.customer.as_ref() != expected {
            return Ok(AttachOutcome::Unchanged(user.customer));
        }

        let mut batch = WriteBatch::default();
        if let Some(previous) = user.customer.replace(customer.clone()) {
            batch.delete_cf(self.cf(CF_CUSTOMERS)?, previous.as_str().as_bytes());
        }
        self.put(&mut batch, CF_CUSTOMERS, customer.as_str(), user_id)?;
        self.put(&mut batch, CF_USERS, user_id.as_str(), &user)?;
        self.db.write(batch)?;

        Ok(AttachOutcome::Attached(customer))
    }

    async fn get_transaction(&self, tx_id: &TransactionId) -> Result<Option<TransactionRecord>> {
        self.read(CF_TRANSACTIONS, tx_id.as_str())
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>> {
        let mut transactions: Vec<TransactionRecord> = self.read_all(CF_TRANSACTIONS)?;
        transactions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }

    async fn apply(&self, record: TransactionRecord) -> Result<ApplyOutcome> {
        let _tx_guard = self.transaction_locks.lock(&record.id).await;

        let existing = self.get_transaction(&record.id).await?;
        let (record, credit, outcome) = match plan_transition(existing.as_ref(), record) {
            Transition::Skip(outcome) => return Ok(outcome),
            Transition::Write {
                record,
                credit,
                outcome,
            } => (record, credit, outcome),
        };

        let _user_guard = self.user_locks.lock(&record.owner).await;
        let mut owner = self
            .get_user(&record.owner)
            .await?
            .ok_or_else(|| PaymentError::UserNotFound(record.owner.to_string()))?;

        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_TRANSACTIONS, record.id.as_str(), &record)?;
        if let Some((_, amount)) = credit {
            owner.credit(amount);
            self.put(&mut batch, CF_USERS, owner.id.as_str(), &owner)?;
        }
        self.db.write(batch)?;

        Ok(outcome)
    }
}
