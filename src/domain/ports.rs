use super::intent::{Customer, IntentParams, NewCustomer, PaymentIntent};
use super::transaction::{ApplyOutcome, TransactionId, TransactionRecord};
use super::user::{AttachOutcome, CustomerRef, User, UserId};
use crate::error::Result;
use async_trait::async_trait;

/// Durable Users and TransactionHistory tables.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;

    /// Inserts a user row. Returns `false` and leaves the row alone if it
    /// already exists.
    async fn insert_user(&self, user: User) -> Result<bool>;

    async fn all_users(&self) -> Result<Vec<User>>;

    /// Sets the user's customer reference iff it currently equals `expected`.
    ///
    /// Fails with a precondition error if `customer` already belongs to a
    /// different user.
    async fn attach_customer(
        &self,
        user_id: &UserId,
        expected: Option<&CustomerRef>,
        customer: CustomerRef,
    ) -> Result<AttachOutcome>;

    async fn get_transaction(&self, tx_id: &TransactionId) -> Result<Option<TransactionRecord>>;

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>>;

    /// Idempotent, forward-only upsert keyed by transaction id.
    ///
    /// The status change and any balance credit it implies commit together
    /// or not at all. Concurrent calls for the same id are serialized;
    /// calls for different ids are not.
    async fn apply(&self, record: TransactionRecord) -> Result<ApplyOutcome>;
}

/// Remote payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Returns `None` when the customer does not exist or was deleted.
    async fn find_customer(&self, customer: &CustomerRef) -> Result<Option<Customer>>;

    async fn create_customer(&self, params: NewCustomer) -> Result<Customer>;

    async fn attach_method(&self, payment_method: &str, customer: &CustomerRef) -> Result<()>;

    async fn create_intent(&self, params: IntentParams) -> Result<PaymentIntent>;

    /// Current snapshot of an intent. Has no side effect on the intent.
    async fn retrieve_intent(&self, intent_id: &TransactionId) -> Result<PaymentIntent>;

    async fn confirm_intent(&self, intent_id: &TransactionId) -> Result<PaymentIntent>;
}

pub type LedgerStoreBox = Box<dyn LedgerStore>;
pub type PaymentProcessorBox = Box<dyn PaymentProcessor>;
