#![allow(dead_code)]

use async_trait::async_trait;
use payrecon::application::context::RequestContext;
use payrecon::application::engine::PaymentEngine;
use payrecon::config::EngineConfig;
use payrecon::domain::intent::IntentSubmission;
use payrecon::domain::ports::LedgerStore;
use payrecon::domain::transaction::{ApplyOutcome, TransactionId, TransactionRecord};
use payrecon::domain::user::{AttachOutcome, CustomerRef, User, UserId};
use payrecon::error::{PaymentError, Result};
use payrecon::infrastructure::in_memory::InMemoryLedger;
use payrecon::infrastructure::sandbox::SandboxProcessor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const USER: &str = "u1";

/// Engine over an in-memory ledger and a sandbox, with handles kept for
/// assertions.
pub struct Harness {
    pub engine: Arc<PaymentEngine>,
    pub ledger: InMemoryLedger,
    pub sandbox: SandboxProcessor,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = InMemoryLedger::new();
        let sandbox = SandboxProcessor::with_prefix("it");
        let engine = PaymentEngine::new(
            Box::new(ledger.clone()),
            Box::new(sandbox.clone()),
            EngineConfig::default(),
        );
        Self {
            engine: Arc::new(engine),
            ledger,
            sandbox,
        }
    }

    pub fn ctx(&self) -> RequestContext {
        self.engine.context_for(UserId::new(USER))
    }

    /// Registers `u1` and maps it to a processor customer.
    pub async fn mapped_user(&self) -> CustomerRef {
        self.engine
            .register_user(User::new(UserId::new(USER), "Ada", "ada@example.com"))
            .await
            .unwrap();
        self.engine.map_customer(&self.ctx()).await.unwrap().customer
    }

    pub async fn submit(&self, amount: i64, payment_method: &str) -> TransactionId {
        self.engine
            .submit_intent(
                IntentSubmission {
                    amount,
                    currency: "usd".to_string(),
                    payment_method: payment_method.to_string(),
                },
                &self.ctx(),
            )
            .await
            .unwrap()
            .intent_id
    }

    pub async fn user(&self) -> User {
        self.ledger.get_user(&UserId::new(USER)).await.unwrap().unwrap()
    }
}

/// Ledger whose `apply` fails a set number of times before delegating.
#[derive(Clone, Default)]
pub struct FlakyLedger {
    pub inner: InMemoryLedger,
    failures_left: Arc<AtomicUsize>,
}

impl FlakyLedger {
    pub fn failing(inner: InMemoryLedger, failures: usize) -> Self {
        Self {
            inner,
            failures_left: Arc::new(AtomicUsize::new(failures)),
        }
    }
}

#[async_trait]
impl LedgerStore for FlakyLedger {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn insert_user(&self, user: User) -> Result<bool> {
        self.inner.insert_user(user).await
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        self.inner.all_users().await
    }

    async fn attach_customer(
        &self,
        user_id: &UserId,
        expected: Option<&CustomerRef>,
        customer: CustomerRef,
    ) -> Result<AttachOutcome> {
        self.inner.attach_customer(user_id, expected, customer).await
    }

    async fn get_transaction(&self, tx_id: &TransactionId) -> Result<Option<TransactionRecord>> {
        self.inner.get_transaction(tx_id).await
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.inner.all_transactions().await
    }

    async fn apply(&self, record: TransactionRecord) -> Result<ApplyOutcome> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PaymentError::StoreUnavailable("injected write failure".into()));
        }
        self.inner.apply(record).await
    }
}
