use super::confirmation::{ConfirmationOutcome, ConfirmationStateMachine};
use super::context::RequestContext;
use super::identity::{CustomerMapper, MappedCustomer};
use super::reconciler::{EventReceipt, WebhookReconciler};
use super::submission::{IntentReceipt, IntentSubmitter};
use crate::config::EngineConfig;
use crate::domain::event::ProcessorEvent;
use crate::domain::intent::IntentSubmission;
use crate::domain::ports::{LedgerStoreBox, PaymentProcessorBox};
use crate::domain::transaction::{TransactionId, TransactionRecord};
use crate::domain::user::{User, UserId};
use crate::error::Result;

/// The main entry point for payment reconciliation.
///
/// `PaymentEngine` owns the ledger store and the processor client and exposes
/// the inbound call shapes: intent submission, confirmation and processor
/// events. Each call is an independent invocation; all shared state lives in
/// the store, whose `apply` is the only path that mutates transactions and
/// balances.
pub struct PaymentEngine {
    store: LedgerStoreBox,
    processor: PaymentProcessorBox,
    config: EngineConfig,
}

impl PaymentEngine {
    /// Creates a new `PaymentEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - The ledger holding users and transaction history.
    /// * `processor` - The payment processor client.
    /// * `config` - Engine settings.
    pub fn new(store: LedgerStoreBox, processor: PaymentProcessorBox, config: EngineConfig) -> Self {
        Self {
            store,
            processor,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Context for a client request made by `caller`, using the configured
    /// call timeout.
    pub fn context_for(&self, caller: UserId) -> RequestContext {
        RequestContext::new(caller, self.config.call_timeout)
    }

    /// Context for a processor webhook delivery.
    pub fn webhook_context(&self) -> RequestContext {
        RequestContext::unauthenticated(self.config.call_timeout)
    }

    /// Seeds a local user. Returns `false` if the id already exists.
    pub async fn register_user(&self, user: User) -> Result<bool> {
        self.store.insert_user(user).await
    }

    /// Ensures the caller is mapped to a processor customer.
    pub async fn map_customer(&self, ctx: &RequestContext) -> Result<MappedCustomer> {
        let caller = ctx.caller()?;
        CustomerMapper::new(self.store.as_ref(), self.processor.as_ref())
            .ensure_customer(caller, ctx)
            .await
    }

    pub async fn submit_intent(
        &self,
        submission: IntentSubmission,
        ctx: &RequestContext,
    ) -> Result<IntentReceipt> {
        IntentSubmitter::new(self.store.as_ref(), self.processor.as_ref())
            .submit(submission, ctx)
            .await
    }

    pub async fn confirm_intent(
        &self,
        intent_id: &TransactionId,
        ctx: &RequestContext,
    ) -> Result<ConfirmationOutcome> {
        ConfirmationStateMachine::new(self.store.as_ref(), self.processor.as_ref())
            .confirm(intent_id, ctx)
            .await
    }

    pub async fn handle_processor_event(
        &self,
        event: &ProcessorEvent,
        ctx: &RequestContext,
    ) -> Result<EventReceipt> {
        WebhookReconciler::new(self.store.as_ref())
            .handle_event(event, ctx)
            .await
    }

    /// Same as [`Self::handle_processor_event`] for an undecoded webhook body.
    pub async fn handle_raw_event(&self, body: &[u8], ctx: &RequestContext) -> Result<EventReceipt> {
        WebhookReconciler::new(self.store.as_ref())
            .handle_raw(body, ctx)
            .await
    }

    pub async fn user(&self, user_id: &UserId) -> Result<Option<User>> {
        self.store.get_user(user_id).await
    }

    pub async fn transaction(&self, intent_id: &TransactionId) -> Result<Option<TransactionRecord>> {
        self.store.get_transaction(intent_id).await
    }

    /// Current state of all users, ordered by id.
    pub async fn users(&self) -> Result<Vec<User>> {
        self.store.all_users().await
    }

    /// The transaction history, oldest first.
    pub async fn transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.store.all_transactions().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::confirmation::OutcomeKind;
    use crate::domain::event::EventType;
    use crate::domain::money::Balance;
    use crate::domain::transaction::TransactionStatus;
    use crate::infrastructure::in_memory::InMemoryLedger;
    use crate::infrastructure::sandbox::SandboxProcessor;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_confirm_then_webhook_settles_once() {
        let sandbox = SandboxProcessor::with_prefix("t");
        let engine = PaymentEngine::new(
            Box::new(InMemoryLedger::new()),
            Box::new(sandbox.clone()),
            EngineConfig::default(),
        );
        let u1 = UserId::new("u1");
        engine
            .register_user(User::new(u1.clone(), "Ada", "ada@example.com"))
            .await
            .unwrap();

        let ctx = engine.context_for(u1.clone());
        engine.map_customer(&ctx).await.unwrap();
        let receipt = engine
            .submit_intent(
                IntentSubmission {
                    amount: 2000,
                    currency: "usd".into(),
                    payment_method: "pm_card_visa".into(),
                },
                &ctx,
            )
            .await
            .unwrap();

        let outcome = engine.confirm_intent(&receipt.intent_id, &ctx).await.unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Succeeded);

        let body = sandbox
            .event_body(&receipt.intent_id, EventType::IntentSucceeded)
            .unwrap();
        for _ in 0..2 {
            engine
                .handle_raw_event(&body, &engine.webhook_context())
                .await
                .unwrap();
        }

        let user = engine.user(&u1).await.unwrap().unwrap();
        assert_eq!(user.balance, Balance::new(dec!(20.00)));
        let record = engine.transaction(&receipt.intent_id).await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_map_customer_requires_caller() {
        let engine = PaymentEngine::new(
            Box::new(InMemoryLedger::new()),
            Box::new(SandboxProcessor::with_prefix("t")),
            EngineConfig::default(),
        );
        let err = engine
            .map_customer(&engine.webhook_context())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::PaymentError::PreconditionError(_)));
    }
}
