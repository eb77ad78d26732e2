use super::context::RequestContext;
use crate::domain::intent::{FutureUsage, IntentParams, IntentSubmission, USER_ID_METADATA_KEY};
use crate::domain::money::{Currency, MinorUnits};
use crate::domain::ports::{LedgerStore, PaymentProcessor};
use crate::domain::transaction::TransactionId;
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentReceipt {
    pub intent_id: TransactionId,
}

/// Creates processor-side payment intents. Never touches the ledger.
pub struct IntentSubmitter<'a> {
    store: &'a dyn LedgerStore,
    processor: &'a dyn PaymentProcessor,
}

impl<'a> IntentSubmitter<'a> {
    pub fn new(store: &'a dyn LedgerStore, processor: &'a dyn PaymentProcessor) -> Self {
        Self { store, processor }
    }

    /// Attaches the payment method to the caller's customer and creates an
    /// intent for off-session reuse, stamped with the caller's user id.
    ///
    /// The caller must already be mapped to a processor customer; this is
    /// never done implicitly here.
    pub async fn submit(
        &self,
        submission: IntentSubmission,
        ctx: &RequestContext,
    ) -> Result<IntentReceipt> {
        let amount = MinorUnits::positive(submission.amount)?;
        let currency = Currency::parse(&submission.currency)?;
        let payment_method = submission.payment_method.trim().to_string();
        if payment_method.is_empty() {
            return Err(PaymentError::ValidationError(
                "Missing payment method".to_string(),
            ));
        }

        let caller = ctx.caller()?;
        let user = ctx
            .bound("get_user", self.store.get_user(caller))
            .await?
            .ok_or_else(|| PaymentError::UserNotFound(caller.to_string()))?;
        let customer = user
            .customer
            .ok_or_else(|| PaymentError::MissingCustomer(caller.to_string()))?;

        ctx.bound(
            "attach_method",
            self.processor.attach_method(&payment_method, &customer),
        )
        .await?;

        let params = IntentParams {
            amount,
            currency,
            customer,
            payment_method,
            setup_future_usage: FutureUsage::OffSession,
            metadata: HashMap::from([(USER_ID_METADATA_KEY.to_string(), caller.to_string())]),
        };
        let intent = ctx
            .bound("create_intent", self.processor.create_intent(params))
            .await?;

        tracing::info!(
            intent_id = %intent.id,
            user_id = %caller,
            amount = intent.amount.value(),
            currency = %intent.currency,
            "Created payment intent"
        );
        Ok(IntentReceipt {
            intent_id: intent.id,
        })
    }
}
