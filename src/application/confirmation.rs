use super::context::RequestContext;
use crate::domain::intent::{IntentStatus, PaymentIntent};
use crate::domain::ports::{LedgerStore, PaymentProcessor};
use crate::domain::transaction::{ApplyOutcome, TransactionId, TransactionRecord, TransactionStatus};
use crate::domain::user::User;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use serde::Serialize;

/// Confirm calls allowed per request: the first plus one retry.
pub const MAX_CONFIRM_ATTEMPTS: u8 = 2;

/// What the caller is told after a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Out-of-band user action (strong authentication) is required.
    RequiresAction,
    /// The charge succeeded; the deposit is pending settlement.
    Succeeded,
    /// The processor reported a non-success status, or the retry did not succeed.
    Failed,
    /// The processor reported a status this flow does not handle, or a
    /// success the ledger already recorded as failed.
    Unhandled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationOutcome {
    pub kind: OutcomeKind,
    pub intent_id: TransactionId,
    /// Last status the processor reported.
    pub status: IntentStatus,
    /// Number of confirm calls issued.
    pub attempts: u8,
    /// Ledger effect, present once the processor reported success.
    #[serde(skip)]
    pub ledger: Option<ApplyOutcome>,
    pub detail: String,
}

/// Next move of the state machine after one confirm call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Retry,
    Settle,
    Finish(OutcomeKind),
}

/// `Submitted -> {RequiresAction, Succeeded, RequiresConfirmation, Unhandled}`,
/// with a single retry edge out of `RequiresConfirmation`. After the retry
/// anything but success is a failure. Statuses the processor documents but
/// this flow does not expect fail with the raw status; undocumented ones are
/// reported as unhandled.
fn next_step(status: &IntentStatus, attempt: u8) -> Step {
    match status {
        IntentStatus::Succeeded => Step::Settle,
        IntentStatus::RequiresConfirmation if attempt < MAX_CONFIRM_ATTEMPTS => Step::Retry,
        _ if attempt > 1 => Step::Finish(OutcomeKind::Failed),
        IntentStatus::RequiresAction => Step::Finish(OutcomeKind::RequiresAction),
        IntentStatus::Unhandled(_) => Step::Finish(OutcomeKind::Unhandled),
        _ => Step::Finish(OutcomeKind::Failed),
    }
}

/// Drives one payment intent from submitted to a local outcome.
pub struct ConfirmationStateMachine<'a> {
    store: &'a dyn LedgerStore,
    processor: &'a dyn PaymentProcessor,
}

impl<'a> ConfirmationStateMachine<'a> {
    pub fn new(store: &'a dyn LedgerStore, processor: &'a dyn PaymentProcessor) -> Self {
        Self { store, processor }
    }

    /// Confirms `intent_id` and classifies the processor's answer.
    ///
    /// On success a `pending` deposit is appended for the caller. The append is
    /// idempotent on the intent id, which is what makes the single retry
    /// safe: a confirm that timed out but succeeded remotely can only ever
    /// produce one ledger row.
    pub async fn confirm(
        &self,
        intent_id: &TransactionId,
        ctx: &RequestContext,
    ) -> Result<ConfirmationOutcome> {
        let caller = ctx.caller()?;
        let user = ctx
            .bound("get_user", self.store.get_user(caller))
            .await?
            .ok_or_else(|| PaymentError::UserNotFound(caller.to_string()))?;
        if user.customer.is_none() {
            return Err(PaymentError::MissingCustomer(caller.to_string()));
        }

        let current = ctx
            .bound("retrieve_intent", self.processor.retrieve_intent(intent_id))
            .await?;
        Self::authorize(&user, &current)?;

        let mut attempt = 1;
        loop {
            let intent = ctx
                .bound("confirm_intent", self.processor.confirm_intent(intent_id))
                .await?;

            match next_step(&intent.status, attempt) {
                Step::Retry => {
                    tracing::info!(
                        intent_id = %intent_id,
                        attempt,
                        status = %intent.status,
                        "Intent still requires confirmation, retrying once"
                    );
                    attempt += 1;
                }
                Step::Settle => return self.record_pending(intent, attempt, ctx).await,
                Step::Finish(kind) => {
                    tracing::info!(
                        intent_id = %intent_id,
                        attempts = attempt,
                        status = %intent.status,
                        outcome = ?kind,
                        "Confirmation finished without settlement"
                    );
                    return Ok(Self::outcome(kind, intent, attempt, None));
                }
            }
        }
    }

    /// The intent must carry the caller's id in its metadata, or, lacking
    /// one, belong to the caller's processor customer.
    fn authorize(user: &User, intent: &PaymentIntent) -> Result<()> {
        let owned = match (intent.owner(), &intent.customer) {
            (Some(owner), _) => owner == user.id,
            (None, Some(customer)) => user.customer.as_ref() == Some(customer),
            (None, None) => false,
        };
        if owned {
            Ok(())
        } else {
            Err(PaymentError::PreconditionError(format!(
                "intent {} does not belong to user {}",
                intent.id, user.id
            )))
        }
    }

    async fn record_pending(
        &self,
        intent: PaymentIntent,
        attempts: u8,
        ctx: &RequestContext,
    ) -> Result<ConfirmationOutcome> {
        let caller = ctx.caller()?;
        let record = TransactionRecord::deposit(
            intent.id.clone(),
            caller.clone(),
            TransactionStatus::Pending,
            intent.amount,
            intent.currency.clone(),
            Utc::now(),
        );
        let applied = ctx.bound("apply", self.store.apply(record)).await?;

        if applied == ApplyOutcome::AlreadyTerminal(TransactionStatus::Failed) {
            tracing::warn!(
                intent_id = %intent.id,
                user_id = %caller,
                attempts,
                "Processor reports success for a deposit the ledger has failed"
            );
            let mut outcome = Self::outcome(OutcomeKind::Unhandled, intent, attempts, Some(applied));
            outcome.detail = format!(
                "Payment intent {} succeeded but its ledger record is failed",
                outcome.intent_id
            );
            return Ok(outcome);
        }

        tracing::info!(
            intent_id = %intent.id,
            user_id = %caller,
            attempts,
            ledger = ?applied,
            "Payment succeeded, deposit pending settlement"
        );
        Ok(Self::outcome(
            OutcomeKind::Succeeded,
            intent,
            attempts,
            Some(applied),
        ))
    }

    fn outcome(
        kind: OutcomeKind,
        intent: PaymentIntent,
        attempts: u8,
        ledger: Option<ApplyOutcome>,
    ) -> ConfirmationOutcome {
        let detail = match kind {
            OutcomeKind::RequiresAction => {
                "Additional authentication required before the payment can complete".to_string()
            }
            OutcomeKind::Succeeded => {
                "Payment succeeded and is pending. Funds are available once the processor settles it"
                    .to_string()
            }
            OutcomeKind::Failed if attempts > 1 => format!(
                "Confirmation retried but the payment did not succeed: {}",
                intent.status
            ),
            OutcomeKind::Failed => format!("Payment did not succeed: {}", intent.status),
            OutcomeKind::Unhandled => format!("Unhandled payment intent status: {}", intent.status),
        };

        ConfirmationOutcome {
            kind,
            intent_id: intent.id,
            status: intent.status,
            attempts,
            ledger,
            detail,
        }
    }
}
