use super::context::RequestContext;
use crate::domain::event::{EventType, ProcessorEvent};
use crate::domain::intent::{IntentStatus, PaymentIntent};
use crate::domain::ports::LedgerStore;
use crate::domain::transaction::{ApplyOutcome, TransactionRecord, TransactionStatus};
use crate::domain::user::UserId;
use crate::error::{PaymentError, Result};
use chrono::Utc;

/// Acknowledgement returned to the webhook sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReceipt {
    pub accepted: bool,
    pub event_type: EventType,
    /// Ledger effect, `None` for event types that are only acknowledged.
    pub effect: Option<ApplyOutcome>,
}

/// Applies processor-pushed terminal events to the ledger.
///
/// `payment_intent.succeeded` completes and credits the deposit. Only a
/// canceled intent fails it; `payment_intent.payment_failed` on an open
/// intent is acknowledged without touching the ledger.
///
/// Ownership comes from the ledger record or from the `user_id` metadata
/// stamped on the intent at creation time. Webhook deliveries are not user
/// sessions, so the caller identity on the context is ignored.
pub struct WebhookReconciler<'a> {
    store: &'a dyn LedgerStore,
}

impl<'a> WebhookReconciler<'a> {
    pub fn new(store: &'a dyn LedgerStore) -> Self {
        Self { store }
    }

    /// Decodes a raw webhook body and handles it.
    pub async fn handle_raw(&self, body: &[u8], ctx: &RequestContext) -> Result<EventReceipt> {
        let event = ProcessorEvent::from_slice(body)?;
        self.handle_event(&event, ctx).await
    }

    pub async fn handle_event(
        &self,
        event: &ProcessorEvent,
        ctx: &RequestContext,
    ) -> Result<EventReceipt> {
        let event_type = event.typed_event_type();
        if let EventType::Other(raw) = &event_type {
            tracing::debug!(event_id = ?event.id, event_type = %raw, "Ignoring unhandled event type");
            return Ok(acknowledged(event_type));
        }

        let intent = event.intent()?;
        let status = match (&event_type, &intent.status) {
            (EventType::IntentSucceeded, IntentStatus::Succeeded) => TransactionStatus::Completed,
            (EventType::IntentFailed | EventType::IntentCanceled, IntentStatus::Canceled) => {
                TransactionStatus::Failed
            }
            // A failed attempt leaves the intent open for another payment method.
            (EventType::IntentFailed, _) => {
                tracing::info!(
                    intent_id = %intent.id,
                    event_type = %event_type,
                    status = %intent.status,
                    "Payment attempt failed, intent still open"
                );
                return Ok(acknowledged(event_type));
            }
            _ => {
                return Err(PaymentError::UnhandledProcessorState(format!(
                    "{} reported for intent {} in status {}",
                    event_type, intent.id, intent.status
                )));
            }
        };

        let owner = self.resolve_owner(&intent, ctx).await?;
        let record = TransactionRecord::deposit(
            intent.id.clone(),
            owner.clone(),
            status,
            intent.amount,
            intent.currency.clone(),
            Utc::now(),
        );
        let effect = ctx.bound("apply", self.store.apply(record)).await?;

        match effect {
            ApplyOutcome::AlreadyTerminal(current) => tracing::warn!(
                intent_id = %intent.id,
                user_id = %owner,
                event_type = %event_type,
                current = current.as_str(),
                "Event conflicts with a terminal ledger record, ignoring"
            ),
            outcome if outcome.is_applied() => tracing::info!(
                intent_id = %intent.id,
                user_id = %owner,
                event_type = %event_type,
                ledger = ?outcome,
                "Applied processor event"
            ),
            outcome => tracing::debug!(
                intent_id = %intent.id,
                event_type = %event_type,
                ledger = ?outcome,
                "Duplicate delivery, ledger unchanged"
            ),
        }

        Ok(EventReceipt {
            accepted: true,
            event_type,
            effect: Some(effect),
        })
    }

    async fn resolve_owner(&self, intent: &PaymentIntent, ctx: &RequestContext) -> Result<UserId> {
        let existing = ctx
            .bound("get_transaction", self.store.get_transaction(&intent.id))
            .await?;
        let owner = existing
            .map(|record| record.owner)
            .or_else(|| intent.owner())
            .ok_or_else(|| {
                PaymentError::ValidationError(format!(
                    "intent {} carries no local owner",
                    intent.id
                ))
            })?;

        if let Some(caller) = ctx.caller_identity()
            && caller != &owner
        {
            tracing::debug!(
                intent_id = %intent.id,
                user_id = %owner,
                caller = %caller,
                "Caller identity differs from intent owner, using the owner"
            );
        }
        Ok(owner)
    }
}

fn acknowledged(event_type: EventType) -> EventReceipt {
    EventReceipt {
        accepted: true,
        event_type,
        effect: None,
    }
}
