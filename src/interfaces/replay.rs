use crate::application::engine::PaymentEngine;
use crate::domain::event::EventType;
use crate::domain::intent::IntentSubmission;
use crate::domain::transaction::TransactionId;
use crate::domain::user::{User, UserId};
use crate::error::{PaymentError, Result};
use crate::infrastructure::sandbox::SandboxProcessor;
use serde::Deserialize;
use std::io::BufRead;

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    RegisterUser {
        user: String,
        name: String,
        email: String,
    },
    MapCustomer {
        user: String,
    },
    SubmitIntent {
        user: String,
        amount: i64,
        currency: String,
        payment_method: String,
    },
    ConfirmIntent {
        user: String,
        intent_id: String,
    },
    /// Delivers the webhook the processor would send for `intent_id`.
    ProcessorEvent {
        event_type: String,
        intent_id: String,
    },
}

/// Counters reported at the end of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub executed: usize,
    pub failed: usize,
    pub unreadable: usize,
}

/// Runs JSON-lines command scripts against a [`PaymentEngine`] backed by a
/// sandbox processor.
///
/// `@N` in an intent id refers to the N-th intent submitted during this
/// replay, since sandbox ids are only known once created.
pub struct Replay {
    engine: PaymentEngine,
    sandbox: SandboxProcessor,
    submitted: Vec<TransactionId>,
}

impl Replay {
    /// `sandbox` must share state with the processor owned by `engine`.
    pub fn new(engine: PaymentEngine, sandbox: SandboxProcessor) -> Self {
        Self {
            engine,
            sandbox,
            submitted: Vec::new(),
        }
    }

    pub fn engine(&self) -> &PaymentEngine {
        &self.engine
    }

    pub fn into_engine(self) -> PaymentEngine {
        self.engine
    }

    /// Executes every command in `source`. Blank lines and lines starting
    /// with `#` are skipped; unreadable lines and failed commands are logged
    /// and do not stop the replay.
    pub async fn run<R: BufRead>(&mut self, source: R) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();

        for (index, line) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let command: Command = match serde_json::from_str(trimmed) {
                Ok(command) => command,
                Err(e) => {
                    tracing::warn!(line = line_no, error = %e, "Error reading command");
                    summary.unreadable += 1;
                    continue;
                }
            };

            match self.execute(command).await {
                Ok(()) => summary.executed += 1,
                Err(e) => {
                    tracing::warn!(
                        line = line_no,
                        error = %e,
                        kind = ?e.kind(),
                        retryable = e.is_retryable(),
                        "Command failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    pub async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::RegisterUser { user, name, email } => {
                let created = self
                    .engine
                    .register_user(User::new(UserId::new(user.clone()), name, email))
                    .await?;
                tracing::info!(user_id = %user, created, "Registered user");
            }
            Command::MapCustomer { user } => {
                let ctx = self.engine.context_for(UserId::new(user));
                let mapped = self.engine.map_customer(&ctx).await?;
                tracing::info!(customer = %mapped.customer, created = mapped.created, "Mapped customer");
            }
            Command::SubmitIntent {
                user,
                amount,
                currency,
                payment_method,
            } => {
                let ctx = self.engine.context_for(UserId::new(user));
                let submission = IntentSubmission {
                    amount,
                    currency,
                    payment_method,
                };
                let receipt = self.engine.submit_intent(submission, &ctx).await?;
                self.submitted.push(receipt.intent_id);
            }
            Command::ConfirmIntent { user, intent_id } => {
                let intent_id = self.resolve(&intent_id)?;
                let ctx = self.engine.context_for(UserId::new(user));
                let outcome = self.engine.confirm_intent(&intent_id, &ctx).await?;
                tracing::info!(
                    intent_id = %outcome.intent_id,
                    outcome = ?outcome.kind,
                    status = %outcome.status,
                    attempts = outcome.attempts,
                    detail = %outcome.detail,
                    "Confirmation outcome"
                );
            }
            Command::ProcessorEvent {
                event_type,
                intent_id,
            } => {
                let intent_id = self.resolve(&intent_id)?;
                let event_type: EventType = event_type.parse().unwrap_or_else(|e| match e {});
                let body = self.sandbox.event_body(&intent_id, event_type)?;
                let receipt = self
                    .engine
                    .handle_raw_event(&body, &self.engine.webhook_context())
                    .await?;
                tracing::info!(
                    intent_id = %intent_id,
                    event_type = %receipt.event_type,
                    accepted = receipt.accepted,
                    ledger = ?receipt.effect,
                    "Processor event handled"
                );
            }
        }
        Ok(())
    }

    fn resolve(&self, intent_id: &str) -> Result<TransactionId> {
        let Some(position) = intent_id.strip_prefix('@') else {
            return Ok(TransactionId::new(intent_id));
        };
        position
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|n| self.submitted.get(n))
            .cloned()
            .ok_or_else(|| {
                PaymentError::ValidationError(format!("No submitted intent {}", intent_id))
            })
    }
}
