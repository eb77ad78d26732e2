use crate::domain::user::UserId;
use crate::error::{PaymentError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Per-invocation context: who is calling and until when.
///
/// Every processor and store call made on behalf of the request is bounded
/// by the same deadline. Expiry surfaces as [`PaymentError::Timeout`], which
/// is transient, so the whole operation can be retried.
#[derive(Debug, Clone)]
pub struct RequestContext {
    caller: Option<UserId>,
    deadline: Instant,
}

impl RequestContext {
    pub fn new(caller: UserId, timeout: Duration) -> Self {
        Self::with_deadline(Some(caller), Instant::now() + timeout)
    }

    /// Context for processor webhook deliveries, which carry no user session.
    pub fn unauthenticated(timeout: Duration) -> Self {
        Self::with_deadline(None, Instant::now() + timeout)
    }

    pub fn with_deadline(caller: Option<UserId>, deadline: Instant) -> Self {
        Self { caller, deadline }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn caller_identity(&self) -> Option<&UserId> {
        self.caller.as_ref()
    }

    /// The authenticated caller, required by client-initiated operations.
    pub fn caller(&self) -> Result<&UserId> {
        self.caller.as_ref().ok_or_else(|| {
            PaymentError::PreconditionError("request carries no caller identity".to_string())
        })
    }

    /// Runs `call` under the request deadline.
    pub async fn bound<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout_at(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, "Deadline exceeded");
                Err(PaymentError::Timeout { operation })
            }
        }
    }
}
