use miette::Diagnostic;
use thiserror::Error;

/// Coarse classification every [`PaymentError`] maps onto.
///
/// Callers use it to decide whether to fix the input, give up, or retry the
/// whole operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Malformed input. The caller must fix it and resubmit.
    Validation,
    /// The local state does not allow the operation (unknown or unmapped user).
    Precondition,
    /// Processor or store timeout/unavailability. Safe to retry.
    TransientRemote,
    /// The processor reported a state this system does not model.
    UnhandledProcessorState,
    /// A local invariant broke (corrupt stored row and the like).
    Internal,
}

#[derive(Error, Diagnostic, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    #[diagnostic(code(payrecon::validation))]
    ValidationError(String),

    #[error("Malformed processor event: {0}")]
    #[diagnostic(
        code(payrecon::malformed_event),
        help("the event body could not be decoded; redelivering it will not help")
    )]
    MalformedEvent(String),

    #[error("User not found: {0}")]
    #[diagnostic(code(payrecon::user_not_found))]
    UserNotFound(String),

    #[error("User {0} has no processor customer")]
    #[diagnostic(
        code(payrecon::missing_customer),
        help("map the user to a processor customer before submitting payments")
    )]
    MissingCustomer(String),

    #[error("Precondition failed: {0}")]
    #[diagnostic(code(payrecon::precondition))]
    PreconditionError(String),

    #[error("Payment processor unavailable: {0}")]
    #[diagnostic(code(payrecon::processor_unavailable))]
    ProcessorUnavailable(String),

    #[error("Ledger store unavailable: {0}")]
    #[diagnostic(code(payrecon::store_unavailable))]
    StoreUnavailable(String),

    #[error("Deadline exceeded during {operation}")]
    #[diagnostic(code(payrecon::timeout))]
    Timeout { operation: &'static str },

    #[error("Unhandled processor state: {0}")]
    #[diagnostic(code(payrecon::unhandled_state))]
    UnhandledProcessorState(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(payrecon::internal))]
    InternalError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("CSV error: {0}")]
    #[diagnostic(code(payrecon::csv))]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(payrecon::io))]
    IoError(#[from] std::io::Error),
}

impl PaymentError {
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::ValidationError(_) | Self::MalformedEvent(_) => FaultKind::Validation,
            Self::UserNotFound(_) | Self::MissingCustomer(_) | Self::PreconditionError(_) => {
                FaultKind::Precondition
            }
            Self::ProcessorUnavailable(_) | Self::StoreUnavailable(_) | Self::Timeout { .. } => {
                FaultKind::TransientRemote
            }
            Self::UnhandledProcessorState(_) => FaultKind::UnhandledProcessorState,
            Self::InternalError(_) | Self::CsvError(_) | Self::IoError(_) => FaultKind::Internal,
        }
    }

    /// Whether the whole operation may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FaultKind::TransientRemote
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
