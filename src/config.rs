use std::time::Duration;

/// Default bound on each processor or store call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine-wide settings, passed explicitly to `PaymentEngine::new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Budget given to a request when the caller does not supply a deadline.
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}
