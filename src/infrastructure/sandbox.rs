use crate::domain::event::{EventType, ProcessorEvent};
use crate::domain::intent::{Customer, IntentParams, IntentStatus, NewCustomer, PaymentIntent};
use crate::domain::ports::PaymentProcessor;
use crate::domain::transaction::TransactionId;
use crate::domain::user::CustomerRef;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Test payment method that always asks for strong authentication.
pub const PM_AUTHENTICATION_REQUIRED: &str = "pm_card_authenticationRequired";
/// Test payment method whose charge is declined.
pub const PM_CHARGE_DECLINED: &str = "pm_card_chargeDeclined";
/// Test payment method that needs a second confirmation before succeeding.
pub const PM_REQUIRES_CONFIRMATION: &str = "pm_card_requiresConfirmation";

struct SandboxIntent {
    intent: PaymentIntent,
    payment_method: String,
    scripted: VecDeque<IntentStatus>,
    confirm_calls: usize,
}

#[derive(Default)]
struct SandboxState {
    next_id: u64,
    customers: HashMap<CustomerRef, Customer>,
    intents: HashMap<TransactionId, SandboxIntent>,
    customers_created: usize,
    unavailable: bool,
    latency: Option<Duration>,
}

/// In-process stand-in for the payment processor.
///
/// Confirmation follows the processor's test payment methods, unless a
/// status sequence was scripted for the intent. Ids carry a per-instance
/// prefix so intents from separate runs never collide in a persistent
/// ledger.
///
/// `Clone` shares the underlying state, so a test can keep a handle while the
/// engine owns another.
#[derive(Clone)]
pub struct SandboxProcessor {
    prefix: String,
    state: Arc<Mutex<SandboxState>>,
}

impl Default for SandboxProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxProcessor {
    /// Creates a sandbox whose ids are prefixed with the current time.
    pub fn new() -> Self {
        Self::with_prefix(format!("{:x}", chrono::Utc::now().timestamp_millis()))
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: Arc::new(Mutex::new(SandboxState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, SandboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the statuses the next confirm calls on `intent_id` report.
    pub fn script_confirm(&self, intent_id: &TransactionId, statuses: Vec<IntentStatus>) {
        if let Some(entry) = self.state().intents.get_mut(intent_id) {
            entry.scripted.extend(statuses);
        }
    }

    /// While set, every call fails as if the processor were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Delay applied before every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Deletes a customer on the processor side.
    pub fn delete_customer(&self, customer: &CustomerRef) {
        self.state().customers.remove(customer);
    }

    pub fn confirm_calls(&self, intent_id: &TransactionId) -> usize {
        self.state()
            .intents
            .get(intent_id)
            .map_or(0, |entry| entry.confirm_calls)
    }

    pub fn customers_created(&self) -> usize {
        self.state().customers_created
    }

    pub fn customer(&self, customer: &CustomerRef) -> Option<Customer> {
        self.state().customers.get(customer).cloned()
    }

    pub fn intent(&self, intent_id: &TransactionId) -> Option<PaymentIntent> {
        self.state()
            .intents
            .get(intent_id)
            .map(|entry| entry.intent.clone())
    }

    /// Renders the webhook body the processor would push for `intent_id`.
    ///
    /// The snapshot status follows the event type.
    pub fn event_body(&self, intent_id: &TransactionId, event_type: EventType) -> Result<Vec<u8>> {
        let mut intent = self.intent(intent_id).ok_or_else(|| {
            PaymentError::ValidationError(format!("No such payment intent: {}", intent_id))
        })?;
        match event_type {
            EventType::IntentSucceeded => intent.status = IntentStatus::Succeeded,
            EventType::IntentFailed => intent.status = IntentStatus::RequiresPaymentMethod,
            EventType::IntentCanceled => intent.status = IntentStatus::Canceled,
            EventType::Other(_) => {}
        }

        let mut event = ProcessorEvent::for_intent(event_type, &intent)?;
        let sequence = self.next_id();
        event.id = Some(format!("evt_{}{}", self.prefix, sequence));
        Ok(serde_json::to_vec(&event)?)
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state();
        state.next_id += 1;
        state.next_id
    }

    async fn enter(&self) -> Result<()> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.state().unavailable {
            return Err(PaymentError::ProcessorUnavailable(
                "sandbox processor unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn next_status(entry: &SandboxIntent) -> IntentStatus {
        if entry.intent.status == IntentStatus::Succeeded {
            return IntentStatus::Succeeded;
        }
        match entry.payment_method.as_str() {
            PM_AUTHENTICATION_REQUIRED => IntentStatus::RequiresAction,
            PM_CHARGE_DECLINED => IntentStatus::RequiresPaymentMethod,
            PM_REQUIRES_CONFIRMATION if entry.confirm_calls == 1 => {
                IntentStatus::RequiresConfirmation
            }
            _ => IntentStatus::Succeeded,
        }
    }
}

#[async_trait]
impl PaymentProcessor for SandboxProcessor {
    async fn find_customer(&self, customer: &CustomerRef) -> Result<Option<Customer>> {
        self.enter().await?;
        Ok(self.state().customers.get(customer).cloned())
    }

    async fn create_customer(&self, params: NewCustomer) -> Result<Customer> {
        self.enter().await?;
        let id = CustomerRef::new(format!("cus_{}{}", self.prefix, self.next_id()));
        let customer = Customer {
            id: id.clone(),
            email: Some(params.email),
            name: Some(params.name),
            metadata: params.metadata,
        };

        let mut state = self.state();
        state.customers_created += 1;
        state.customers.insert(id, customer.clone());
        Ok(customer)
    }

    async fn attach_method(&self, payment_method: &str, customer: &CustomerRef) -> Result<()> {
        self.enter().await?;
        if payment_method.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "Missing payment method".to_string(),
            ));
        }
        if !self.state().customers.contains_key(customer) {
            return Err(PaymentError::ValidationError(format!(
                "No such customer: {}",
                customer
            )));
        }
        Ok(())
    }

    async fn create_intent(&self, params: IntentParams) -> Result<PaymentIntent> {
        self.enter().await?;
        let id = TransactionId::new(format!("pi_{}{}", self.prefix, self.next_id()));
        let intent = PaymentIntent {
            id: id.clone(),
            amount: params.amount,
            currency: params.currency,
            status: IntentStatus::RequiresConfirmation,
            customer: Some(params.customer),
            description: None,
            metadata: params.metadata,
        };

        self.state().intents.insert(
            id,
            SandboxIntent {
                intent: intent.clone(),
                payment_method: params.payment_method,
                scripted: VecDeque::new(),
                confirm_calls: 0,
            },
        );
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &TransactionId) -> Result<PaymentIntent> {
        self.enter().await?;
        self.intent(intent_id).ok_or_else(|| {
            PaymentError::ValidationError(format!("No such payment intent: {}", intent_id))
        })
    }

    async fn confirm_intent(&self, intent_id: &TransactionId) -> Result<PaymentIntent> {
        self.enter().await?;
        let mut state = self.state();
        let entry = state.intents.get_mut(intent_id).ok_or_else(|| {
            PaymentError::ValidationError(format!("No such payment intent: {}", intent_id))
        })?;

        entry.confirm_calls += 1;
        let status = match entry.scripted.pop_front() {
            Some(status) => status,
            None => Self::next_status(entry),
        };
        entry.intent.status = status;
        Ok(entry.intent.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::FutureUsage;
    use crate::domain::money::{Currency, MinorUnits};

    async fn intent_with(sandbox: &SandboxProcessor, payment_method: &str) -> PaymentIntent {
        let customer = sandbox
            .create_customer(NewCustomer {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                metadata: HashMap::new(),
            })
            .await
            .unwrap();
        sandbox
            .create_intent(IntentParams {
                amount: MinorUnits(2000),
                currency: Currency::parse("usd").unwrap(),
                customer: customer.id,
                payment_method: payment_method.to_string(),
                setup_future_usage: FutureUsage::OffSession,
                metadata: HashMap::new(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_test_payment_methods_drive_confirmation() {
        let sandbox = SandboxProcessor::with_prefix("t");

        let ok = intent_with(&sandbox, "pm_card_visa").await;
        assert_eq!(
            sandbox.confirm_intent(&ok.id).await.unwrap().status,
            IntentStatus::Succeeded
        );

        let sca = intent_with(&sandbox, PM_AUTHENTICATION_REQUIRED).await;
        assert_eq!(
            sandbox.confirm_intent(&sca.id).await.unwrap().status,
            IntentStatus::RequiresAction
        );

        let twice = intent_with(&sandbox, PM_REQUIRES_CONFIRMATION).await;
        assert_eq!(
            sandbox.confirm_intent(&twice.id).await.unwrap().status,
            IntentStatus::RequiresConfirmation
        );
        assert_eq!(
            sandbox.confirm_intent(&twice.id).await.unwrap().status,
            IntentStatus::Succeeded
        );
        assert_eq!(sandbox.confirm_calls(&twice.id), 2);
    }

    #[tokio::test]
    async fn test_retrieve_does_not_confirm() {
        let sandbox = SandboxProcessor::with_prefix("t");
        let intent = intent_with(&sandbox, "pm_card_visa").await;

        let snapshot = sandbox.retrieve_intent(&intent.id).await.unwrap();
        assert_eq!(snapshot.status, IntentStatus::RequiresConfirmation);
        assert_eq!(sandbox.confirm_calls(&intent.id), 0);
        assert!(matches!(
            sandbox.retrieve_intent(&TransactionId::new("pi_missing")).await,
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_scripted_statuses_take_precedence() {
        let sandbox = SandboxProcessor::with_prefix("t");
        let intent = intent_with(&sandbox, "pm_card_visa").await;
        sandbox.script_confirm(&intent.id, vec![IntentStatus::Processing]);

        assert_eq!(
            sandbox.confirm_intent(&intent.id).await.unwrap().status,
            IntentStatus::Processing
        );
        assert_eq!(
            sandbox.confirm_intent(&intent.id).await.unwrap().status,
            IntentStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_deleted_customer_is_not_found() {
        let sandbox = SandboxProcessor::with_prefix("t");
        let intent = intent_with(&sandbox, "pm_card_visa").await;
        let customer = intent.customer.unwrap();

        assert!(sandbox.find_customer(&customer).await.unwrap().is_some());
        sandbox.delete_customer(&customer);
        assert!(sandbox.find_customer(&customer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_processor() {
        let sandbox = SandboxProcessor::with_prefix("t");
        sandbox.set_unavailable(true);
        let result = sandbox.find_customer(&CustomerRef::new("cus_1")).await;
        assert!(matches!(result, Err(PaymentError::ProcessorUnavailable(_))));
    }

    #[tokio::test]
    async fn test_event_body_decodes() {
        let sandbox = SandboxProcessor::with_prefix("t");
        let intent = intent_with(&sandbox, "pm_card_visa").await;

        let body = sandbox
            .event_body(&intent.id, EventType::IntentSucceeded)
            .unwrap();
        let event = ProcessorEvent::from_slice(&body).unwrap();
        assert_eq!(event.typed_event_type(), EventType::IntentSucceeded);
        assert_eq!(event.intent().unwrap().status, IntentStatus::Succeeded);
        assert!(event.id.unwrap().starts_with("evt_t"));
    }
}
