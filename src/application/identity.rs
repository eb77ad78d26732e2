use super::context::RequestContext;
use crate::domain::intent::{NewCustomer, USER_ID_METADATA_KEY};
use crate::domain::ports::{LedgerStore, PaymentProcessor};
use crate::domain::user::{AttachOutcome, CustomerRef, UserId};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;

/// Processor customer resolved for a local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedCustomer {
    pub customer: CustomerRef,
    /// Whether this call created the customer on the processor.
    pub created: bool,
}

/// Keeps local users and processor customers 1:1.
pub struct CustomerMapper<'a> {
    store: &'a dyn LedgerStore,
    processor: &'a dyn PaymentProcessor,
}

impl<'a> CustomerMapper<'a> {
    pub fn new(store: &'a dyn LedgerStore, processor: &'a dyn PaymentProcessor) -> Self {
        Self { store, processor }
    }

    /// Returns a processor customer valid for subsequent processor calls.
    ///
    /// An existing reference is verified against the processor and returned
    /// unchanged. Otherwise a customer is created from the user's profile,
    /// tagged with the local user id, and persisted with a compare-and-set so
    /// a concurrent mapping is never overwritten. Remote failures surface to
    /// the caller without retrying.
    pub async fn ensure_customer(
        &self,
        user_id: &UserId,
        ctx: &RequestContext,
    ) -> Result<MappedCustomer> {
        let user = ctx
            .bound("get_user", self.store.get_user(user_id))
            .await?
            .ok_or_else(|| PaymentError::UserNotFound(user_id.to_string()))?;

        if let Some(existing) = &user.customer {
            let found = ctx
                .bound("find_customer", self.processor.find_customer(existing))
                .await?;
            if found.is_some() {
                return Ok(MappedCustomer {
                    customer: existing.clone(),
                    created: false,
                });
            }
            tracing::warn!(
                user_id = %user_id,
                customer = %existing,
                "Processor no longer knows the mapped customer, creating a new one"
            );
        }

        let params = NewCustomer {
            name: user.name.clone(),
            email: user.email.clone(),
            metadata: HashMap::from([(USER_ID_METADATA_KEY.to_string(), user_id.to_string())]),
        };
        let created = ctx
            .bound("create_customer", self.processor.create_customer(params))
            .await?;

        let attached = ctx
            .bound(
                "attach_customer",
                self.store
                    .attach_customer(user_id, user.customer.as_ref(), created.id.clone()),
            )
            .await?;

        match attached {
            AttachOutcome::Attached(customer) => {
                tracing::info!(user_id = %user_id, customer = %customer, "Mapped user to processor customer");
                Ok(MappedCustomer {
                    customer,
                    created: true,
                })
            }
            AttachOutcome::Unchanged(Some(winner)) => {
                tracing::warn!(
                    user_id = %user_id,
                    customer = %winner,
                    orphaned = %created.id,
                    "Concurrent mapping won, keeping the stored customer"
                );
                Ok(MappedCustomer {
                    customer: winner,
                    created: false,
                })
            }
            AttachOutcome::Unchanged(None) => Err(PaymentError::internal(format!(
                "customer reference of {} vanished during mapping",
                user_id
            ))),
        }
    }
}
