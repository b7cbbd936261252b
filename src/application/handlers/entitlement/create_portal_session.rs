//! CreatePortalSessionHandler - Opens the billing portal for a customer.

use std::sync::Arc;
use std::time::Duration;

use super::extension_urls::{portal_return_url, validate_client_id};
use super::provider_call::{bounded, DEFAULT_PROVIDER_TIMEOUT};
use crate::domain::entitlement::EntitlementError;
use crate::domain::foundation::UserId;
use crate::ports::{EntitlementStore, PaymentProvider};

/// Command to create a billing portal session.
#[derive(Debug, Clone)]
pub struct CreatePortalSessionCommand {
    pub user_id: UserId,
    pub client_id: String,
}

/// Result of portal creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePortalSessionResult {
    pub portal_url: String,
}

/// Handler for portal creation.
pub struct CreatePortalSessionHandler {
    store: Arc<dyn EntitlementStore>,
    payment_provider: Arc<dyn PaymentProvider>,
    timeout: Duration,
}

impl CreatePortalSessionHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, payment_provider: Arc<dyn PaymentProvider>) -> Self {
        Self {
            store,
            payment_provider,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn handle(
        &self,
        cmd: CreatePortalSessionCommand,
    ) -> Result<CreatePortalSessionResult, EntitlementError> {
        let client_id = validate_client_id(&cmd.client_id)?;

        let customer_id = self
            .store
            .find_by_user(&cmd.user_id)
            .await?
            .and_then(|r| r.billing_customer_id)
            .ok_or_else(|| EntitlementError::not_found("No active subscription found"))?;

        let portal = bounded(
            self.timeout,
            "create_portal_session",
            self.payment_provider
                .create_portal_session(&customer_id, &portal_return_url(client_id)),
        )
        .await?;

        Ok(CreatePortalSessionResult {
            portal_url: portal.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryEntitlementStore;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::entitlement::EntitlementRecord;
    use crate::domain::foundation::Timestamp;
    use crate::ports::PortalSession;

    fn test_user_id() -> UserId {
        UserId::new("test-user-123").unwrap()
    }

    fn command() -> CreatePortalSessionCommand {
        CreatePortalSessionCommand {
            user_id: test_user_id(),
            client_id: "extid".into(),
        }
    }

    #[tokio::test]
    async fn returns_portal_url_for_customer() {
        let store = InMemoryEntitlementStore::new();
        let mut record = EntitlementRecord::new(test_user_id(), Timestamp::now());
        record.billing_customer_id = Some("cus_1".into());
        store.insert(record).await;

        let provider = MockPaymentProvider::new();
        provider.set_portal_session(PortalSession {
            id: "bps_1".into(),
            url: "https://billing.stripe.com/p/session/bps_1".into(),
        });

        let handler = CreatePortalSessionHandler::new(Arc::new(store), Arc::new(provider.clone()));
        let result = handler.handle(command()).await.unwrap();

        assert_eq!(result.portal_url, "https://billing.stripe.com/p/session/bps_1");
        let call = &provider.calls()[0];
        assert_eq!(call.args, vec!["cus_1", "chrome-extension://extid/options.html"]);
    }

    #[tokio::test]
    async fn user_without_customer_is_not_found() {
        let store = InMemoryEntitlementStore::new();
        store
            .insert(EntitlementRecord::new(test_user_id(), Timestamp::now()))
            .await;
        let provider = MockPaymentProvider::new();

        let handler = CreatePortalSessionHandler::new(Arc::new(store), Arc::new(provider.clone()));
        let err = handler.handle(command()).await.unwrap_err();

        assert_eq!(err, EntitlementError::not_found("No active subscription found"));
        assert!(!provider.was_called("create_portal_session"));
    }
}
