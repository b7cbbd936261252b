//! HandleBillingWebhookHandler - Command handler for payment provider webhooks.
//!
//! The signature is verified before anything else. Once verified, failures
//! are logged and absorbed so the provider does not redeliver in a loop;
//! store failures are the exception and propagate so the event is retried.

use std::sync::Arc;
use std::time::Duration;

use super::provider_call::{bounded, DEFAULT_PROVIDER_TIMEOUT};
use super::{ReconcileEntitlementCommand, ReconcileEntitlementHandler};
use crate::domain::entitlement::{BillingSignal, EntitlementError, Plan};
use crate::domain::foundation::UserId;
use crate::ports::{
    CheckoutSessionDetails, EntitlementStore, PaymentProvider, Subscription, WebhookEvent,
    WebhookEventData, WebhookEventKind,
};

/// Command to handle a payment webhook.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    /// Raw webhook payload.
    pub payload: Vec<u8>,
    /// Webhook signature header.
    pub signature: String,
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleBillingWebhookResult {
    /// A user's entitlement was reconciled.
    EntitlementReconciled {
        user_id: String,
        plan: Plan,
        license_issued: bool,
    },
    /// Event understood, nothing to change.
    Acknowledged,
    /// Event could not be matched to a user or subscription.
    Skipped { reason: String },
    /// Handling failed after verification; logged and acknowledged.
    Absorbed { reason: String },
    /// Event type the service does not react to.
    Ignored,
}

/// Handler for processing payment provider webhooks.
pub struct HandleBillingWebhookHandler {
    store: Arc<dyn EntitlementStore>,
    payment_provider: Arc<dyn PaymentProvider>,
    reconciler: ReconcileEntitlementHandler,
    timeout: Duration,
}

impl HandleBillingWebhookHandler {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        payment_provider: Arc<dyn PaymentProvider>,
        reconciler: ReconcileEntitlementHandler,
    ) -> Self {
        Self {
            store,
            payment_provider,
            reconciler,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn handle(
        &self,
        cmd: HandleBillingWebhookCommand,
    ) -> Result<HandleBillingWebhookResult, EntitlementError> {
        // 1. Verify webhook signature and parse event
        let event = match self
            .payment_provider
            .verify_webhook(&cmd.payload, &cmd.signature)
            .await
        {
            Ok(event) => event,
            // Authentic but undecodable: a retry would fail the same way
            Err(err) if err.is_verified_but_malformed() => {
                tracing::error!(error = %err, "Verified webhook could not be decoded, acknowledging");
                return Ok(HandleBillingWebhookResult::Absorbed {
                    reason: err.message,
                });
            }
            Err(err) => return Err(EntitlementError::invalid_signature(err.message)),
        };

        tracing::info!(event_id = %event.id, event_type = ?event.kind, "Processing webhook event");

        // 2. Dispatch; only store failures escape
        match self.dispatch(&event).await {
            Ok(result) => Ok(result),
            Err(err) if err.should_provider_retry() => {
                tracing::error!(event_id = %event.id, error = %err, "Webhook handling failed, provider will retry");
                Err(err)
            }
            Err(err) => {
                tracing::error!(event_id = %event.id, error = %err, "Webhook handling failed, acknowledging");
                Ok(HandleBillingWebhookResult::Absorbed {
                    reason: err.message(),
                })
            }
        }
    }

    async fn dispatch(
        &self,
        event: &WebhookEvent,
    ) -> Result<HandleBillingWebhookResult, EntitlementError> {
        match (&event.kind, &event.data) {
            (WebhookEventKind::CheckoutCompleted, WebhookEventData::Checkout(session)) => {
                self.handle_checkout_completed(session).await
            }
            (WebhookEventKind::SubscriptionUpdated, WebhookEventData::Subscription(sub)) => {
                self.handle_subscription_change(sub, &sub.status).await
            }
            (WebhookEventKind::SubscriptionDeleted, WebhookEventData::Subscription(sub)) => {
                self.handle_subscription_change(sub, "canceled").await
            }
            (
                WebhookEventKind::InvoicePaid,
                WebhookEventData::Invoice {
                    customer_id,
                    subscription_id,
                    ..
                },
            ) => {
                self.handle_invoice_paid(customer_id.as_deref(), subscription_id.as_deref())
                    .await
            }
            (WebhookEventKind::InvoiceFailed, _) => {
                // The provider follows up with a subscription update
                tracing::warn!(event_id = %event.id, "Invoice payment failed");
                Ok(HandleBillingWebhookResult::Acknowledged)
            }
            (WebhookEventKind::Other(event_type), _) => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event type");
                Ok(HandleBillingWebhookResult::Ignored)
            }
            (kind, _) => Err(EntitlementError::validation(
                "data",
                format!("Unexpected webhook data for {:?}", kind),
            )),
        }
    }

    async fn handle_checkout_completed(
        &self,
        session: &CheckoutSessionDetails,
    ) -> Result<HandleBillingWebhookResult, EntitlementError> {
        if !session.is_subscription() {
            return Ok(skipped("Checkout session is not a subscription"));
        }

        let user_id = match session.user_id() {
            Some(id) => UserId::new(id)?,
            None => return Ok(skipped("Checkout session carries no user id")),
        };

        let subscription_id = match &session.subscription_id {
            Some(id) => id.clone(),
            None => return Ok(skipped("Checkout session has no subscription")),
        };

        let subscription = bounded(
            self.timeout,
            "get_subscription",
            self.payment_provider.get_subscription(&subscription_id),
        )
        .await?
        .ok_or_else(|| EntitlementError::not_found("Subscription not found"))?;

        let customer_id = session
            .customer_id
            .clone()
            .unwrap_or_else(|| subscription.customer_id.clone());

        let signal = BillingSignal::new(subscription.status.clone())
            .with_customer(customer_id)
            .with_subscription(subscription.id.clone())
            .with_promotion_code(session.promotion_code.clone());

        self.reconcile(user_id, signal).await
    }

    async fn handle_subscription_change(
        &self,
        subscription: &Subscription,
        status: &str,
    ) -> Result<HandleBillingWebhookResult, EntitlementError> {
        let record = match self.store.find_by_customer(&subscription.customer_id).await? {
            Some(record) => record,
            None => {
                tracing::warn!(customer_id = %subscription.customer_id, "No user for billing customer");
                return Ok(skipped("Unknown billing customer"));
            }
        };

        let signal = BillingSignal::new(status)
            .with_customer(subscription.customer_id.clone())
            .with_subscription(subscription.id.clone());

        self.reconcile(record.user_id, signal).await
    }

    async fn handle_invoice_paid(
        &self,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> Result<HandleBillingWebhookResult, EntitlementError> {
        let (customer_id, subscription_id) = match (customer_id, subscription_id) {
            (Some(c), Some(s)) => (c, s),
            _ => return Ok(skipped("Invoice is not for a subscription")),
        };

        let record = match self.store.find_by_customer(customer_id).await? {
            Some(record) => record,
            None => {
                tracing::warn!(customer_id = %customer_id, "No user for billing customer");
                return Ok(skipped("Unknown billing customer"));
            }
        };

        let signal = BillingSignal::new("active")
            .with_customer(customer_id)
            .with_subscription(subscription_id);

        self.reconcile(record.user_id, signal).await
    }

    async fn reconcile(
        &self,
        user_id: UserId,
        signal: BillingSignal,
    ) -> Result<HandleBillingWebhookResult, EntitlementError> {
        let result = self
            .reconciler
            .handle(ReconcileEntitlementCommand {
                user_id: user_id.clone(),
                signal,
            })
            .await?;

        Ok(HandleBillingWebhookResult::EntitlementReconciled {
            user_id: user_id.to_string(),
            plan: result.record.plan,
            license_issued: result.license_issued,
        })
    }
}

fn skipped(reason: &str) -> HandleBillingWebhookResult {
    tracing::info!(reason, "Webhook event skipped");
    HandleBillingWebhookResult::Skipped {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryEntitlementStore;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::entitlement::{
        EntitlementPatch, EntitlementRecord, EntitlementStatus, LicenseKey, RandomLicenseKeyGenerator,
    };
    use crate::domain::foundation::{DomainError, Timestamp};
    use crate::ports::{PaymentError, WebhookEvent};
    use async_trait::async_trait;

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn test_user_id() -> UserId {
        UserId::new("test-user-123").unwrap()
    }

    fn command() -> HandleBillingWebhookCommand {
        HandleBillingWebhookCommand {
            payload: b"{}".to_vec(),
            signature: "t=1,v1=00".into(),
        }
    }

    fn setup_with_store(
        store: Arc<dyn EntitlementStore>,
        provider: MockPaymentProvider,
    ) -> HandleBillingWebhookHandler {
        let reconciler =
            ReconcileEntitlementHandler::new(store.clone(), Arc::new(RandomLicenseKeyGenerator));
        HandleBillingWebhookHandler::new(store, Arc::new(provider), reconciler)
            .with_timeout(Duration::from_millis(50))
    }

    fn setup(provider: MockPaymentProvider) -> (HandleBillingWebhookHandler, InMemoryEntitlementStore) {
        let store = InMemoryEntitlementStore::new();
        (setup_with_store(Arc::new(store.clone()), provider), store)
    }

    fn deliver(provider: &MockPaymentProvider, event: WebhookEvent) {
        provider.set_webhook_event(event);
    }

    async fn seed_pro(store: &InMemoryEntitlementStore) -> EntitlementRecord {
        let mut record = EntitlementRecord::new(test_user_id(), Timestamp::now());
        record.plan = Plan::Pro;
        record.status = EntitlementStatus::Active;
        record.billing_customer_id = Some("cus_1".into());
        record.billing_subscription_id = Some("sub_1".into());
        record.license_key = Some(LicenseKey::new("dd_1700000000000_abcdef123456").unwrap());
        store.insert(record.clone()).await;
        record
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Signature Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn invalid_signature_fails_without_mutation() {
        let (handler, store) = setup(MockPaymentProvider::rejecting_webhooks());

        let err = handler.handle(command()).await.unwrap_err();

        assert!(matches!(err, EntitlementError::InvalidSignature(_)));
        assert_eq!(store.count().await, 0);
    }

    fn signed(secret: &str, payload: serde_json::Value) -> HandleBillingWebhookCommand {
        let payload = payload.to_string().into_bytes();
        let signature = MockPaymentProvider::sign(secret, chrono::Utc::now().timestamp(), &payload);
        HandleBillingWebhookCommand { payload, signature }
    }

    #[tokio::test]
    async fn signed_event_with_undecodable_object_is_absorbed() {
        let (handler, store) = setup(MockPaymentProvider::with_signing_secret("whsec_1"));
        seed_pro(&store).await;

        let cmd = signed(
            "whsec_1",
            serde_json::json!({
                "id": "evt_bad",
                "type": "customer.subscription.updated",
                "created": 1704067200,
                "data": {"object": {"id": "sub_1", "customer": 42, "status": "canceled"}}
            }),
        );
        let result = handler.handle(cmd).await.unwrap();

        assert!(matches!(result, HandleBillingWebhookResult::Absorbed { .. }));
        let record = store.find_by_user(&test_user_id()).await.unwrap().unwrap();
        assert_eq!(record.plan, Plan::Pro);
    }

    #[tokio::test]
    async fn signed_event_with_expanded_customer_reconciles() {
        let (handler, store) = setup(MockPaymentProvider::with_signing_secret("whsec_1"));
        seed_pro(&store).await;

        let cmd = signed(
            "whsec_1",
            serde_json::json!({
                "id": "evt_expanded",
                "type": "customer.subscription.deleted",
                "created": 1704067200,
                "data": {"object": {"id": "sub_1", "customer": {"id": "cus_1"}, "status": "canceled"}}
            }),
        );
        let result = handler.handle(cmd).await.unwrap();

        assert!(matches!(
            result,
            HandleBillingWebhookResult::EntitlementReconciled { plan: Plan::Basic, .. }
        ));
    }

    #[tokio::test]
    async fn tampered_signature_is_still_rejected() {
        let (handler, store) = setup(MockPaymentProvider::with_signing_secret("whsec_1"));

        let cmd = signed(
            "whsec_other",
            serde_json::json!({
                "id": "evt_bad",
                "type": "customer.subscription.updated",
                "created": 1704067200,
                "data": {"object": {"id": "sub_1", "customer": 42}}
            }),
        );
        let err = handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, EntitlementError::InvalidSignature(_)));
        assert_eq!(store.count().await, 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Checkout Completed
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn checkout_completed_activates_user() {
        let provider = MockPaymentProvider::with_active_subscription("cus_1", "sub_1");
        deliver(
            &provider,
            MockPaymentProvider::checkout_completed_event("cus_1", "sub_1", "test-user-123"),
        );
        let (handler, store) = setup(provider);

        let result = handler.handle(command()).await.unwrap();

        assert_eq!(
            result,
            HandleBillingWebhookResult::EntitlementReconciled {
                user_id: "test-user-123".into(),
                plan: Plan::Pro,
                license_issued: true,
            }
        );
        let stored = store.find_by_user(&test_user_id()).await.unwrap().unwrap();
        assert!(stored.is_entitled());
        assert_eq!(stored.billing_subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn duplicate_checkout_delivery_is_idempotent() {
        let provider = MockPaymentProvider::with_active_subscription("cus_1", "sub_1");
        deliver(
            &provider,
            MockPaymentProvider::checkout_completed_event("cus_1", "sub_1", "test-user-123"),
        );
        let (handler, store) = setup(provider);

        handler.handle(command()).await.unwrap();
        let first = store.find_by_user(&test_user_id()).await.unwrap().unwrap();
        let second_result = handler.handle(command()).await.unwrap();
        let second = store.find_by_user(&test_user_id()).await.unwrap().unwrap();

        assert!(first.same_state_as(&second));
        assert!(matches!(
            second_result,
            HandleBillingWebhookResult::EntitlementReconciled { license_issued: false, .. }
        ));
    }

    #[tokio::test]
    async fn checkout_without_user_id_is_skipped() {
        let provider = MockPaymentProvider::with_active_subscription("cus_1", "sub_1");
        let mut event = MockPaymentProvider::checkout_completed_event("cus_1", "sub_1", "x");
        if let WebhookEventData::Checkout(ref mut session) = event.data {
            session.client_reference_id = None;
            session.metadata_user_id = None;
        }
        deliver(&provider, event);
        let (handler, store) = setup(provider);

        let result = handler.handle(command()).await.unwrap();

        assert!(matches!(result, HandleBillingWebhookResult::Skipped { .. }));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn provider_failure_during_checkout_is_absorbed() {
        let provider = MockPaymentProvider::new();
        provider.set_method_error("get_subscription", PaymentError::network("down"));
        deliver(
            &provider,
            MockPaymentProvider::checkout_completed_event("cus_1", "sub_1", "test-user-123"),
        );
        let (handler, store) = setup(provider);

        let result = handler.handle(command()).await.unwrap();

        assert!(matches!(result, HandleBillingWebhookResult::Absorbed { .. }));
        assert_eq!(store.count().await, 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscription Events
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn subscription_deleted_revokes_and_keeps_key() {
        let provider = MockPaymentProvider::new();
        deliver(
            &provider,
            MockPaymentProvider::subscription_event(
                WebhookEventKind::SubscriptionDeleted,
                "cus_1",
                "sub_1",
                "active",
            ),
        );
        let (handler, store) = setup(provider);
        let before = seed_pro(&store).await;

        handler.handle(command()).await.unwrap();

        let after = store.find_by_user(&test_user_id()).await.unwrap().unwrap();
        assert_eq!(after.plan, Plan::Basic);
        assert_eq!(after.status, EntitlementStatus::Cancelled);
        assert_eq!(after.billing_subscription_id, None);
        assert_eq!(after.license_key, before.license_key);
    }

    #[tokio::test]
    async fn subscription_updated_passes_unknown_status_through() {
        let provider = MockPaymentProvider::new();
        deliver(
            &provider,
            MockPaymentProvider::subscription_event(
                WebhookEventKind::SubscriptionUpdated,
                "cus_1",
                "sub_1",
                "paused",
            ),
        );
        let (handler, store) = setup(provider);
        seed_pro(&store).await;

        handler.handle(command()).await.unwrap();

        let after = store.find_by_user(&test_user_id()).await.unwrap().unwrap();
        assert_eq!(after.plan, Plan::Basic);
        assert_eq!(after.status.as_str(), "paused");
    }

    #[tokio::test]
    async fn subscription_event_for_unknown_customer_is_skipped() {
        let provider = MockPaymentProvider::new();
        deliver(
            &provider,
            MockPaymentProvider::subscription_event(
                WebhookEventKind::SubscriptionUpdated,
                "cus_unknown",
                "sub_9",
                "active",
            ),
        );
        let (handler, store) = setup(provider);

        let result = handler.handle(command()).await.unwrap();
        assert!(matches!(result, HandleBillingWebhookResult::Skipped { .. }));
        assert_eq!(store.count().await, 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Invoice Events
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn invoice_paid_restores_pro_with_original_key() {
        let provider = MockPaymentProvider::new();
        let (handler, store) = setup(provider.clone());
        let seeded = seed_pro(&store).await;
        store
            .merge(
                &test_user_id(),
                EntitlementPatch::new().with_plan(Plan::Basic, EntitlementStatus::Cancelled),
                Timestamp::now(),
            )
            .await
            .unwrap();

        let mut event = MockPaymentProvider::payment_failed_event("cus_1", "sub_2");
        event.kind = WebhookEventKind::InvoicePaid;
        deliver(&provider, event);

        handler.handle(command()).await.unwrap();

        let after = store.find_by_user(&test_user_id()).await.unwrap().unwrap();
        assert!(after.is_entitled());
        assert_eq!(after.billing_subscription_id.as_deref(), Some("sub_2"));
        assert_eq!(after.license_key, seeded.license_key);
    }

    #[tokio::test]
    async fn invoice_failed_changes_nothing() {
        let provider = MockPaymentProvider::new();
        deliver(&provider, MockPaymentProvider::payment_failed_event("cus_1", "sub_1"));
        let (handler, store) = setup(provider);
        let before = seed_pro(&store).await;

        let result = handler.handle(command()).await.unwrap();

        assert_eq!(result, HandleBillingWebhookResult::Acknowledged);
        let after = store.find_by_user(&test_user_id()).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored() {
        let provider = MockPaymentProvider::new();
        deliver(
            &provider,
            WebhookEvent {
                id: "evt_1".into(),
                kind: WebhookEventKind::Other("customer.created".into()),
                data: WebhookEventData::Raw { json: "{}".into() },
                created_at: 0,
            },
        );
        let (handler, _) = setup(provider);

        assert_eq!(handler.handle(command()).await.unwrap(), HandleBillingWebhookResult::Ignored);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Store Failures
    // ════════════════════════════════════════════════════════════════════════════

    struct BrokenStore;

    #[async_trait]
    impl EntitlementStore for BrokenStore {
        async fn find_by_user(&self, _: &UserId) -> Result<Option<EntitlementRecord>, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn find_by_customer(&self, _: &str) -> Result<Option<EntitlementRecord>, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn merge(
            &self,
            _: &UserId,
            _: EntitlementPatch,
            _: Timestamp,
        ) -> Result<EntitlementRecord, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn issue_license_key_if_absent(
            &self,
            _: &UserId,
            _: LicenseKey,
            _: Timestamp,
        ) -> Result<EntitlementRecord, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn delete(&self, _: &UserId) -> Result<bool, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn list(&self) -> Result<Vec<EntitlementRecord>, DomainError> {
            Err(DomainError::database("connection refused"))
        }
    }

    #[tokio::test]
    async fn store_failure_propagates_for_redelivery() {
        let provider = MockPaymentProvider::new();
        deliver(
            &provider,
            MockPaymentProvider::subscription_event(
                WebhookEventKind::SubscriptionUpdated,
                "cus_1",
                "sub_1",
                "active",
            ),
        );
        let handler = setup_with_store(Arc::new(BrokenStore), provider);

        let err = handler.handle(command()).await.unwrap_err();
        assert!(matches!(err, EntitlementError::Storage(_)));
    }
}
