//! Decision Drift billing server entry point.
//!
//! Loads configuration from the environment, wires the entitlement store and
//! Stripe adapter into the HTTP router, then serves until shutdown.

use std::sync::Arc;

use decision_drift::adapters::http::{app_router, EntitlementAppState};
use decision_drift::adapters::{
    InMemoryEntitlementStore, PostgresEntitlementStore, StripeConfig, StripePaymentAdapter,
};
use decision_drift::config::AppConfig;
use decision_drift::domain::entitlement::RandomLicenseKeyGenerator;
use decision_drift::ports::EntitlementStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let store: Arc<dyn EntitlementStore> = match &config.database {
        Some(database) => {
            let pool = database.pool_options().connect(&database.url).await.map_err(|e| {
                tracing::error!("Database connection failed: {e}");
                e
            })?;
            if database.run_migrations {
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Database migrations applied");
            }
            Arc::new(PostgresEntitlementStore::new(pool))
        }
        None => {
            tracing::warn!("No database configured; entitlements are kept in memory only");
            Arc::new(InMemoryEntitlementStore::new())
        }
    };

    if config.payment.is_test_mode() {
        tracing::info!("Stripe running in test mode");
    }
    let payment_provider = Arc::new(StripePaymentAdapter::new(StripeConfig::from(
        &config.payment,
    )));

    let state = EntitlementAppState::new(store, payment_provider, Arc::new(RandomLicenseKeyGenerator))
        .with_provider_timeout(config.payment.provider_timeout())
        .with_redacted_errors(config.is_production());

    let app = app_router(state, &config.server);

    let addr = config.server.socket_addr()?;
    tracing::info!(environment = ?config.server.environment, "Decision Drift listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
