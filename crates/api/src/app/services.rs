use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use bankledger_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use bankledger_infra::{
    BusNotifier, InMemoryContactDirectory, InMemoryLedgerStore, LedgerConfig, LedgerEngine,
    LedgerStore, Notifier, NotifyBus, PostgresLedgerStore,
};

#[cfg(feature = "redis")]
use bankledger_infra::event_bus::RedisPubSubEventBus;

/// Engine as wired by the API: backend and notification sink chosen at startup.
pub type Engine = LedgerEngine<Arc<dyn LedgerStore>, Arc<dyn Notifier>>;

/// Everything a request handler needs.
pub struct AppServices {
    pub engine: Engine,
    pub contacts: Arc<InMemoryContactDirectory>,
}

/// Build the service graph from configuration.
///
/// `USE_PERSISTENT_STORES=true` selects Postgres (and runs the migration);
/// otherwise everything lives in process memory.
pub async fn build_services(config: &LedgerConfig) -> anyhow::Result<AppServices> {
    let store = build_store(config).await?;
    let notifier = build_notifier(config)?;
    let contacts = Arc::new(InMemoryContactDirectory::new());

    let engine = LedgerEngine::new(store, notifier)
        .with_contacts(contacts.clone())
        .with_account_number_attempts(config.account_number_attempts);

    Ok(AppServices { engine, contacts })
}

async fn build_store(config: &LedgerConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    if !config.use_persistent_stores {
        info!("using in-memory ledger store");
        return Ok(Arc::new(InMemoryLedgerStore::with_lock_timeout(
            config.lock_timeout,
        )));
    }

    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required when USE_PERSISTENT_STORES is enabled")?;
    let store = PostgresLedgerStore::connect(url, config.lock_timeout)
        .await
        .context("connecting to postgres")?;
    store.migrate().await.context("running ledger migration")?;
    info!("using postgres ledger store");
    Ok(Arc::new(store))
}

fn build_notifier(config: &LedgerConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match config.notify_bus {
        NotifyBus::Memory => Ok(memory_notifier()),
        NotifyBus::Redis => redis_notifier(config),
    }
}

#[cfg(feature = "redis")]
fn redis_notifier(config: &LedgerConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    let bus = RedisPubSubEventBus::new(&config.redis_url, config.notify_channel.clone())
        .context("opening redis notification bus")?;
    info!(channel = bus.channel(), "publishing notifications to redis");
    Ok(Arc::new(BusNotifier::new(Arc::new(bus))))
}

#[cfg(not(feature = "redis"))]
fn redis_notifier(_config: &LedgerConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    warn!("NOTIFY_BUS=redis but this build lacks the `redis` feature; using the in-memory bus");
    Ok(memory_notifier())
}

/// In-process bus whose only consumer logs each notification.
fn memory_notifier() -> Arc<dyn Notifier> {
    let bus = Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new());
    log_notifications(bus.subscribe());
    Arc::new(BusNotifier::new(bus))
}

fn log_notifications(subscription: Subscription<EventEnvelope<JsonValue>>) {
    let spawned = std::thread::Builder::new()
        .name("ledger-notifications".to_string())
        .spawn(move || {
            while let Ok(envelope) = subscription.recv() {
                info!(
                    event_id = %envelope.event_id(),
                    event_type = envelope.event_type(),
                    payload = %envelope.payload(),
                    "ledger notification"
                );
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "notification logger not started");
    }
}
