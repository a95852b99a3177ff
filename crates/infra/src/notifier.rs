//! Post-commit notification emitter.
//!
//! The engine hands every committed mutation's notifications to a
//! [`Notifier`]. Notifying is infallible from the engine's point of view:
//! whatever goes wrong in delivery is logged here and dropped.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::warn;

use bankledger_events::{EventBus, EventEnvelope};
use bankledger_ledger::LedgerNotification;

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: LedgerNotification);
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn notify(&self, notification: LedgerNotification) {
        (**self).notify(notification)
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: LedgerNotification) {}
}

/// Publishes notifications as JSON envelopes on an [`EventBus`].
///
/// Inside a tokio runtime the publish runs on the blocking pool so a slow
/// broker never holds up the request that triggered it.
pub struct BusNotifier<B> {
    bus: Arc<B>,
}

impl<B> BusNotifier<B>
where
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    fn publish(bus: &B, envelope: EventEnvelope<JsonValue>) {
        let event_type = envelope.event_type().to_string();
        let event_id = envelope.event_id();
        if let Err(e) = bus.publish(envelope) {
            warn!(%event_id, %event_type, error = ?e, "notification dropped: publish failed");
        }
    }
}

impl<B> Notifier for BusNotifier<B>
where
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    fn notify(&self, notification: LedgerNotification) {
        let envelope = match EventEnvelope::wrap(notification).to_json() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "notification dropped: encoding failed");
                return;
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let bus = self.bus.clone();
                let _ = handle.spawn_blocking(move || Self::publish(&bus, envelope));
            }
            Err(_) => Self::publish(&self.bus, envelope),
        }
    }
}
