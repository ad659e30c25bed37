//! Event consumer.
//!
//! Pulls deliveries off the broker, persists them with dedup, applies the
//! kind-specific side effect, and settles the delivery. The broker hands
//! out one delivery per account at a time, so everything here sees a
//! strictly ordered stream per account. A delivery is acked only after its
//! effects landed; failures nack and ride the broker's redelivery budget
//! into the dead-letter sink.

use std::sync::Arc;

use courier_core::account::AccountStatus;
use courier_core::errors::{CourierError, Result};
use courier_core::event::{EventKind, InboundEvent};
use courier_queue::{Delivery, EventBroker};
use courier_store::{AckOutcome, RecordOutcome, Store};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::dispatcher::Dispatcher;

/// Body prefix of connection-state events carrying a login identity.
const LOGIN_PREFIX: &str = "login:";

/// One consumer worker over the shared broker.
pub struct Consumer {
    store: Arc<Store>,
    broker: Arc<EventBroker>,
    dispatcher: Arc<Dispatcher>,
}

impl Consumer {
    /// Build a consumer over the shared store, broker, and dispatcher.
    #[must_use]
    pub fn new(store: Arc<Store>, broker: Arc<EventBroker>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            broker,
            dispatcher,
        }
    }

    /// Consume deliveries until cancelled. Multiple workers may run this
    /// concurrently; the broker keeps each account on a single worker at a
    /// time.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            let delivery = tokio::select! {
                () = cancel.cancelled() => break,
                delivery = self.broker.next() => delivery,
            };
            match self.process(&delivery).await {
                Ok(()) => self.broker.ack(delivery),
                Err(err) => {
                    warn!(
                        account_id = %delivery.account_id,
                        external_id = %delivery.event.external_id,
                        attempt = delivery.attempt,
                        error = %err,
                        "event processing failed"
                    );
                    counter!("courier_consumer_failures_total").increment(1);
                    let reason = err.to_string();
                    self.broker.nack(delivery, &reason);
                }
            }
        }
        debug!("consumer stopped");
    }

    /// Process one delivery: persist with dedup, then apply side effects.
    ///
    /// A duplicate on the first delivery attempt is upstream redelivery and
    /// is skipped whole. A duplicate on a later attempt means our own
    /// previous attempt persisted the event and failed afterwards, so the
    /// side effects still need to run.
    #[instrument(skip(self, delivery), fields(
        account_id = %delivery.event.account_id,
        external_id = %delivery.event.external_id,
        attempt = delivery.attempt,
    ))]
    pub async fn process(&self, delivery: &Delivery) -> Result<()> {
        let event = &delivery.event;

        let outcome = self.store.record_inbound(event)?;
        if matches!(outcome, RecordOutcome::Duplicate) && delivery.attempt == 1 {
            debug!(
                account_id = %event.account_id,
                external_id = %event.external_id,
                "duplicate event skipped"
            );
            counter!("courier_consumer_duplicates_total").increment(1);
            return Ok(());
        }

        let _ = self.store.touch_account_seen(&event.account_id)?;

        match event.kind {
            EventKind::Message => self.handle_message(event).await,
            EventKind::Ack => self.handle_ack(event),
            EventKind::ConnectionState => self.handle_connection_state(event),
            EventKind::Presence => Ok(()),
        }
    }

    async fn handle_message(&self, event: &InboundEvent) -> Result<()> {
        let outcome = self.dispatcher.dispatch(event).await?;
        debug!(event_id = %event.id, ?outcome, "message dispatched");
        counter!("courier_consumer_messages_total").increment(1);
        Ok(())
    }

    fn handle_ack(&self, event: &InboundEvent) -> Result<()> {
        let Some((external_id, status)) = event.ack_target() else {
            // Unknown ack codes and malformed keys carry nothing to apply.
            debug!(external_id = %event.external_id, "unmappable ack ignored");
            return Ok(());
        };
        match self.store.apply_ack(&event.account_id, external_id, status)? {
            AckOutcome::Applied => {
                debug!(external_id, %status, "delivery status advanced");
            }
            AckOutcome::NoMatch => {
                // Sends that predate tracking or originate elsewhere.
                debug!(external_id, "ack without matching send ignored");
            }
            AckOutcome::Stale => {
                debug!(external_id, %status, "stale ack dropped");
            }
        }
        Ok(())
    }

    fn handle_connection_state(&self, event: &InboundEvent) -> Result<()> {
        if let Some(identity) = event.body.strip_prefix(LOGIN_PREFIX) {
            info!(account_id = %event.account_id, identity, "account logged in");
            let _ = self.store.record_account_login(&event.account_id, identity)?;
            return Ok(());
        }
        let status = match event.body.as_str() {
            "connected" => AccountStatus::Connected,
            "disconnected" => AccountStatus::Disconnected,
            other => {
                return Err(CourierError::Persistence(format!(
                    "unknown connection state {other:?}"
                )));
            }
        };
        let _ = self.store.update_account_status(&event.account_id, status)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
