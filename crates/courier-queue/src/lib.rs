//! # courier-queue
//!
//! The in-process event queue between connection supervisors (producers) and
//! the event consumer workers.
//!
//! Guarantees:
//!
//! - **Per-partition ordering**: events are partitioned by account id, and a
//!   partition allows one outstanding delivery at a time, so two events for
//!   the same account are never processed out of order or concurrently.
//! - **At-least-once delivery**: a delivery stays at the head of its
//!   partition until acknowledged; an unacknowledged (nacked) delivery is
//!   redelivered.
//! - **Bounded redelivery**: after `max_attempts` failed deliveries the
//!   event moves to the dead-letter sink and the partition continues with
//!   the next event — one poisoned event never stalls an account.
//!
//! Consumers call [`EventBroker::next`] concurrently; distinct partitions
//! are handed out in parallel.

#![deny(unsafe_code)]

use std::collections::{HashMap, VecDeque};

use courier_core::event::InboundEvent;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// One delivery handed to a consumer. Must be settled exactly once via
/// [`EventBroker::ack`] or [`EventBroker::nack`]; the partition stays
/// blocked until then.
#[derive(Debug)]
pub struct Delivery {
    /// Partition key.
    pub account_id: String,
    /// The queued event.
    pub event: InboundEvent,
    /// 1-based delivery attempt.
    pub attempt: u32,
}

/// An event that exhausted its redelivery budget.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The failed event.
    pub event: InboundEvent,
    /// Attempts consumed before giving up.
    pub attempts: u32,
    /// Last failure reason reported by the consumer.
    pub reason: String,
}

#[derive(Default)]
struct Partition {
    queue: VecDeque<QueuedEvent>,
    in_flight: bool,
}

struct QueuedEvent {
    event: InboundEvent,
    attempts: u32,
}

#[derive(Default)]
struct BrokerState {
    partitions: HashMap<String, Partition>,
    dead_letters: Vec<DeadLetter>,
}

/// In-process broker with per-account partitions.
pub struct EventBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
    max_attempts: u32,
}

impl EventBroker {
    /// Create a broker that dead-letters events after `max_attempts`
    /// delivery attempts (minimum 1).
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            notify: Notify::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Publish an event onto its account partition.
    pub fn publish(&self, event: InboundEvent) {
        {
            let mut state = self.state.lock();
            let partition = state.partitions.entry(event.account_id.clone()).or_default();
            partition.queue.push_back(QueuedEvent { event, attempts: 0 });
        }
        counter!("courier_queue_published_total").increment(1);
        self.notify.notify_waiters();
    }

    /// Wait for the next delivery from any partition without an outstanding
    /// delivery. Cancel-safe: dropping the future hands nothing out.
    pub async fn next(&self) -> Delivery {
        loop {
            // Arm the notification before checking, otherwise a publish
            // between the check and the await is lost.
            let notified = self.notify.notified();
            if let Some(delivery) = self.try_next() {
                return delivery;
            }
            notified.await;
        }
    }

    /// Non-blocking variant of [`next`](Self::next).
    pub fn try_next(&self) -> Option<Delivery> {
        let mut state = self.state.lock();
        for (account_id, partition) in &mut state.partitions {
            if partition.in_flight {
                continue;
            }
            if let Some(head) = partition.queue.front_mut() {
                partition.in_flight = true;
                head.attempts += 1;
                return Some(Delivery {
                    account_id: account_id.clone(),
                    event: head.event.clone(),
                    attempt: head.attempts,
                });
            }
        }
        None
    }

    /// Acknowledge a delivery: the event leaves the queue and the partition
    /// unblocks.
    pub fn ack(&self, delivery: Delivery) {
        let mut state = self.state.lock();
        if let Some(partition) = state.partitions.get_mut(&delivery.account_id) {
            let _ = partition.queue.pop_front();
            partition.in_flight = false;
            if partition.queue.is_empty() {
                let _ = state.partitions.remove(&delivery.account_id);
            }
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Reject a delivery. The event is redelivered unless its attempt budget
    /// is exhausted, in which case it moves to the dead-letter sink.
    pub fn nack(&self, delivery: Delivery, reason: &str) {
        let mut state = self.state.lock();
        if let Some(partition) = state.partitions.get_mut(&delivery.account_id) {
            partition.in_flight = false;
            let exhausted = partition
                .queue
                .front()
                .is_some_and(|head| head.attempts >= self.max_attempts);
            if exhausted {
                if let Some(head) = partition.queue.pop_front() {
                    warn!(
                        account_id = %delivery.account_id,
                        external_id = %head.event.external_id,
                        attempts = head.attempts,
                        reason,
                        "event dead-lettered"
                    );
                    counter!("courier_queue_dead_letters_total").increment(1);
                    state.dead_letters.push(DeadLetter {
                        event: head.event,
                        attempts: head.attempts,
                        reason: reason.to_string(),
                    });
                }
            } else {
                debug!(
                    account_id = %delivery.account_id,
                    attempt = delivery.attempt,
                    reason,
                    "delivery nacked, will redeliver"
                );
            }
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Events parked in the dead-letter sink.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().dead_letters.clone()
    }

    /// Queued (not yet acknowledged) events for one account.
    #[must_use]
    pub fn depth(&self, account_id: &str) -> usize {
        self.state
            .lock()
            .partitions
            .get(account_id)
            .map_or(0, |p| p.queue.len())
    }

    /// Queued events across all partitions.
    #[must_use]
    pub fn total_depth(&self) -> usize {
        self.state
            .lock()
            .partitions
            .values()
            .map(|p| p.queue.len())
            .sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
