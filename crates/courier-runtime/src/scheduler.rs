//! Schedule worker.
//!
//! Polls for due scheduled sends on a fixed interval. Each due item is
//! claimed through a conditional `pending → in_flight` transition before any
//! send attempt, so two worker instances over the same database never fire
//! the same item twice. Success and failure are both terminal for one-shot
//! items; recurring items return to `pending` at their next cron occurrence,
//! skipping any occurrences missed while the worker was down.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_core::errors::{CourierError, Result};
use courier_core::schedule::ScheduledSend;
use courier_core::send::SendOrigin;
use courier_gateway::GatewayClient;
use courier_store::Store;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cron::CronSchedule;

/// What one poll tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Items claimed this tick.
    pub claimed: usize,
    /// Items fired successfully.
    pub sent: usize,
    /// Items terminally failed.
    pub failed: usize,
    /// Recurring items returned to pending.
    pub rescheduled: usize,
}

/// Fixed-interval worker firing due scheduled sends.
pub struct ScheduleWorker {
    store: Arc<Store>,
    client: Arc<GatewayClient>,
    poll_interval: Duration,
}

impl ScheduleWorker {
    /// Build a worker over the shared store and gateway client.
    #[must_use]
    pub fn new(store: Arc<Store>, client: Arc<GatewayClient>, poll_interval: Duration) -> Self {
        Self {
            store,
            client,
            poll_interval,
        }
    }

    /// Poll until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(err) = self.tick(Utc::now()).await {
                warn!(error = %err, "schedule tick failed");
            }
        }
        debug!("schedule worker stopped");
    }

    /// Claim and fire everything due at `now`.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickStats> {
        let claimed = self.store.claim_due_schedules(now)?;
        let mut stats = TickStats {
            claimed: claimed.len(),
            ..TickStats::default()
        };
        for item in claimed {
            self.fire(&item, now, &mut stats).await;
        }
        if stats.claimed > 0 {
            info!(
                claimed = stats.claimed,
                sent = stats.sent,
                failed = stats.failed,
                rescheduled = stats.rescheduled,
                "schedule tick"
            );
        }
        Ok(stats)
    }

    /// Fire one claimed item. Errors land on the item itself, never back on
    /// the tick — one failing schedule cannot block its siblings.
    async fn fire(&self, item: &ScheduledSend, now: DateTime<Utc>, stats: &mut TickStats) {
        let send = match self.store.enqueue_send(
            &item.account_id,
            &item.recipient,
            &item.body,
            SendOrigin::Schedule,
        ) {
            Ok(send) => send,
            Err(err) => {
                let err = CourierError::schedule_fire(&item.id, err.to_string());
                warn!(error = %err, "could not record scheduled send");
                self.finish_failed(item, &err.to_string(), stats);
                return;
            }
        };

        match self
            .client
            .send_message(&item.account_id, &item.recipient, &item.body)
            .await
        {
            Ok(external_id) => {
                if let Err(err) = self.store.mark_send_sent(&send.id, &external_id) {
                    warn!(send_id = %send.id, error = %err, "sent but status write failed");
                }
                counter!("courier_schedule_fired_total").increment(1);
                self.finish_sent(item, now, stats);
            }
            Err(err) => {
                if let Err(mark_err) = self.store.mark_send_failed(&send.id, &err.to_string()) {
                    warn!(send_id = %send.id, error = %mark_err, "failure status write failed");
                }
                let err = CourierError::schedule_fire(&item.id, err.to_string());
                warn!(error = %err, "scheduled send rejected");
                self.finish_failed(item, &err.to_string(), stats);
            }
        }
    }

    fn finish_sent(&self, item: &ScheduledSend, now: DateTime<Utc>, stats: &mut TickStats) {
        if item.is_recurring() {
            if let Some(next) = self.next_occurrence(item, now) {
                match self.store.reschedule(&item.id, next) {
                    Ok(true) => {
                        debug!(schedule_id = %item.id, %next, "recurring item rescheduled");
                        stats.rescheduled += 1;
                        return;
                    }
                    Ok(false) => warn!(schedule_id = %item.id, "reschedule found no in-flight item"),
                    Err(err) => warn!(schedule_id = %item.id, error = %err, "reschedule failed"),
                }
            }
        }
        match self.store.complete_schedule_sent(&item.id) {
            Ok(_) => stats.sent += 1,
            Err(err) => warn!(schedule_id = %item.id, error = %err, "completion write failed"),
        }
    }

    fn finish_failed(&self, item: &ScheduledSend, error: &str, stats: &mut TickStats) {
        match self.store.complete_schedule_failed(&item.id, error) {
            Ok(_) => {
                counter!("courier_schedule_failed_total").increment(1);
                stats.failed += 1;
            }
            Err(err) => warn!(schedule_id = %item.id, error = %err, "failure write failed"),
        }
    }

    /// Next cron occurrence strictly after `now` — occurrences missed while
    /// the worker was down are skipped, not replayed.
    fn next_occurrence(&self, item: &ScheduledSend, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let expr = item.cron_expr.as_deref()?;
        match CronSchedule::parse(expr) {
            Ok(schedule) => {
                let next = schedule.next_after(now);
                if next.is_none() {
                    warn!(schedule_id = %item.id, expr, "cron expression has no future occurrence");
                }
                next
            }
            Err(err) => {
                warn!(schedule_id = %item.id, expr, error = %err, "unparseable cron expression");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
