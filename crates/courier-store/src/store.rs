//! High-level pooled [`Store`] API.
//!
//! Composes the repositories into the operations the workers need. Write
//! sequences touching one account are serialized by an in-process per-account
//! mutex; cross-account writes (schedule claiming) use a global lock. SQLite
//! uniqueness and conditional UPDATEs remain the backstop at the database
//! level, so the locks reduce contention rather than carry correctness.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_core::account::{AccountStatus, ManagedAccount};
use courier_core::agent::AgentConfig;
use courier_core::event::InboundEvent;
use courier_core::rule::IgnoreRule;
use courier_core::schedule::ScheduledSend;
use courier_core::send::{OutboundSend, SendStatus};
use rusqlite::Connection;
use tracing::{debug, instrument, warn};

use crate::connection::{ConnectionPool, PooledConnection, open_in_memory_pool, open_pool};
use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::repositories::accounts::{AccountRepo, CreateAccountOptions};
use crate::repositories::agents::{AgentRepo, CreateAgentOptions};
use crate::repositories::events::EventRepo;
use crate::repositories::ignore_rules::{CreateIgnoreRuleOptions, IgnoreRuleRepo};
use crate::repositories::schedules::{CreateScheduleOptions, ScheduleRepo};
use crate::repositories::sends::{CreateSendOptions, SendRepo};

/// Result of recording an inbound event.
#[derive(Debug)]
pub enum RecordOutcome {
    /// The event was persisted.
    Inserted,
    /// The dedup key already existed; nothing was written.
    Duplicate,
}

/// Result of applying a delivery ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The matching send advanced to the new status.
    Applied,
    /// No send matches the external id. Silent no-op by design: the send
    /// may predate tracking or originate outside this system.
    NoMatch,
    /// A send matched but the transition was regressive or the send is
    /// terminal; the ack is dropped.
    Stale,
}

/// High-level store wrapping a connection pool and all repositories.
pub struct Store {
    pool: ConnectionPool,
    global_write_lock: Mutex<()>,
    account_write_locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl Store {
    const SQLITE_BUSY_MAX_RETRIES: u32 = 32;

    /// Open (and migrate) a store at the given database path.
    pub fn open(path: &Path) -> Result<Self> {
        let store = Self::from_pool(open_pool(path)?)?;
        Ok(store)
    }

    /// Open an in-memory store (tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_pool(open_in_memory_pool()?)
    }

    fn from_pool(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            run_migrations(&conn)?;
        }
        Ok(Self {
            pool,
            global_write_lock: Mutex::new(()),
            account_write_locks: Mutex::new(HashMap::new()),
        })
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    fn lock_global_write(&self) -> Result<MutexGuard<'_, ()>> {
        self.global_write_lock
            .lock()
            .map_err(|_| StoreError::Internal("global write lock poisoned".into()))
    }

    fn acquire_account_write_lock(&self, account_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .account_write_locks
            .lock()
            .map_err(|_| StoreError::Internal("account lock map poisoned".into()))?;

        // Opportunistically prune dead weak refs when the map grows.
        if locks.len() > 128 {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(account_id).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        let lock = Arc::new(Mutex::new(()));
        let _ = locks.insert(account_id.to_string(), Arc::downgrade(&lock));
        Ok(lock)
    }

    fn with_account_write_lock<T>(
        &self,
        account_id: &str,
        f: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let account_lock = self.acquire_account_write_lock(account_id)?;
        let _guard = account_lock
            .lock()
            .map_err(|_| StoreError::Internal("account write lock poisoned".into()))?;
        self.retry_on_sqlite_busy(f)
    }

    fn with_global_write_lock<T>(&self, f: impl FnMut() -> Result<T>) -> Result<T> {
        let _guard = self.lock_global_write()?;
        self.retry_on_sqlite_busy(f)
    }

    /// Retry an operation on `SQLite` BUSY/LOCKED with linear backoff + jitter.
    ///
    /// Backoff: base = min(attempts * 10, 500) ms, jitter ±25% to prevent
    /// thundering herd when multiple writers contend on the same database.
    #[allow(clippy::unused_self)]
    fn retry_on_sqlite_busy<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0;

        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err)
                    if Self::is_sqlite_busy_or_locked(&err)
                        && attempts < Self::SQLITE_BUSY_MAX_RETRIES =>
                {
                    attempts += 1;
                    let base_ms = u64::from(attempts).saturating_mul(10).min(500);
                    let jitter_range = base_ms / 4;
                    let jitter = if jitter_range > 0 {
                        rand::random::<u64>() % (jitter_range * 2 + 1)
                    } else {
                        0
                    };
                    let backoff_ms = base_ms.saturating_sub(jitter_range) + jitter;
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_sqlite_busy_or_locked(err: &StoreError) -> bool {
        match err {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => {
                matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
            }
            _ => false,
        }
    }

    fn is_unique_violation(err: &StoreError) -> bool {
        matches!(
            err,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _))
                if code.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────

    /// Register a new account.
    pub fn create_account(&self, label: &str) -> Result<ManagedAccount> {
        let conn = self.conn()?;
        self.with_global_write_lock(|| AccountRepo::create(&conn, &CreateAccountOptions { label }))
    }

    /// Get one account.
    pub fn get_account(&self, account_id: &str) -> Result<Option<ManagedAccount>> {
        AccountRepo::get_by_id(&*self.conn()?, account_id)
    }

    /// Accounts that should hold a live connection.
    pub fn list_active_accounts(&self) -> Result<Vec<ManagedAccount>> {
        AccountRepo::list_active(&*self.conn()?)
    }

    /// Write an account's connectivity status.
    #[instrument(skip(self))]
    pub fn update_account_status(&self, account_id: &str, status: AccountStatus) -> Result<bool> {
        let conn = self.conn()?;
        self.with_account_write_lock(account_id, || {
            AccountRepo::update_status(&conn, account_id, status)
        })
    }

    /// Record the external identity learned at login and bump last-seen.
    pub fn record_account_login(&self, account_id: &str, identity: &str) -> Result<bool> {
        let conn = self.conn()?;
        self.with_account_write_lock(account_id, || {
            let found = AccountRepo::set_external_identity(&conn, account_id, identity)?;
            if found {
                let _ = AccountRepo::touch_last_seen(&conn, account_id)?;
            }
            Ok(found)
        })
    }

    /// Bump an account's last-seen timestamp.
    pub fn touch_account_seen(&self, account_id: &str) -> Result<bool> {
        AccountRepo::touch_last_seen(&*self.conn()?, account_id)
    }

    /// Soft-deactivate an account.
    pub fn deactivate_account(&self, account_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        self.with_account_write_lock(account_id, || AccountRepo::deactivate(&conn, account_id))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound events
    // ─────────────────────────────────────────────────────────────────────

    /// Persist an inbound event, deduplicating on `(account_id, external_id)`.
    ///
    /// Effect-once under at-least-once delivery: redelivered events return
    /// [`RecordOutcome::Duplicate`] without writing, whether the duplicate is
    /// caught by the pre-check or by the unique index under a race.
    #[instrument(skip(self, event), fields(account_id = %event.account_id, external_id = %event.external_id))]
    pub fn record_inbound(&self, event: &InboundEvent) -> Result<RecordOutcome> {
        let conn = self.conn()?;
        self.with_account_write_lock(&event.account_id, || {
            if EventRepo::exists(&conn, &event.account_id, &event.external_id)? {
                debug!("duplicate inbound event skipped");
                return Ok(RecordOutcome::Duplicate);
            }
            match EventRepo::insert(&conn, event) {
                Ok(()) => Ok(RecordOutcome::Inserted),
                Err(err) if Self::is_unique_violation(&err) => Ok(RecordOutcome::Duplicate),
                Err(err) => Err(err),
            }
        })
    }

    /// Get a persisted event.
    pub fn get_event(&self, event_id: &str) -> Result<Option<InboundEvent>> {
        EventRepo::get_by_id(&*self.conn()?, event_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Outbound sends
    // ─────────────────────────────────────────────────────────────────────

    /// Record a new outbound send in `queued` status.
    pub fn enqueue_send(
        &self,
        account_id: &str,
        recipient: &str,
        body: &str,
        origin: courier_core::send::SendOrigin,
    ) -> Result<OutboundSend> {
        let conn = self.conn()?;
        self.with_account_write_lock(account_id, || {
            SendRepo::create(
                &conn,
                &CreateSendOptions {
                    account_id,
                    recipient,
                    body,
                    origin,
                },
            )
        })
    }

    /// Mark a queued send as accepted, recording the remote message id.
    pub fn mark_send_sent(&self, send_id: &str, external_id: &str) -> Result<bool> {
        SendRepo::mark_sent(&*self.conn()?, send_id, external_id)
    }

    /// Mark a send as terminally failed.
    pub fn mark_send_failed(&self, send_id: &str, error: &str) -> Result<bool> {
        SendRepo::mark_failed(&*self.conn()?, send_id, error)
    }

    /// Get one send.
    pub fn get_send(&self, send_id: &str) -> Result<Option<OutboundSend>> {
        SendRepo::get_by_id(&*self.conn()?, send_id)
    }

    /// Apply a delivery ack to the send matching `external_id`.
    ///
    /// Transitions are monotonic: a regressive or post-terminal ack is
    /// reported as [`AckOutcome::Stale`] and dropped. An unmatched ack is a
    /// silent no-op ([`AckOutcome::NoMatch`]).
    #[instrument(skip(self))]
    pub fn apply_ack(
        &self,
        account_id: &str,
        external_id: &str,
        status: SendStatus,
    ) -> Result<AckOutcome> {
        let conn = self.conn()?;
        self.with_account_write_lock(account_id, || {
            let Some(send) = SendRepo::get_by_external_id(&conn, account_id, external_id)? else {
                debug!("ack without matching send, ignoring");
                return Ok(AckOutcome::NoMatch);
            };
            if !send.status.can_transition_to(status) {
                debug!(current = %send.status, incoming = %status, "stale ack dropped");
                return Ok(AckOutcome::Stale);
            }
            let _ = SendRepo::update_status(&conn, &send.id, status)?;
            Ok(AckOutcome::Applied)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scheduled sends
    // ─────────────────────────────────────────────────────────────────────

    /// Create a scheduled send.
    pub fn create_schedule(
        &self,
        account_id: &str,
        recipient: &str,
        body: &str,
        fire_at: DateTime<Utc>,
        cron_expr: Option<&str>,
    ) -> Result<ScheduledSend> {
        let conn = self.conn()?;
        self.with_account_write_lock(account_id, || {
            ScheduleRepo::create(
                &conn,
                &CreateScheduleOptions {
                    account_id,
                    recipient,
                    body,
                    fire_at,
                    cron_expr,
                },
            )
        })
    }

    /// Claim every due item via conditional `pending → in_flight`.
    ///
    /// Only items whose claim succeeded are returned; a concurrent worker
    /// instance claiming the same tick gets the complement. This is the
    /// no-double-fire boundary.
    #[instrument(skip(self))]
    pub fn claim_due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledSend>> {
        let conn = self.conn()?;
        self.with_global_write_lock(|| {
            let due = ScheduleRepo::list_due(&conn, now)?;
            let mut claimed = Vec::with_capacity(due.len());
            for item in due {
                if ScheduleRepo::try_claim(&conn, &item.id)? {
                    match ScheduleRepo::get_by_id(&conn, &item.id)? {
                        Some(fresh) => claimed.push(fresh),
                        None => warn!(schedule_id = %item.id, "claimed schedule vanished"),
                    }
                }
            }
            Ok(claimed)
        })
    }

    /// Terminal success for a claimed item.
    pub fn complete_schedule_sent(&self, schedule_id: &str) -> Result<bool> {
        ScheduleRepo::mark_sent(&*self.conn()?, schedule_id)
    }

    /// Terminal failure for a claimed item.
    pub fn complete_schedule_failed(&self, schedule_id: &str, error: &str) -> Result<bool> {
        ScheduleRepo::mark_failed(&*self.conn()?, schedule_id, error)
    }

    /// Return a fired recurring item to `pending` at its next occurrence.
    pub fn reschedule(&self, schedule_id: &str, next_fire_at: DateTime<Utc>) -> Result<bool> {
        ScheduleRepo::reschedule(&*self.conn()?, schedule_id, next_fire_at)
    }

    /// Cancel a pending scheduled send.
    pub fn cancel_schedule(&self, schedule_id: &str) -> Result<bool> {
        ScheduleRepo::cancel(&*self.conn()?, schedule_id)
    }

    /// Get one scheduled send.
    pub fn get_schedule(&self, schedule_id: &str) -> Result<Option<ScheduledSend>> {
        ScheduleRepo::get_by_id(&*self.conn()?, schedule_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Agents & ignore rules
    // ─────────────────────────────────────────────────────────────────────

    /// Create an agent config.
    pub fn create_agent(&self, opts: &CreateAgentOptions<'_>) -> Result<AgentConfig> {
        AgentRepo::create(&*self.conn()?, opts)
    }

    /// Enabled agents for an account in selection order.
    pub fn list_enabled_agents(&self, account_id: &str) -> Result<Vec<AgentConfig>> {
        AgentRepo::list_enabled_for_account(&*self.conn()?, account_id)
    }

    /// Create an ignore rule.
    pub fn create_ignore_rule(&self, opts: &CreateIgnoreRuleOptions<'_>) -> Result<IgnoreRule> {
        IgnoreRuleRepo::create(&*self.conn()?, opts)
    }

    /// An account's ignore rules in evaluation order.
    pub fn list_ignore_rules(&self, account_id: &str) -> Result<Vec<IgnoreRule>> {
        IgnoreRuleRepo::list_for_account(&*self.conn()?, account_id)
    }

    /// Run arbitrary read-only work against a pooled connection (tests,
    /// ad-hoc inspection in the daemon).
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        f(&conn)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
