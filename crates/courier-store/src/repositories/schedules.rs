//! Scheduled-send repository — due-item selection and the claim transition.
//!
//! `try_claim` is the correctness boundary for the Schedule Worker: the
//! conditional `pending → in_flight` UPDATE succeeds for exactly one caller
//! per item, so overlapping ticks or multiple worker instances never
//! double-fire.

use chrono::{DateTime, Utc};
use courier_core::ids;
use courier_core::schedule::{ScheduleStatus, ScheduledSend};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;
use crate::row::{now_rfc3339, parse_enum, parse_timestamp, parse_timestamp_opt};

/// Options for creating a scheduled send.
pub struct CreateScheduleOptions<'a> {
    /// Owning account.
    pub account_id: &'a str,
    /// Recipient identity.
    pub recipient: &'a str,
    /// Message body.
    pub body: &'a str,
    /// First (or only) fire time.
    pub fire_at: DateTime<Utc>,
    /// Cron expression for recurring items.
    pub cron_expr: Option<&'a str>,
}

/// Scheduled-send repository — stateless, every method takes `&Connection`.
pub struct ScheduleRepo;

const COLUMNS: &str = "id, account_id, recipient, body, fire_at, cron_expr, status, \
                       last_attempted_at, sent_at, error, created_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<ScheduledSend> {
    Ok(ScheduledSend {
        id: row.get(0)?,
        account_id: row.get(1)?,
        recipient: row.get(2)?,
        body: row.get(3)?,
        fire_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
        cron_expr: row.get(5)?,
        status: parse_enum(6, &row.get::<_, String>(6)?, ScheduleStatus::from_sql)?,
        last_attempted_at: parse_timestamp_opt(7, row.get(7)?)?,
        sent_at: parse_timestamp_opt(8, row.get(8)?)?,
        error: row.get(9)?,
        created_at: parse_timestamp(10, &row.get::<_, String>(10)?)?,
    })
}

impl ScheduleRepo {
    /// Create a new scheduled send in `pending` status.
    pub fn create(conn: &Connection, opts: &CreateScheduleOptions<'_>) -> Result<ScheduledSend> {
        let id = ids::new_schedule_id();
        let now = now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO scheduled_sends (id, account_id, recipient, body, fire_at, cron_expr, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
            params![
                id,
                opts.account_id,
                opts.recipient,
                opts.body,
                opts.fire_at.to_rfc3339(),
                opts.cron_expr,
                now
            ],
        )?;
        Self::get_by_id(conn, &id)?.ok_or_else(|| crate::StoreError::not_found("schedule", id))
    }

    /// Get scheduled send by id.
    pub fn get_by_id(conn: &Connection, schedule_id: &str) -> Result<Option<ScheduledSend>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM scheduled_sends WHERE id = ?1"),
                params![schedule_id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List pending items whose fire time has passed, earliest first.
    pub fn list_due(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<ScheduledSend>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM scheduled_sends
             WHERE status = 'pending' AND fire_at <= ?1
             ORDER BY fire_at"
        ))?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Claim a due item: conditional `pending → in_flight`.
    ///
    /// Returns `true` for exactly one caller per item; losers see `false`
    /// and must skip the item.
    pub fn try_claim(conn: &Connection, schedule_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE scheduled_sends SET status = 'in_flight', last_attempted_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now_rfc3339(), schedule_id],
        )?;
        Ok(changed > 0)
    }

    /// Terminal success for a claimed item.
    pub fn mark_sent(conn: &Connection, schedule_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE scheduled_sends SET status = 'sent', sent_at = ?1
             WHERE id = ?2 AND status = 'in_flight'",
            params![now_rfc3339(), schedule_id],
        )?;
        Ok(changed > 0)
    }

    /// Terminal failure for a claimed item. No automatic retry.
    pub fn mark_failed(conn: &Connection, schedule_id: &str, error: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE scheduled_sends SET status = 'failed', error = ?1
             WHERE id = ?2 AND status = 'in_flight'",
            params![error, schedule_id],
        )?;
        Ok(changed > 0)
    }

    /// Return a fired recurring item to `pending` with its next fire time.
    pub fn reschedule(
        conn: &Connection,
        schedule_id: &str,
        next_fire_at: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE scheduled_sends SET status = 'pending', fire_at = ?1, sent_at = ?2
             WHERE id = ?3 AND status = 'in_flight'",
            params![next_fire_at.to_rfc3339(), now_rfc3339(), schedule_id],
        )?;
        Ok(changed > 0)
    }

    /// Cancel a pending item. Terminal; pre-empts firing.
    pub fn cancel(conn: &Connection, schedule_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE scheduled_sends SET status = 'cancelled'
             WHERE id = ?1 AND status = 'pending'",
            params![schedule_id],
        )?;
        Ok(changed > 0)
    }

    /// List an account's scheduled sends, soonest first.
    pub fn list_for_account(conn: &Connection, account_id: &str) -> Result<Vec<ScheduledSend>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM scheduled_sends WHERE account_id = ?1 ORDER BY fire_at"
        ))?;
        let rows = stmt
            .query_map(params![account_id], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
