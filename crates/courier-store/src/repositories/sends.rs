//! Outbound-send repository — CRUD plus status transitions.

use courier_core::ids;
use courier_core::send::{OutboundSend, SendOrigin, SendStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;
use crate::row::{now_rfc3339, parse_enum, parse_timestamp, parse_timestamp_opt};

/// Options for recording a new outbound send.
pub struct CreateSendOptions<'a> {
    /// Owning account.
    pub account_id: &'a str,
    /// Recipient identity.
    pub recipient: &'a str,
    /// Message body.
    pub body: &'a str,
    /// What produced this send.
    pub origin: SendOrigin,
}

/// Outbound-send repository — stateless, every method takes `&Connection`.
pub struct SendRepo;

const COLUMNS: &str =
    "id, account_id, recipient, body, status, origin, external_id, error, created_at, sent_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<OutboundSend> {
    Ok(OutboundSend {
        id: row.get(0)?,
        account_id: row.get(1)?,
        recipient: row.get(2)?,
        body: row.get(3)?,
        status: parse_enum(4, &row.get::<_, String>(4)?, SendStatus::from_sql)?,
        origin: parse_enum(5, &row.get::<_, String>(5)?, SendOrigin::from_sql)?,
        external_id: row.get(6)?,
        error: row.get(7)?,
        created_at: parse_timestamp(8, &row.get::<_, String>(8)?)?,
        sent_at: parse_timestamp_opt(9, row.get(9)?)?,
    })
}

impl SendRepo {
    /// Record a new send in `queued` status.
    pub fn create(conn: &Connection, opts: &CreateSendOptions<'_>) -> Result<OutboundSend> {
        let id = ids::new_send_id();
        let now = now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO outbound_sends (id, account_id, recipient, body, status, origin, created_at)
             VALUES (?1, ?2, ?3, ?4, 'queued', ?5, ?6)",
            params![id, opts.account_id, opts.recipient, opts.body, opts.origin.as_sql(), now],
        )?;
        Self::get_by_id(conn, &id)?.ok_or_else(|| crate::StoreError::not_found("send", id))
    }

    /// Get send by id.
    pub fn get_by_id(conn: &Connection, send_id: &str) -> Result<Option<OutboundSend>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM outbound_sends WHERE id = ?1"),
                params![send_id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Look up a send by the remote-assigned message id. Acks match on this.
    pub fn get_by_external_id(
        conn: &Connection,
        account_id: &str,
        external_id: &str,
    ) -> Result<Option<OutboundSend>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM outbound_sends
                     WHERE account_id = ?1 AND external_id = ?2"
                ),
                params![account_id, external_id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Mark a queued send as accepted by the remote endpoint.
    pub fn mark_sent(conn: &Connection, send_id: &str, external_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE outbound_sends SET status = 'sent', external_id = ?1, sent_at = ?2
             WHERE id = ?3 AND status = 'queued'",
            params![external_id, now_rfc3339(), send_id],
        )?;
        Ok(changed > 0)
    }

    /// Mark a send as terminally failed with the failure detail.
    pub fn mark_failed(conn: &Connection, send_id: &str, error: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE outbound_sends SET status = 'failed', error = ?1
             WHERE id = ?2 AND status NOT IN ('read', 'failed')",
            params![error, send_id],
        )?;
        Ok(changed > 0)
    }

    /// Write a new delivery status. Transition legality is checked by the
    /// store layer; this is the raw row write.
    pub fn update_status(conn: &Connection, send_id: &str, status: SendStatus) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE outbound_sends SET status = ?1 WHERE id = ?2",
            params![status.as_sql(), send_id],
        )?;
        Ok(changed > 0)
    }

    /// List an account's sends, most recent first.
    pub fn list_for_account(
        conn: &Connection,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<OutboundSend>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM outbound_sends WHERE account_id = ?1
             ORDER BY created_at DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![account_id, limit], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
