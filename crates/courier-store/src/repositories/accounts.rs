//! Account repository — CRUD for the `accounts` table.
//!
//! Accounts are the ownership root: events, sends, schedules, agents, and
//! ignore rules all reference one. Accounts are soft-deactivated, never
//! deleted, so those references stay valid.

use courier_core::account::{AccountStatus, ManagedAccount};
use courier_core::ids;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;
use crate::row::{now_rfc3339, parse_enum, parse_timestamp, parse_timestamp_opt};

/// Options for registering a new account.
pub struct CreateAccountOptions<'a> {
    /// Human-readable label.
    pub label: &'a str,
}

/// Account repository — stateless, every method takes `&Connection`.
pub struct AccountRepo;

const COLUMNS: &str = "id, label, external_identity, status, last_seen_at, created_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<ManagedAccount> {
    Ok(ManagedAccount {
        id: row.get(0)?,
        label: row.get(1)?,
        external_identity: row.get(2)?,
        status: parse_enum(3, &row.get::<_, String>(3)?, AccountStatus::from_sql)?,
        last_seen_at: parse_timestamp_opt(4, row.get(4)?)?,
        created_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
    })
}

impl AccountRepo {
    /// Register a new account in `pending` status.
    pub fn create(conn: &Connection, opts: &CreateAccountOptions<'_>) -> Result<ManagedAccount> {
        let id = ids::new_account_id();
        let now = now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO accounts (id, label, status, created_at) VALUES (?1, ?2, 'pending', ?3)",
            params![id, opts.label, now],
        )?;
        Self::get_by_id(conn, &id)?.ok_or_else(|| crate::StoreError::not_found("account", id))
    }

    /// Get account by id.
    pub fn get_by_id(conn: &Connection, account_id: &str) -> Result<Option<ManagedAccount>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM accounts WHERE id = ?1"),
                params![account_id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List all accounts, oldest first.
    pub fn list(conn: &Connection) -> Result<Vec<ManagedAccount>> {
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM accounts ORDER BY created_at"))?;
        let rows = stmt
            .query_map([], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// List accounts that should hold a live connection (not deactivated).
    pub fn list_active(conn: &Connection) -> Result<Vec<ManagedAccount>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM accounts WHERE status != 'deactivated' ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map([], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Update lifecycle status. Returns `false` if the account is missing.
    ///
    /// Deactivated accounts are sticky: supervisor status writes racing a
    /// deactivation must not resurrect the account.
    pub fn update_status(
        conn: &Connection,
        account_id: &str,
        status: AccountStatus,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE accounts SET status = ?1 WHERE id = ?2 AND status != 'deactivated'",
            params![status.as_sql(), account_id],
        )?;
        Ok(changed > 0)
    }

    /// Record the external identity once learned at login.
    pub fn set_external_identity(
        conn: &Connection,
        account_id: &str,
        identity: &str,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE accounts SET external_identity = ?1 WHERE id = ?2",
            params![identity, account_id],
        )?;
        Ok(changed > 0)
    }

    /// Bump `last_seen_at` to now.
    pub fn touch_last_seen(conn: &Connection, account_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE accounts SET last_seen_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), account_id],
        )?;
        Ok(changed > 0)
    }

    /// Soft-deactivate. Idempotent.
    pub fn deactivate(conn: &Connection, account_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE accounts SET status = 'deactivated' WHERE id = ?1",
            params![account_id],
        )?;
        Ok(changed > 0)
    }

    /// Count all accounts.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
