//! Inbound-event repository — insert-only storage with the dedup key.
//!
//! `UNIQUE (account_id, external_id)` is the idempotency backstop: even if
//! two workers race past the `exists` check, the second insert fails at the
//! database and the event is stored exactly once.

use courier_core::event::{EventKind, InboundEvent};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;
use crate::row::{parse_enum, parse_timestamp};

/// Event repository — stateless, every method takes `&Connection`.
pub struct EventRepo;

const COLUMNS: &str =
    "id, account_id, external_id, sender, chat, body, kind, is_group_chat, received_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<InboundEvent> {
    Ok(InboundEvent {
        id: row.get(0)?,
        account_id: row.get(1)?,
        external_id: row.get(2)?,
        sender: row.get(3)?,
        chat: row.get(4)?,
        body: row.get(5)?,
        kind: parse_enum(6, &row.get::<_, String>(6)?, EventKind::from_sql)?,
        is_group_chat: row.get(7)?,
        received_at: parse_timestamp(8, &row.get::<_, String>(8)?)?,
    })
}

impl EventRepo {
    /// Insert a fully-formed event. Fails on a dedup-key collision.
    pub fn insert(conn: &Connection, event: &InboundEvent) -> Result<()> {
        let _ = conn.execute(
            &format!("INSERT INTO inbound_events ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                event.id,
                event.account_id,
                event.external_id,
                event.sender,
                event.chat,
                event.body,
                event.kind.as_sql(),
                event.is_group_chat,
                event.received_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Whether an event with this dedup key is already persisted.
    pub fn exists(conn: &Connection, account_id: &str, external_id: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM inbound_events WHERE account_id = ?1 AND external_id = ?2)",
            params![account_id, external_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Get event by id.
    pub fn get_by_id(conn: &Connection, event_id: &str) -> Result<Option<InboundEvent>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM inbound_events WHERE id = ?1"),
                params![event_id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List an account's events, most recent first.
    pub fn list_for_account(
        conn: &Connection,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<InboundEvent>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM inbound_events WHERE account_id = ?1
             ORDER BY received_at DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![account_id, limit], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count events for an account.
    pub fn count_for_account(conn: &Connection, account_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inbound_events WHERE account_id = ?1",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::repositories::accounts::{AccountRepo, CreateAccountOptions};
    use chrono::Utc;
    use courier_core::ids;

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        let account = AccountRepo::create(&conn, &CreateAccountOptions { label: "A" }).unwrap();
        (conn, account.id)
    }

    fn event(account_id: &str, external_id: &str) -> InboundEvent {
        InboundEvent {
            id: ids::new_event_id(),
            account_id: account_id.to_string(),
            external_id: external_id.to_string(),
            sender: "alice@host".into(),
            chat: "alice@host".into(),
            body: "hi".into(),
            kind: EventKind::Message,
            is_group_chat: false,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_fetch() {
        let (conn, account_id) = setup();
        let ev = event(&account_id, "EXT1");
        EventRepo::insert(&conn, &ev).unwrap();
        let found = EventRepo::get_by_id(&conn, &ev.id).unwrap().unwrap();
        assert_eq!(found, ev.clone());
        assert!(EventRepo::exists(&conn, &account_id, "EXT1").unwrap());
        assert!(!EventRepo::exists(&conn, &account_id, "EXT2").unwrap());
    }

    #[test]
    fn dedup_key_rejects_second_insert() {
        let (conn, account_id) = setup();
        EventRepo::insert(&conn, &event(&account_id, "EXT1")).unwrap();
        assert!(EventRepo::insert(&conn, &event(&account_id, "EXT1")).is_err());
        assert_eq!(EventRepo::count_for_account(&conn, &account_id).unwrap(), 1);
    }

    #[test]
    fn same_external_id_across_accounts_is_fine() {
        let (conn, account_a) = setup();
        let account_b = AccountRepo::create(&conn, &CreateAccountOptions { label: "B" })
            .unwrap()
            .id;
        EventRepo::insert(&conn, &event(&account_a, "EXT1")).unwrap();
        EventRepo::insert(&conn, &event(&account_b, "EXT1")).unwrap();
    }

    #[test]
    fn list_is_most_recent_first() {
        let (conn, account_id) = setup();
        let mut first = event(&account_id, "EXT1");
        first.received_at = Utc::now() - chrono::Duration::seconds(10);
        let second = event(&account_id, "EXT2");
        EventRepo::insert(&conn, &first).unwrap();
        EventRepo::insert(&conn, &second).unwrap();

        let listed = EventRepo::list_for_account(&conn, &account_id, 10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].external_id, "EXT2");
        assert_eq!(listed[1].external_id, "EXT1");
    }
}
