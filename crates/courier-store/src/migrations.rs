//! Versioned schema migrations.
//!
//! Migrations run inside one transaction per version bump and are tracked in
//! `PRAGMA user_version`. Re-running against an up-to-date database is a
//! no-op, so every process start applies them unconditionally.

use rusqlite::Connection;
use tracing::info;

use crate::errors::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 1;

const V1: &str = "
CREATE TABLE accounts (
    id                TEXT PRIMARY KEY,
    label             TEXT NOT NULL,
    external_identity TEXT,
    status            TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending','connecting','connected','disconnected','deactivated')),
    last_seen_at      TEXT,
    created_at        TEXT NOT NULL
);

CREATE TABLE inbound_events (
    id            TEXT PRIMARY KEY,
    account_id    TEXT NOT NULL REFERENCES accounts(id),
    external_id   TEXT NOT NULL,
    sender        TEXT NOT NULL,
    chat          TEXT NOT NULL,
    body          TEXT NOT NULL,
    kind          TEXT NOT NULL
        CHECK (kind IN ('message','ack','presence','connection_state')),
    is_group_chat INTEGER NOT NULL DEFAULT 0,
    received_at   TEXT NOT NULL,
    UNIQUE (account_id, external_id)
);
CREATE INDEX idx_inbound_events_account ON inbound_events(account_id, received_at);

CREATE TABLE outbound_sends (
    id          TEXT PRIMARY KEY,
    account_id  TEXT NOT NULL REFERENCES accounts(id),
    recipient   TEXT NOT NULL,
    body        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'queued'
        CHECK (status IN ('queued','sent','delivered','read','failed')),
    origin      TEXT NOT NULL
        CHECK (origin IN ('manual','agent','schedule')),
    external_id TEXT,
    error       TEXT,
    created_at  TEXT NOT NULL,
    sent_at     TEXT
);
CREATE INDEX idx_outbound_sends_external ON outbound_sends(account_id, external_id);

CREATE TABLE scheduled_sends (
    id                TEXT PRIMARY KEY,
    account_id        TEXT NOT NULL REFERENCES accounts(id),
    recipient         TEXT NOT NULL,
    body              TEXT NOT NULL,
    fire_at           TEXT NOT NULL,
    cron_expr         TEXT,
    status            TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending','in_flight','sent','failed','cancelled')),
    last_attempted_at TEXT,
    sent_at           TEXT,
    error             TEXT,
    created_at        TEXT NOT NULL
);
CREATE INDEX idx_scheduled_sends_due ON scheduled_sends(status, fire_at);

CREATE TABLE agents (
    id                 TEXT PRIMARY KEY,
    account_id         TEXT NOT NULL REFERENCES accounts(id),
    kind               TEXT NOT NULL CHECK (kind IN ('rule_based','generative')),
    config             TEXT NOT NULL DEFAULT '{}',
    allowed_senders    TEXT NOT NULL DEFAULT '[]',
    ignore_group_chats INTEGER NOT NULL DEFAULT 0,
    enabled            INTEGER NOT NULL DEFAULT 1,
    priority           INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL
);
CREATE INDEX idx_agents_account ON agents(account_id, priority);

CREATE TABLE ignore_rules (
    id         TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id),
    scope      TEXT NOT NULL CHECK (scope IN ('contact','group','keyword')),
    pattern    TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX idx_ignore_rules_account ON ignore_rules(account_id);
";

/// Apply all outstanding migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current < 1 {
        apply(conn, 1, V1)?;
    }

    Ok(())
}

fn apply(conn: &Connection, version: i64, sql: &str) -> Result<()> {
    conn.execute_batch("BEGIN")?;
    match conn
        .execute_batch(sql)
        .and_then(|()| conn.pragma_update(None, "user_version", version))
    {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            info!(version, "applied schema migration");
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(err.into())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_to_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn expected_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        for table in [
            "accounts",
            "inbound_events",
            "outbound_sends",
            "scheduled_sends",
            "agents",
            "ignore_rules",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
