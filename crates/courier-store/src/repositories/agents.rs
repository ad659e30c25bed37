//! Agent-config repository.
//!
//! `list_enabled_for_account` drives dispatcher selection: ascending
//! priority, creation order as the tiebreak, so selection is stable across
//! process restarts.

use courier_core::agent::{AgentConfig, AgentKind};
use courier_core::ids;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;
use crate::row::{now_rfc3339, parse_enum, parse_string_array, parse_timestamp};

/// Options for creating an agent config.
pub struct CreateAgentOptions<'a> {
    /// Owning account.
    pub account_id: &'a str,
    /// Strategy variant.
    pub kind: AgentKind,
    /// Strategy-specific configuration payload.
    pub config: &'a serde_json::Value,
    /// Sender allow-list. Empty means all senders.
    pub allowed_senders: &'a [String],
    /// Skip group-chat events.
    pub ignore_group_chats: bool,
    /// Selection order, ascending.
    pub priority: i64,
}

/// Agent repository — stateless, every method takes `&Connection`.
pub struct AgentRepo;

const COLUMNS: &str = "id, account_id, kind, config, allowed_senders, ignore_group_chats, \
                       enabled, priority, created_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<AgentConfig> {
    let config_raw: String = row.get(3)?;
    let config = serde_json::from_str(&config_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("bad agent config JSON: {e}").into(),
        )
    })?;
    Ok(AgentConfig {
        id: row.get(0)?,
        account_id: row.get(1)?,
        kind: parse_enum(2, &row.get::<_, String>(2)?, AgentKind::from_sql)?,
        config,
        allowed_senders: parse_string_array(4, &row.get::<_, String>(4)?)?,
        ignore_group_chats: row.get(5)?,
        enabled: row.get(6)?,
        priority: row.get(7)?,
        created_at: parse_timestamp(8, &row.get::<_, String>(8)?)?,
    })
}

impl AgentRepo {
    /// Create an enabled agent config.
    pub fn create(conn: &Connection, opts: &CreateAgentOptions<'_>) -> Result<AgentConfig> {
        let id = ids::new_agent_id();
        let now = now_rfc3339();
        let allowed = serde_json::to_string(opts.allowed_senders)
            .map_err(|e| crate::StoreError::Internal(format!("allow-list serialization: {e}")))?;
        let _ = conn.execute(
            "INSERT INTO agents (id, account_id, kind, config, allowed_senders, ignore_group_chats, enabled, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
            params![
                id,
                opts.account_id,
                opts.kind.as_sql(),
                opts.config.to_string(),
                allowed,
                opts.ignore_group_chats,
                opts.priority,
                now
            ],
        )?;
        Self::get_by_id(conn, &id)?.ok_or_else(|| crate::StoreError::not_found("agent", id))
    }

    /// Get agent by id.
    pub fn get_by_id(conn: &Connection, agent_id: &str) -> Result<Option<AgentConfig>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM agents WHERE id = ?1"),
                params![agent_id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List enabled agents in selection order (priority, then insertion).
    pub fn list_enabled_for_account(
        conn: &Connection,
        account_id: &str,
    ) -> Result<Vec<AgentConfig>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM agents WHERE account_id = ?1 AND enabled = 1
             ORDER BY priority, created_at, id"
        ))?;
        let rows = stmt
            .query_map(params![account_id], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Enable or disable an agent.
    pub fn set_enabled(conn: &Connection, agent_id: &str, enabled: bool) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE agents SET enabled = ?1 WHERE id = ?2",
            params![enabled, agent_id],
        )?;
        Ok(changed > 0)
    }

    /// Delete an agent config.
    pub fn delete(conn: &Connection, agent_id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM agents WHERE id = ?1", params![agent_id])?;
        Ok(changed > 0)
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
    use serde_json::json;

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        let account = AccountRepo::create(&conn, &CreateAccountOptions { label: "A" }).unwrap();
        (conn, account.id)
    }

    fn create(conn: &Connection, account_id: &str, priority: i64) -> AgentConfig {
        AgentRepo::create(
            conn,
            &CreateAgentOptions {
                account_id,
                kind: AgentKind::RuleBased,
                config: &json!({"rules": []}),
                allowed_senders: &[],
                ignore_group_chats: false,
                priority,
            },
        )
        .unwrap()
    }

    #[test]
    fn create_and_fetch() {
        let (conn, account_id) = setup();
        let agent = create(&conn, &account_id, 0);
        assert!(agent.id.starts_with("agent_"));
        assert!(agent.enabled);
        let found = AgentRepo::get_by_id(&conn, &agent.id).unwrap().unwrap();
        assert_eq!(found, agent);
    }

    #[test]
    fn selection_order_is_priority_then_insertion() {
        let (conn, account_id) = setup();
        let second = create(&conn, &account_id, 5);
        let first = create(&conn, &account_id, 1);
        let tied = create(&conn, &account_id, 5);

        let listed = AgentRepo::list_enabled_for_account(&conn, &account_id).unwrap();
        let ids: Vec<&str> = listed.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str(), tied.id.as_str()]);
    }

    #[test]
    fn disabled_agents_are_not_listed() {
        let (conn, account_id) = setup();
        let agent = create(&conn, &account_id, 0);
        AgentRepo::set_enabled(&conn, &agent.id, false).unwrap();
        assert!(
            AgentRepo::list_enabled_for_account(&conn, &account_id)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn allow_list_round_trips() {
        let (conn, account_id) = setup();
        let agent = AgentRepo::create(
            &conn,
            &CreateAgentOptions {
                account_id: &account_id,
                kind: AgentKind::Generative,
                config: &json!({"endpoint": "https://llm.example", "model": "m"}),
                allowed_senders: &["alice@host".to_string()],
                ignore_group_chats: true,
                priority: 0,
            },
        )
        .unwrap();
        let found = AgentRepo::get_by_id(&conn, &agent.id).unwrap().unwrap();
        assert_eq!(found.allowed_senders, vec!["alice@host".to_string()]);
        assert!(found.ignore_group_chats);
    }

    #[test]
    fn delete_agent() {
        let (conn, account_id) = setup();
        let agent = create(&conn, &account_id, 0);
        assert!(AgentRepo::delete(&conn, &agent.id).unwrap());
        assert!(AgentRepo::get_by_id(&conn, &agent.id).unwrap().is_none());
    }
}
