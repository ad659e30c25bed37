//! Ignore-rule repository.

use courier_core::ids;
use courier_core::rule::{IgnoreRule, IgnoreScope};
use rusqlite::{Connection, Row, params};

use crate::errors::Result;
use crate::row::{now_rfc3339, parse_enum, parse_timestamp};

/// Options for creating an ignore rule.
pub struct CreateIgnoreRuleOptions<'a> {
    /// Owning account.
    pub account_id: &'a str,
    /// What the rule matches against.
    pub scope: IgnoreScope,
    /// Exact identity for contact/group scopes, regex for keyword scope.
    pub pattern: &'a str,
}

/// Ignore-rule repository — stateless, every method takes `&Connection`.
pub struct IgnoreRuleRepo;

const COLUMNS: &str = "id, account_id, scope, pattern, created_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<IgnoreRule> {
    Ok(IgnoreRule {
        id: row.get(0)?,
        account_id: row.get(1)?,
        scope: parse_enum(2, &row.get::<_, String>(2)?, IgnoreScope::from_sql)?,
        pattern: row.get(3)?,
        created_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
    })
}

impl IgnoreRuleRepo {
    /// Create an ignore rule.
    pub fn create(conn: &Connection, opts: &CreateIgnoreRuleOptions<'_>) -> Result<IgnoreRule> {
        let id = ids::new_rule_id();
        let now = now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO ignore_rules (id, account_id, scope, pattern, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, opts.account_id, opts.scope.as_sql(), opts.pattern, now],
        )?;
        Ok(IgnoreRule {
            id,
            account_id: opts.account_id.to_string(),
            scope: opts.scope,
            pattern: opts.pattern.to_string(),
            created_at: crate::row::parse_timestamp(0, &now)?,
        })
    }

    /// List an account's rules in evaluation order (contact, group, keyword).
    pub fn list_for_account(conn: &Connection, account_id: &str) -> Result<Vec<IgnoreRule>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM ignore_rules WHERE account_id = ?1
             ORDER BY CASE scope WHEN 'contact' THEN 0 WHEN 'group' THEN 1 ELSE 2 END, created_at"
        ))?;
        let rows = stmt
            .query_map(params![account_id], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete a rule.
    pub fn delete(conn: &Connection, rule_id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM ignore_rules WHERE id = ?1", params![rule_id])?;
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

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        let account = AccountRepo::create(&conn, &CreateAccountOptions { label: "A" }).unwrap();
        (conn, account.id)
    }

    #[test]
    fn create_and_list() {
        let (conn, account_id) = setup();
        let rule = IgnoreRuleRepo::create(
            &conn,
            &CreateIgnoreRuleOptions {
                account_id: &account_id,
                scope: IgnoreScope::Contact,
                pattern: "spam@host",
            },
        )
        .unwrap();
        assert!(rule.id.starts_with("rule_"));

        let listed = IgnoreRuleRepo::list_for_account(&conn, &account_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].pattern, "spam@host");
    }

    #[test]
    fn list_orders_by_scope() {
        let (conn, account_id) = setup();
        for (scope, pattern) in [
            (IgnoreScope::Keyword, "(?i)unsubscribe"),
            (IgnoreScope::Contact, "spam@host"),
            (IgnoreScope::Group, "noise@group"),
        ] {
            IgnoreRuleRepo::create(
                &conn,
                &CreateIgnoreRuleOptions {
                    account_id: &account_id,
                    scope,
                    pattern,
                },
            )
            .unwrap();
        }

        let scopes: Vec<IgnoreScope> = IgnoreRuleRepo::list_for_account(&conn, &account_id)
            .unwrap()
            .into_iter()
            .map(|r| r.scope)
            .collect();
        assert_eq!(
            scopes,
            vec![IgnoreScope::Contact, IgnoreScope::Group, IgnoreScope::Keyword]
        );
    }

    #[test]
    fn delete_rule() {
        let (conn, account_id) = setup();
        let rule = IgnoreRuleRepo::create(
            &conn,
            &CreateIgnoreRuleOptions {
                account_id: &account_id,
                scope: IgnoreScope::Keyword,
                pattern: "stop",
            },
        )
        .unwrap();
        assert!(IgnoreRuleRepo::delete(&conn, &rule.id).unwrap());
        assert!(IgnoreRuleRepo::list_for_account(&conn, &account_id).unwrap().is_empty());
    }
}
