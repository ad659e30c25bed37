//! Prefixed UUIDv7 id generation.
//!
//! Every persisted record carries a string id with a short type prefix so
//! logs and queries read unambiguously (`acct_…`, `evt_…`, `send_…`).
//! UUIDv7 keeps ids time-ordered, which keeps index inserts append-mostly.

use uuid::Uuid;

/// New managed-account id.
#[must_use]
pub fn new_account_id() -> String {
    format!("acct_{}", Uuid::now_v7())
}

/// New inbound-event id.
#[must_use]
pub fn new_event_id() -> String {
    format!("evt_{}", Uuid::now_v7())
}

/// New outbound-send id.
#[must_use]
pub fn new_send_id() -> String {
    format!("send_{}", Uuid::now_v7())
}

/// New scheduled-send id.
#[must_use]
pub fn new_schedule_id() -> String {
    format!("sched_{}", Uuid::now_v7())
}

/// New agent-config id.
#[must_use]
pub fn new_agent_id() -> String {
    format!("agent_{}", Uuid::now_v7())
}

/// New ignore-rule id.
#[must_use]
pub fn new_rule_id() -> String {
    format!("rule_{}", Uuid::now_v7())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        assert!(new_account_id().starts_with("acct_"));
        assert!(new_event_id().starts_with("evt_"));
        assert!(new_send_id().starts_with("send_"));
        assert!(new_schedule_id().starts_with("sched_"));
        assert!(new_agent_id().starts_with("agent_"));
        assert!(new_rule_id().starts_with("rule_"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_event_id(), new_event_id());
    }
}
