//! Response dispatcher.
//!
//! Decides whether one inbound message gets an automated reply. Ignore
//! rules are evaluated first in scope order (contact, group, keyword); then
//! the account's enabled agents are filtered and consulted in priority
//! order. At most one agent produces a reply, which is recorded as an
//! outbound send and pushed through the gateway. Strategy failures are
//! logged and treated as silence — a broken agent never blocks the event
//! pipeline.

use std::sync::Arc;

use courier_agents::build_strategy;
use courier_core::errors::Result;
use courier_core::event::InboundEvent;
use courier_core::rule::{IgnoreRule, IgnoreScope};
use courier_core::send::SendOrigin;
use courier_gateway::GatewayClient;
use courier_store::Store;
use metrics::counter;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

/// What the dispatcher did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An ignore rule matched; no agent was consulted.
    Suppressed {
        /// The matching rule.
        rule_id: String,
    },
    /// No agent produced a response.
    Silent,
    /// A reply was sent and accepted by the gateway.
    Responded {
        /// The recorded outbound send.
        send_id: String,
    },
    /// A reply was produced but the gateway rejected it; the send is
    /// terminally failed and the event is considered handled.
    SendFailed {
        /// The recorded outbound send.
        send_id: String,
    },
}

/// Per-message response decision engine.
pub struct Dispatcher {
    store: Arc<Store>,
    client: Arc<GatewayClient>,
}

impl Dispatcher {
    /// Build a dispatcher over the shared store and gateway client.
    #[must_use]
    pub fn new(store: Arc<Store>, client: Arc<GatewayClient>) -> Self {
        Self { store, client }
    }

    /// Handle one persisted inbound message.
    #[instrument(skip(self, event), fields(account_id = %event.account_id, event_id = %event.id))]
    pub async fn dispatch(&self, event: &InboundEvent) -> Result<DispatchOutcome> {
        if let Some(rule) = self.matching_ignore_rule(event)? {
            debug!(
                event_id = %event.id,
                rule_id = %rule.id,
                scope = %rule.scope,
                "event suppressed by ignore rule"
            );
            counter!("courier_dispatch_suppressed_total").increment(1);
            return Ok(DispatchOutcome::Suppressed { rule_id: rule.id });
        }

        let Some(response) = self.decide_response(event).await? else {
            return Ok(DispatchOutcome::Silent);
        };

        self.send_response(event, &response).await
    }

    /// First ignore rule matching the event, in scope order. The repository
    /// already returns rules sorted contact → group → keyword.
    fn matching_ignore_rule(&self, event: &InboundEvent) -> Result<Option<IgnoreRule>> {
        let rules = self.store.list_ignore_rules(&event.account_id)?;
        for rule in rules {
            let matched = match rule.scope {
                IgnoreScope::Contact => rule.pattern == event.sender,
                IgnoreScope::Group => event.is_group_chat && rule.pattern == event.chat,
                IgnoreScope::Keyword => match Regex::new(&rule.pattern) {
                    Ok(regex) => regex.is_match(&event.body),
                    Err(err) => {
                        warn!(rule_id = %rule.id, error = %err, "unusable keyword pattern skipped");
                        false
                    }
                },
            };
            if matched {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    /// Consult agents in priority order; the first response wins.
    async fn decide_response(&self, event: &InboundEvent) -> Result<Option<String>> {
        let agents = self.store.list_enabled_agents(&event.account_id)?;
        for agent in agents {
            if agent.ignore_group_chats && event.is_group_chat {
                continue;
            }
            if !agent.allows_sender(&event.sender) {
                continue;
            }

            let strategy = match build_strategy(&agent) {
                Ok(strategy) => strategy,
                Err(err) => {
                    warn!(agent_id = %agent.id, error = %err, "unusable agent config skipped");
                    continue;
                }
            };
            match strategy.respond(event).await {
                Ok(Some(response)) => {
                    debug!(agent_id = %agent.id, event_id = %event.id, "agent responded");
                    return Ok(Some(response));
                }
                Ok(None) => return Ok(None),
                Err(err) => {
                    // Strategy failure is contained to this event; later
                    // events consult the agent again.
                    let err = err.into_dispatch(&event.id);
                    warn!(agent_id = %agent.id, error = %err, "agent failed");
                    counter!("courier_dispatch_agent_failures_total").increment(1);
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    /// Record the reply and push it through the gateway. The reply goes back
    /// into the conversation the message arrived in.
    async fn send_response(&self, event: &InboundEvent, body: &str) -> Result<DispatchOutcome> {
        let send = self
            .store
            .enqueue_send(&event.account_id, &event.chat, body, SendOrigin::Agent)?;

        match self
            .client
            .send_message(&event.account_id, &event.chat, body)
            .await
        {
            Ok(external_id) => {
                let _ = self.store.mark_send_sent(&send.id, &external_id)?;
                info!(send_id = %send.id, external_id, "agent reply sent");
                counter!("courier_dispatch_responses_total").increment(1);
                Ok(DispatchOutcome::Responded { send_id: send.id })
            }
            Err(err) => {
                // Failed sends are terminal; there is no automatic retry.
                warn!(send_id = %send.id, error = %err, "agent reply rejected by gateway");
                let _ = self.store.mark_send_failed(&send.id, &err.to_string())?;
                Ok(DispatchOutcome::SendFailed { send_id: send.id })
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_core::agent::AgentKind;
    use courier_core::event::EventKind;
    use courier_core::ids;
    use courier_core::send::SendStatus;
    use courier_gateway::GatewayConfig;
    use courier_store::repositories::agents::CreateAgentOptions;
    use courier_store::repositories::ignore_rules::CreateIgnoreRuleOptions;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn gateway_accepting_sends() -> (MockServer, Arc<GatewayClient>) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/messages/send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message_id": "EXT1"
            })))
            .mount(&server)
            .await;
        let client = Arc::new(
            GatewayClient::new(GatewayConfig {
                base_url: server.uri(),
                username: "admin".into(),
                password: "secret".into(),
                connect_timeout: Duration::from_secs(2),
                send_timeout: Duration::from_secs(2),
            })
            .unwrap(),
        );
        (server, client)
    }

    fn setup() -> (Arc<Store>, String) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let account = store.create_account("Test").unwrap();
        (store, account.id)
    }

    fn message(account_id: &str, sender: &str, chat: &str, body: &str) -> InboundEvent {
        InboundEvent {
            id: ids::new_event_id(),
            account_id: account_id.to_string(),
            external_id: ids::new_event_id(),
            sender: sender.to_string(),
            chat: chat.to_string(),
            body: body.to_string(),
            kind: EventKind::Message,
            is_group_chat: chat.ends_with("@g.us"),
            received_at: Utc::now(),
        }
    }

    fn greeter_agent(store: &Store, account_id: &str, priority: i64) -> String {
        store
            .create_agent(&CreateAgentOptions {
                account_id,
                kind: AgentKind::RuleBased,
                config: &json!({"rules": [{"pattern": "hi|hello", "response": "Welcome!"}]}),
                allowed_senders: &[],
                ignore_group_chats: false,
                priority,
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn greeting_gets_a_welcome_reply() {
        let (_server, client) = gateway_accepting_sends().await;
        let (store, account_id) = setup();
        let _ = greeter_agent(&store, &account_id, 0);
        let dispatcher = Dispatcher::new(Arc::clone(&store), client);

        let outcome = dispatcher
            .dispatch(&message(&account_id, "alice@host", "alice@host", "hello there"))
            .await
            .unwrap();

        let DispatchOutcome::Responded { send_id } = outcome else {
            panic!("expected a reply, got {outcome:?}");
        };
        let send = store.get_send(&send_id).unwrap().unwrap();
        assert_eq!(send.body, "Welcome!");
        assert_eq!(send.recipient, "alice@host");
        assert_eq!(send.origin, SendOrigin::Agent);
        assert_eq!(send.status, SendStatus::Sent);
        assert_eq!(send.external_id.as_deref(), Some("EXT1"));
    }

    #[tokio::test]
    async fn ignored_contact_gets_no_reply_but_event_flow_continues() {
        let (_server, client) = gateway_accepting_sends().await;
        let (store, account_id) = setup();
        let _ = greeter_agent(&store, &account_id, 0);
        let rule = store
            .create_ignore_rule(&CreateIgnoreRuleOptions {
                account_id: &account_id,
                scope: IgnoreScope::Contact,
                pattern: "spammer@host",
            })
            .unwrap();
        let dispatcher = Dispatcher::new(store, client);

        let outcome = dispatcher
            .dispatch(&message(&account_id, "spammer@host", "spammer@host", "hello"))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Suppressed { rule_id: rule.id });
    }

    #[tokio::test]
    async fn group_scope_only_suppresses_group_chats() {
        let (_server, client) = gateway_accepting_sends().await;
        let (store, account_id) = setup();
        let _ = greeter_agent(&store, &account_id, 0);
        let _ = store
            .create_ignore_rule(&CreateIgnoreRuleOptions {
                account_id: &account_id,
                scope: IgnoreScope::Group,
                pattern: "noisy@g.us",
            })
            .unwrap();
        let dispatcher = Dispatcher::new(store, client);

        let in_group = dispatcher
            .dispatch(&message(&account_id, "alice@host", "noisy@g.us", "hello"))
            .await
            .unwrap();
        assert!(matches!(in_group, DispatchOutcome::Suppressed { .. }));

        // Same pattern in a direct chat does not suppress.
        let direct = dispatcher
            .dispatch(&message(&account_id, "noisy@g.us", "noisy@g.us", "hello"))
            .await
            .unwrap();
        assert!(matches!(direct, DispatchOutcome::Responded { .. }));
    }

    #[tokio::test]
    async fn keyword_scope_matches_body_regex() {
        let (_server, client) = gateway_accepting_sends().await;
        let (store, account_id) = setup();
        let _ = greeter_agent(&store, &account_id, 0);
        let _ = store
            .create_ignore_rule(&CreateIgnoreRuleOptions {
                account_id: &account_id,
                scope: IgnoreScope::Keyword,
                pattern: r"(?i)unsubscribe",
            })
            .unwrap();
        let dispatcher = Dispatcher::new(store, client);

        let outcome = dispatcher
            .dispatch(&message(&account_id, "a@host", "a@host", "hello, UNSUBSCRIBE me"))
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Suppressed { .. }));
    }

    #[tokio::test]
    async fn highest_priority_matching_agent_wins() {
        let (_server, client) = gateway_accepting_sends().await;
        let (store, account_id) = setup();
        let _ = store
            .create_agent(&CreateAgentOptions {
                account_id: &account_id,
                kind: AgentKind::RuleBased,
                config: &json!({"rules": [{"pattern": "hello", "response": "from the backup"}]}),
                allowed_senders: &[],
                ignore_group_chats: false,
                priority: 10,
            })
            .unwrap();
        let _ = store
            .create_agent(&CreateAgentOptions {
                account_id: &account_id,
                kind: AgentKind::RuleBased,
                config: &json!({"rules": [{"pattern": "hello", "response": "from the primary"}]}),
                allowed_senders: &[],
                ignore_group_chats: false,
                priority: 1,
            })
            .unwrap();
        let dispatcher = Dispatcher::new(Arc::clone(&store), client);

        let outcome = dispatcher
            .dispatch(&message(&account_id, "a@host", "a@host", "hello"))
            .await
            .unwrap();
        let DispatchOutcome::Responded { send_id } = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(store.get_send(&send_id).unwrap().unwrap().body, "from the primary");
    }

    #[tokio::test]
    async fn agent_filters_exclude_groups_and_unlisted_senders() {
        let (_server, client) = gateway_accepting_sends().await;
        let (store, account_id) = setup();
        let _ = store
            .create_agent(&CreateAgentOptions {
                account_id: &account_id,
                kind: AgentKind::RuleBased,
                config: &json!({"rules": [{"pattern": "hello", "response": "hi"}]}),
                allowed_senders: &["vip@host".to_string()],
                ignore_group_chats: true,
                priority: 0,
            })
            .unwrap();
        let dispatcher = Dispatcher::new(store, client);

        let from_group = dispatcher
            .dispatch(&message(&account_id, "vip@host", "team@g.us", "hello"))
            .await
            .unwrap();
        assert_eq!(from_group, DispatchOutcome::Silent);

        let from_stranger = dispatcher
            .dispatch(&message(&account_id, "nobody@host", "nobody@host", "hello"))
            .await
            .unwrap();
        assert_eq!(from_stranger, DispatchOutcome::Silent);

        let from_vip = dispatcher
            .dispatch(&message(&account_id, "vip@host", "vip@host", "hello"))
            .await
            .unwrap();
        assert!(matches!(from_vip, DispatchOutcome::Responded { .. }));
    }

    #[tokio::test]
    async fn generative_failure_is_swallowed() {
        let (_server, client) = gateway_accepting_sends().await;
        let (store, account_id) = setup();
        // Endpoint that always errors.
        let _ = store
            .create_agent(&CreateAgentOptions {
                account_id: &account_id,
                kind: AgentKind::Generative,
                config: &json!({
                    "endpoint": "http://127.0.0.1:9/v1/complete",
                    "model": "gpt-x",
                    "timeout_secs": 1
                }),
                allowed_senders: &[],
                ignore_group_chats: false,
                priority: 0,
            })
            .unwrap();
        let dispatcher = Dispatcher::new(store, client);

        let outcome = dispatcher
            .dispatch(&message(&account_id, "a@host", "a@host", "hello"))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Silent);
    }

    #[tokio::test]
    async fn rejected_send_is_terminally_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/messages/send"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;
        let client = Arc::new(
            GatewayClient::new(GatewayConfig {
                base_url: server.uri(),
                username: "admin".into(),
                password: "secret".into(),
                connect_timeout: Duration::from_secs(2),
                send_timeout: Duration::from_secs(2),
            })
            .unwrap(),
        );

        let (store, account_id) = setup();
        let _ = greeter_agent(&store, &account_id, 0);
        let dispatcher = Dispatcher::new(Arc::clone(&store), client);

        let outcome = dispatcher
            .dispatch(&message(&account_id, "a@host", "a@host", "hello"))
            .await
            .unwrap();
        let DispatchOutcome::SendFailed { send_id } = outcome else {
            panic!("expected a failed send, got {outcome:?}");
        };
        let send = store.get_send(&send_id).unwrap().unwrap();
        assert_eq!(send.status, SendStatus::Failed);
        assert!(send.error.is_some());
    }
}
