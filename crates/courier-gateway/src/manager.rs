//! Connection manager — owns the set of per-account supervisors.
//!
//! All mutation goes through `reconcile` and `shutdown`, serialized by an
//! internal lock, so the at-most-one-supervisor-per-account invariant holds
//! even under concurrent callers. Status reads are lock-free.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use courier_core::retry::ReconnectPolicy;
use courier_queue::EventBroker;
use dashmap::DashMap;
use metrics::gauge;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::GatewayClient;
use crate::supervisor::{self, ConnectionHealth, SupervisorHandle};

/// Connectivity as reported to callers, including accounts the manager does
/// not currently supervise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake in progress (or reconnect pending).
    Connecting,
    /// Streaming connection established.
    Connected,
    /// No live connection.
    Disconnected,
    /// No supervisor exists for the account.
    Unknown,
}

impl From<ConnectionHealth> for ConnectionStatus {
    fn from(health: ConnectionHealth) -> Self {
        match health {
            ConnectionHealth::Connecting => Self::Connecting,
            ConnectionHealth::Connected => Self::Connected,
            ConnectionHealth::Disconnected => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Unknown => "unknown",
        })
    }
}

/// Supervisor lifecycle owner for all managed accounts.
pub struct ConnectionManager {
    supervisors: DashMap<String, SupervisorHandle>,
    client: Arc<GatewayClient>,
    broker: Arc<EventBroker>,
    policy: ReconnectPolicy,
    // Serializes reconcile/shutdown. Without it, two overlapping reconciles
    // could both observe an account as absent and spawn twice.
    reconcile_lock: Mutex<()>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("supervisors", &self.supervisors.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Build a manager with no supervisors.
    #[must_use]
    pub fn new(
        client: Arc<GatewayClient>,
        broker: Arc<EventBroker>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            supervisors: DashMap::new(),
            client,
            broker,
            policy,
            reconcile_lock: Mutex::new(()),
        }
    }

    /// Converge the running set to `desired`: spawn supervisors for new
    /// account ids, stop supervisors whose account left the set, leave the
    /// rest untouched. Idempotent — reconciling an unchanged set is a no-op.
    pub async fn reconcile<I>(&self, desired: I)
    where
        I: IntoIterator<Item = String>,
    {
        let _guard = self.reconcile_lock.lock().await;
        let desired: HashSet<String> = desired.into_iter().collect();

        let stale: Vec<String> = self
            .supervisors
            .iter()
            .filter(|entry| !desired.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for account_id in stale {
            if let Some((_, handle)) = self.supervisors.remove(&account_id) {
                info!(account_id, "stopping supervisor: account left the active set");
                handle.stop().await;
            }
        }

        for account_id in desired {
            if self.supervisors.contains_key(&account_id) {
                continue;
            }
            info!(account_id, "starting supervisor");
            let handle = supervisor::spawn(
                account_id.clone(),
                Arc::clone(&self.client),
                Arc::clone(&self.broker),
                self.policy,
            );
            if self.supervisors.insert(account_id, handle).is_some() {
                // Unreachable while reconcile holds the lock; kept as a
                // tripwire for future mutation paths.
                warn!("replaced an existing supervisor during reconcile");
            }
        }

        gauge!("courier_supervisors_active").set(self.supervisors.len() as f64);
    }

    /// Connectivity for one account. `Unknown` when no supervisor exists.
    #[must_use]
    pub fn status(&self, account_id: &str) -> ConnectionStatus {
        self.supervisors
            .get(account_id)
            .map_or(ConnectionStatus::Unknown, |entry| entry.status().into())
    }

    /// Account ids with a running supervisor.
    #[must_use]
    pub fn supervised_accounts(&self) -> Vec<String> {
        self.supervisors
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Stop every supervisor, waiting up to `grace` for each to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        let _guard = self.reconcile_lock.lock().await;
        let accounts: Vec<String> = self
            .supervisors
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        // Signal everyone first so shutdowns overlap instead of serializing.
        for entry in &self.supervisors {
            entry.value().signal_stop();
        }
        for account_id in accounts {
            if let Some((_, handle)) = self.supervisors.remove(&account_id) {
                if tokio::time::timeout(grace, handle.stop()).await.is_err() {
                    warn!(account_id, "supervisor did not stop within the grace period");
                }
            }
        }
        gauge!("courier_supervisors_active").set(0.0);
        info!("connection manager shut down");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
