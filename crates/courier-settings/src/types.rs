//! Settings type definitions.
//!
//! Every section has serde defaults so a partial settings file deep-merges
//! cleanly over the compiled defaults.

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierSettings {
    /// Settings schema version.
    pub version: String,
    /// Instance name, used in log output.
    pub name: String,
    /// Database section.
    pub database: DatabaseSettings,
    /// Remote gateway section.
    pub gateway: GatewaySettings,
    /// Reconnect backoff section.
    pub reconnect: ReconnectSettings,
    /// Event queue section.
    pub queue: QueueSettings,
    /// Event consumer section.
    pub consumer: ConsumerSettings,
    /// Schedule worker section.
    pub scheduler: SchedulerSettings,
    /// Connection manager section.
    pub manager: ManagerSettings,
    /// Logging section.
    pub logging: LoggingSettings,
}

impl Default for CourierSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "courier".to_string(),
            database: DatabaseSettings::default(),
            gateway: GatewaySettings::default(),
            reconnect: ReconnectSettings::default(),
            queue: QueueSettings::default(),
            consumer: ConsumerSettings::default(),
            scheduler: SchedulerSettings::default(),
            manager: ManagerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// SQLite database location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the database file. `~` is expanded by the daemon.
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "~/.courier/courier.db".to_string(),
        }
    }
}

/// Remote messaging gateway endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Base URL for the HTTP API, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// Streaming handshake timeout.
    pub connect_timeout_secs: u64,
    /// Outbound send timeout.
    pub send_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            connect_timeout_secs: 15,
            send_timeout_secs: 30,
        }
    }
}

/// Supervisor reconnect backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// First retry delay in seconds.
    pub base_secs: u64,
    /// Maximum retry delay in seconds.
    pub cap_secs: u64,
    /// Connected seconds after which backoff resets.
    pub stability_secs: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_secs: 1,
            cap_secs: 60,
            stability_secs: 30,
        }
    }
}

/// Event queue behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Delivery attempts before a message is dead-lettered.
    pub max_delivery_attempts: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 5,
        }
    }
}

/// Event consumer worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    /// Concurrent consumer workers. Partitions bind workers, so two events
    /// for one account never process concurrently regardless of this value.
    pub workers: usize,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Schedule worker cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Seconds between due-item polls.
    pub poll_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
        }
    }
}

/// Connection manager cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Seconds between reconcile passes against the account registry.
    pub reconcile_interval_secs: u64,
    /// Grace period for supervisor shutdown before tasks are abandoned.
    pub shutdown_grace_secs: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 60,
            shutdown_grace_secs: 5,
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
