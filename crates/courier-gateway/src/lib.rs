//! # courier-gateway
//!
//! Integration with the remote messaging gateway:
//!
//! - [`client::GatewayClient`] — HTTP send primitive and streaming URL builder
//! - [`frames`] — wire-frame parsing and normalization into inbound events
//! - [`supervisor`] — one task per account owning the streaming connection
//!   and its reconnect policy
//! - [`manager::ConnectionManager`] — the supervisor registry with
//!   reconcile/status/shutdown
//!
//! Supervisors never touch persistent storage: their only side effects are
//! queue publications and status transitions, which keeps the ingestion
//! path replayable.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod frames;
pub mod manager;
pub mod supervisor;

pub use client::{GatewayClient, GatewayConfig};
pub use errors::{GatewayError, Result};
pub use manager::{ConnectionManager, ConnectionStatus};
pub use supervisor::{ConnectionHealth, SupervisorHandle};
