//! # courier-core
//!
//! Foundation types, errors, ids, and utilities for the Courier pipeline.
//!
//! This crate provides the shared vocabulary that all other Courier crates
//! depend on:
//!
//! - **Accounts**: [`account::ManagedAccount`] and its lifecycle status
//! - **Inbound events**: [`event::InboundEvent`] with the normalized event kinds
//! - **Outbound sends**: [`send::OutboundSend`] with monotonic status transitions
//! - **Scheduled sends**: [`schedule::ScheduledSend`] and the claim state machine
//! - **Agents**: [`agent::AgentConfig`] with rule-based and generative variants
//! - **Ignore rules**: [`rule::IgnoreRule`] suppression predicates
//! - **Errors**: [`errors::CourierError`] hierarchy via `thiserror`
//! - **Reconnect**: [`retry::ReconnectPolicy`] backoff with jitter and stability reset
//! - **Ids**: prefixed UUIDv7 generators in [`ids`]
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other courier crates.

#![deny(unsafe_code)]

pub mod account;
pub mod agent;
pub mod errors;
pub mod event;
pub mod ids;
pub mod retry;
pub mod rule;
pub mod schedule;
pub mod send;
