//! # courier-runtime
//!
//! The pipeline workers that sit between the gateway crates and storage:
//!
//! - [`consumer::Consumer`] — drains the event broker, persisting and
//!   reacting to inbound events in per-account order.
//! - [`dispatcher::Dispatcher`] — decides and sends automated replies.
//! - [`scheduler::ScheduleWorker`] — fires due scheduled sends on a fixed
//!   poll interval.
//! - [`cron`] — the five-field cron expressions recurring schedules use.

#![deny(unsafe_code)]

pub mod consumer;
pub mod cron;
pub mod dispatcher;
pub mod scheduler;

pub use consumer::Consumer;
pub use cron::{CronParseError, CronSchedule};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use scheduler::{ScheduleWorker, TickStats};
