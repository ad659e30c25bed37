//! # courier-store
//!
//! SQLite persistence for the Courier pipeline.
//!
//! Layout:
//!
//! - [`connection`] — r2d2 connection pool with per-connection pragmas
//! - [`migrations`] — versioned schema, applied at startup
//! - [`repositories`] — stateless row-level CRUD, every method takes `&Connection`
//! - [`store`] — the high-level [`store::Store`]: pooled, write-serialized
//!   per account, BUSY-retrying, exposing the operations the workers need
//!   (dedup insert, ack application, schedule claiming)
//!
//! ## Crate Position
//!
//! Persistence layer. Consumed by `courier-runtime` and `courier-daemon`;
//! never touched by supervisors (they only publish to the queue).

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod row;
pub mod store;

pub use errors::{Result, StoreError};
pub use store::{AckOutcome, RecordOutcome, Store};
