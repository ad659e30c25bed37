//! Stateless row-level repositories.
//!
//! Every method takes `&Connection`; transactions and locking belong to the
//! [`crate::store::Store`] layer above.

pub mod accounts;
pub mod agents;
pub mod events;
pub mod ignore_rules;
pub mod schedules;
pub mod sends;
