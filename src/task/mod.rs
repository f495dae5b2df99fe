//! Asynchronous task tracking.
//!
//! Submitted upstream jobs are persisted as [`domain::Task`] records, polled
//! by the reconciliation loop until they reach a terminal state, and refunded
//! when they fail. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
