//! Taskrelay: asynchronous task relay for multi-provider AI gateways.
//!
//! Long-running generation jobs (music, video, caller-defined pass-through
//! models) are submitted upstream, persisted as tasks, polled until they
//! finish, and billed: an estimate is checked before the call, the final
//! charge is posted once the upstream accepts, and failed tasks are refunded
//! exactly once.
//!
//! # Architecture
//!
//! Taskrelay follows hexagonal architecture principles:
//!
//! - **Domain**: task records, statuses and the error taxonomy
//! - **Ports**: store, ledger, pricing and channel contracts
//! - **Adapters**: in-memory and `PostgreSQL` implementations
//!
//! # Modules
//!
//! - [`task`]: task domain, ports, adapters and services
//! - [`relay`]: upstream platform adaptors and the shared HTTP client
//! - [`billing`]: quota arithmetic and settlement
//! - [`config`]: relay settings

pub mod billing;
pub mod config;
pub mod relay;
pub mod task;
