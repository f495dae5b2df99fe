//! Step definitions for task reconciliation scenarios.

mod given;
mod then;
mod when;
pub mod world;
