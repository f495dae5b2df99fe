//! Adapter implementations of the task relay ports.

pub mod memory;
pub mod postgres;
