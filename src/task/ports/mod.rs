//! Port contracts for the task relay.
//!
//! Ports define infrastructure-agnostic interfaces used by the submit,
//! reconciliation, and query services.

pub mod channel;
pub mod ledger;
pub mod pricing;
pub mod store;

pub use channel::{
    Channel, ChannelDirectory, ChannelDirectoryError, ChannelDirectoryResult, ChannelStatus,
};
pub use ledger::{
    ConsumeContext, ConsumeLogEntry, QuotaLedger, QuotaLedgerError, QuotaLedgerResult,
};
#[cfg(test)]
pub use pricing::MockPricingResolver;
pub use pricing::PricingResolver;
pub use store::{TaskFieldUpdate, TaskQuery, TaskStore, TaskStoreError, TaskStoreResult};
