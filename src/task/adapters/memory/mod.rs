//! In-memory adapters for tests and single-process deployments.

mod channel;
mod ledger;
mod pricing;
mod store;

pub use channel::InMemoryChannelDirectory;
pub use ledger::{InMemoryQuotaLedger, PostedCharge, UsageCounter};
pub use pricing::{PricingTable, StaticPricing};
pub use store::InMemoryTaskStore;
