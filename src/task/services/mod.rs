//! Application services: submission, reconciliation, queries and the
//! synchronous pass-through relay.

mod passthrough;
mod ports;
mod query;
mod reconcile;
mod submit;

pub use passthrough::{PassThroughReceipt, PassThroughService};
pub use ports::RelayPorts;
pub use query::{DEFAULT_PAGE_SIZE, Page, TaskDto, TaskQueryService};
pub use reconcile::{
    CycleReport, DEFAULT_BATCH_SIZE, IntervalTicker, PendingCompensations, ReconcileError,
    ReconciliationService, Ticker,
};
pub use submit::{SubmitReceipt, TaskSubmitService};
