//! Upstream platform adaptors.
//!
//! Every provider is reached through [`TaskAdaptor`]: the submit side turns a
//! caller request into an upstream call and interprets the answer, the fetch
//! side plans and parses status queries for the reconciliation loop. All
//! adaptors share one [`UpstreamClient`].

pub mod adaptor;
pub mod custompass;
pub mod http;
pub mod kling;
mod registry;
pub mod suno;

#[cfg(test)]
mod tests;

pub use adaptor::{
    ClientReply, FetchQuery, InboundRequest, RelayContext, SubmitOutcome, TaskAdaptor, Usage,
};
pub use custompass::CustomPassAdaptor;
pub use http::{FetchError, FetchErrorKind, UpstreamClient, UpstreamRequest, UpstreamResponse};
pub use kling::KlingAdaptor;
pub use registry::AdaptorRegistry;
pub use suno::SunoAdaptor;
