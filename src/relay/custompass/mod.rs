//! Caller-defined pass-through upstreams.
//!
//! A pass-through channel forwards opaque JSON to `{base}/{model}` and bills
//! either by reported token usage or per call. Models submitted as tasks end
//! in `/submit` and are polled through `{base}/{model}/task/list-by-condition`.

mod adaptor;
pub mod wire;

pub use adaptor::CustomPassAdaptor;
