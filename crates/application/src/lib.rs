//! Application layer: ports the infrastructure layer implements and the
//! pipeline's middleware composition contract. No I/O of its own.

pub mod context;
pub mod ports;

pub use context::RequestContext;
