//! Shared tracing setup for meterbill services.

pub mod init;

pub use init::{init_tracing, TracingConfig};
