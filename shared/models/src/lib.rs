//! Shared API and domain types for the meterbill services.
//!
//! Everything that crosses the HTTP boundary or is shared between the
//! billing service and the database layer lives here: request/response
//! DTOs, the closed status enums, and the charge breakdown types.

pub mod billing;

pub use billing::*;
