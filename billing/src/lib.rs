//! Metered subscription billing service.
//!
//! Plans bundle features with per-feature billing terms; subscriptions bind a
//! user to a plan with a fee snapshot; usage is appended against plan
//! features and aggregated into per-period charges.

pub mod errors;
pub mod handlers;
pub mod services;
