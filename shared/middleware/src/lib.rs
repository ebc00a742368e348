//! Request middleware shared by meterbill services.

pub mod auth;

pub use auth::{Identity, IdentityMiddlewareFactory, Role};
