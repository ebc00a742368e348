// Row models for the billing tables

pub mod billing;

pub use billing::*;
