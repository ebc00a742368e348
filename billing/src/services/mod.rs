pub mod calculator;
pub mod catalog_db;
pub mod charges_db;
pub mod plans_db;
pub mod subscriptions_db;
pub mod usage_db;
