//! Anti-fraud screening and verifiable winner draws for promo campaign
//! registrations.

pub mod config;
pub mod core;
pub mod database;
pub mod services;
