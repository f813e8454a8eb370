pub mod audit;
pub mod config;
pub mod daemon;
pub mod dns;
pub mod error;
pub mod ip;
pub mod reconcile;
pub mod secrets;
