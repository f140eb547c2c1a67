// Public API for integration tests and potential library usage

pub mod abuse;
pub mod api;
pub mod assignment;
pub mod auth;
pub mod config;
pub mod error;
pub mod exchange;
pub mod protocol;
pub mod store;
pub mod types;
