// Public API for integration tests and potential library usage

pub mod ai;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod repo;
pub mod rooms;
pub mod store;
pub mod types;
pub mod ws;
