//! Database implementations

pub mod aggregate_repository;
pub mod event_repository;
pub mod manager;
pub mod retry;

pub use aggregate_repository::*;
pub use event_repository::*;
pub use manager::*;
pub use retry::*;
