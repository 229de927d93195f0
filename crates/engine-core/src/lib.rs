pub mod error;
pub mod event_bus;
pub mod metrics;
pub mod monitor;
pub mod retry;
pub mod state;
