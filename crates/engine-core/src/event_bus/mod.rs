pub mod bus;
pub mod listener;

pub use bus::EventBus;
