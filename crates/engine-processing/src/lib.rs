pub mod error;
pub mod executor;
pub mod fault;
pub mod retry;
pub mod transform;
pub mod writer;
