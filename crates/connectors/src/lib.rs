pub mod error;
pub mod mongo;
pub mod probe;
pub mod reader;
pub mod sql;
pub mod writer;
