pub mod archive;
pub mod query;
pub mod reader;
pub mod row;
pub mod utils;
