pub mod chunk;
pub mod document;
pub mod row;
