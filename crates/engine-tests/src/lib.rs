#![allow(dead_code)]

pub mod fakes;
pub mod utils;

mod executor;
mod runtime;
