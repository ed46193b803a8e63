#[macro_use]
extern crate tracing;

pub mod config;
pub mod sources;
