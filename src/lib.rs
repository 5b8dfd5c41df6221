// src/lib.rs
pub mod config;
pub mod utils;
pub mod pipelines;
pub mod cli;
pub mod manifest;
pub mod executor;
pub use cli::{Arguments, RunMode};
