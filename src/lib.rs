//! strata-quotes: strata insurance quote comparison.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod documents;
pub mod engine;
pub mod llm;
pub mod money;
pub mod schema;
pub mod storage;
pub mod types;
