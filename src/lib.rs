//! deal_scout — Lost Ark auction deal scout.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod marketplace;
pub mod engine;
pub mod status;
