//! CHAINWATCH: multi-chain transaction graph and risk analysis core.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod collectors;
pub mod graph;
pub mod scoring;
pub mod engine;
pub mod dashboard;
