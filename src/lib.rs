//! Bidplay: header-bidding and video ad playback orchestration
//!
//! Library interface for the binary, benchmarks and integration tests.
//! The binary entry point is in main.rs.

pub mod ad;
pub mod auction;
pub mod config;
pub mod content;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod server;
pub mod session;
