//! PROPEDGE: player-prop odds consensus and EV/Kelly sizing engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod odds;
pub mod payouts;
pub mod strategy;
pub mod feeds;
pub mod storage;
