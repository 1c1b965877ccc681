//! KALE Missions: crisis missions for the Stellar ecosystem.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod soroban;
pub mod contracts;
pub mod monitor;
pub mod storage;
pub mod board;
pub mod price;
pub mod dashboard;
pub mod ops;
