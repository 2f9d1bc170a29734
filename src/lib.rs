//! predictor-engine: timed up/down prediction rounds on a live BTC price
//!
//! This library provides the core components for:
//! - Real-time price feed from Binance with a synthetic fallback
//! - Round state machine with anti-cheat betting close
//! - Guest and wallet-linked sessions
//! - Lock-protected durable ledger with write-behind
//! - Periodic maintenance (idle sweep, snapshots, compaction)
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod feed;
pub mod ledger;
pub mod maintenance;
pub mod round;
pub mod session;
pub mod telemetry;
pub mod ws;
