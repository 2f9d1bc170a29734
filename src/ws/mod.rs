//! WebSocket client
//!
//! Reconnecting client used by the live price feed: bounded attempt
//! budget, doubling backoff, ping keepalive.

mod client;
mod types;

pub use client::WsClient;
pub use types::{WsConfig, WsError, WsMessage};
