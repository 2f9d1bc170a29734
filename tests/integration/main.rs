//! Integration tests for predictor-engine

mod engine_test;
mod feed_test;
mod ledger_test;
mod session_test;
