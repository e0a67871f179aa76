//! Shared test helpers for recall-agent integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod log_capture;

pub use fakes::*;
pub use log_capture::{capture_logs, LogCapture};
