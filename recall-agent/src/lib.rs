//! recall-agent library
//!
//! Polls a public recall feed, keeps each recall exactly once in a dedup
//! store, and alerts on newly stored recalls by email or SMS. The binary in
//! `main.rs` wires these modules to the command line.

pub mod composer;
pub mod context;
pub mod demo;
pub mod normalizer;
pub mod notify;
pub mod poll;
pub mod services;
pub mod store;

pub use context::AppContext;
pub use poll::{PollDriver, PollError, PollReport};
pub use store::{DedupStore, RecallBackend, StoreError};

/// Version, commit and build time, for the startup log line
pub fn build_info() -> String {
    format!(
        "recall-agent {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    )
}
