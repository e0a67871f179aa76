//! Database initialization for the relational recall store

pub mod init;

pub use init::*;
