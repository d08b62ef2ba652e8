//! Streamproxy - transcoding stream proxy for set-top-box recordings
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod encoder;
pub mod server;
pub mod transfer;
