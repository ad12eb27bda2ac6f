//! vidsplit - split uploaded videos into fixed-duration segments
//!
//! This library crate exposes the service for the binary and for
//! integration testing.

pub mod config;
pub mod processor;
pub mod server;
pub mod state;
