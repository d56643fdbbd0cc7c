//! ajax-relay - single-upstream HTTP relay
//!
//! Forwards each inbound request to a fixed upstream host and relays the
//! upstream's response back to the caller.

pub mod config;
pub mod error;
pub mod http;
pub mod proxy;
pub mod server;
