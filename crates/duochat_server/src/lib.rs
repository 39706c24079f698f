#![forbid(unsafe_code)]

//! Aggregated Twitch + YouTube chat feed served over QUIC.

pub mod adapters;
pub mod config;
pub mod feed;
pub mod quic;
pub mod server;
pub mod util;
