#![forbid(unsafe_code)]

pub mod engine;
pub mod enrichment;
pub mod hub;
pub mod rank;
pub mod sanitize;
pub mod store;

pub use engine::{AggregationEngine, FeedConfig};
pub use hub::{FeedItem, FeedRx};

#[cfg(test)]
mod engine_tests;

#[cfg(test)]
mod enrichment_tests;

#[cfg(test)]
mod hub_tests;


#[cfg(test)]
mod sanitize_tests;

#[cfg(test)]
mod store_tests;
