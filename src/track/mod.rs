// src/track/mod.rs
//! Track filtering and accumulation

pub mod accumulator;
pub mod filter;

pub use accumulator::{SubscriptionId, TrackAccumulator};
pub use filter::SampleFilter;
