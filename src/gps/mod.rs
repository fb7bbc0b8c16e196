// src/gps/mod.rs
//! Location sources and the fix data they produce

pub mod data;
pub mod gpsd;
pub mod nmea;
pub mod push;
pub mod replay;
pub mod sampler;
pub mod serial;

pub use data::{Coordinate, PermissionStatus, RawFix, TrackPoint};
pub use sampler::{current_position, fix_channel, FixReceiver, FixSink, GeoSampler, SamplingPolicy};
