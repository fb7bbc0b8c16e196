//! Activity Recorder Library
//!
//! Live GPS activity recording: location sources, noise filtering,
//! incremental distance/speed/pace metrics and a pause/resume/stop
//! session state machine feeding a live map.

pub mod api;
pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod geo;
pub mod gps;
pub mod live_map;
pub mod metrics;
pub mod recorder;
pub mod session;
pub mod track;

// Re-export main types for convenience
pub use error::{RecorderError, Result};
pub use gps::{Coordinate, GeoSampler, RawFix, TrackPoint};
pub use live_map::{LiveMapModel, LiveMapView};
pub use metrics::MetricsPresenter;
pub use recorder::{spawn_recorder, RecorderHandle, RecorderStatus};
pub use session::{CompletedSession, SessionController, SessionMetrics, SessionState};
pub use track::{SampleFilter, TrackAccumulator};
