// src/track/filter.rs
//! Acceptance rules for incoming fixes

use crate::{
    geo::haversine_distance,
    gps::data::{RawFix, TrackPoint},
};
use serde::{Deserialize, Serialize};

/// Decides whether a raw fix may enter the track.
///
/// Low-accuracy fixes are discarded outright, never smoothed. A fix farther
/// than `max_jump_m` from the last accepted point is treated as a GPS
/// teleport; with sparse fixes this also drops genuine fast movement, which
/// is accepted as the price of a clean track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleFilter {
    pub max_accuracy_m: f64,
    pub max_jump_m: f64,
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self {
            max_accuracy_m: 50.0,
            max_jump_m: 100.0,
        }
    }
}

impl SampleFilter {
    pub fn new(max_accuracy_m: f64, max_jump_m: f64) -> Self {
        Self {
            max_accuracy_m,
            max_jump_m,
        }
    }

    pub fn accept(&self, candidate: &RawFix, last_accepted: Option<&TrackPoint>) -> bool {
        if !candidate.coordinate().is_valid() {
            return false;
        }

        if let Some(accuracy) = candidate.accuracy {
            if accuracy.is_nan() || accuracy > self.max_accuracy_m {
                return false;
            }
        }

        match last_accepted {
            Some(last) => haversine_distance(last.coordinate(), candidate.coordinate()) <= self.max_jump_m,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, longitude: f64) -> TrackPoint {
        TrackPoint::from_fix(&RawFix::new(latitude, longitude, 0), 0.0)
    }

    #[test]
    fn test_low_accuracy_rejected_regardless_of_history() {
        let filter = SampleFilter::default();
        let fix = RawFix::new(0.0, 0.0, 0).with_accuracy(200.0);
        assert!(!filter.accept(&fix, None));
        assert!(!filter.accept(&fix, Some(&point(0.0, 0.0))));
    }

    #[test]
    fn test_accuracy_threshold_is_inclusive() {
        let filter = SampleFilter::default();
        assert!(filter.accept(&RawFix::new(0.0, 0.0, 0).with_accuracy(50.0), None));
        assert!(!filter.accept(&RawFix::new(0.0, 0.0, 0).with_accuracy(50.1), None));
        assert!(!filter.accept(&RawFix::new(0.0, 0.0, 0).with_accuracy(f64::NAN), None));
    }

    #[test]
    fn test_missing_accuracy_accepted() {
        let filter = SampleFilter::default();
        assert!(filter.accept(&RawFix::new(0.0, 0.0, 0), None));
    }

    #[test]
    fn test_jump_rejected() {
        let filter = SampleFilter::default();
        assert!(!filter.accept(&RawFix::new(1.0, 1.0, 0), Some(&point(0.0, 0.0))));
    }

    #[test]
    fn test_short_step_accepted() {
        let filter = SampleFilter::default();
        // ~55 m north
        assert!(filter.accept(&RawFix::new(0.0005, 0.0, 0), Some(&point(0.0, 0.0))));
    }

    #[test]
    fn test_invalid_coordinates_rejected() {
        let filter = SampleFilter::default();
        assert!(!filter.accept(&RawFix::new(f64::NAN, 0.0, 0), None));
        assert!(!filter.accept(&RawFix::new(95.0, 0.0, 0), None));
    }
}
