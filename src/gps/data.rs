// src/gps/data.rs
//! Positional data structures shared by samplers and the track pipeline

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Finite and inside the WGS84 latitude/longitude ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Format coordinate for display
    pub fn format(&self) -> String {
        format!("{:.6}°, {:.6}°", self.latitude, self.longitude)
    }
}

/// A single positional reading as produced by a location source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,          // ms since epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,   // meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,      // m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,    // degrees, as reported by the source
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy: None,
            speed: None,
            heading: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// An accepted fix as stored in the session track.
///
/// `heading` is the bearing from the previously accepted point, never the
/// value reported by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl TrackPoint {
    pub fn from_fix(fix: &RawFix, heading: f64) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            timestamp: fix.timestamp,
            accuracy: fix.accuracy,
            speed: fix.speed,
            heading: Some(heading),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Timestamp as a UTC date, if it is representable
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Whether the host granted access to location data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        *self == PermissionStatus::Granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(-7.797068, 110.370529).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::NAN).is_valid());
        assert!(!Coordinate::new(0.0, -180.5).is_valid());
    }

    #[test]
    fn test_raw_fix_json_shape() {
        let fix = RawFix::new(48.117, 11.517, 1_700_000_000_000).with_accuracy(4.5);
        let json = serde_json::to_string(&fix).unwrap();
        assert!(json.contains("\"accuracy\":4.5"));
        assert!(!json.contains("speed"));

        let parsed: RawFix = serde_json::from_str(r#"{"latitude":1.0,"longitude":2.0,"timestamp":5}"#).unwrap();
        assert_eq!(parsed.accuracy, None);
        assert_eq!(parsed.timestamp, 5);
    }

    #[test]
    fn test_track_point_time() {
        let fix = RawFix::new(0.0, 0.0, 1_700_000_000_000);
        let point = TrackPoint::from_fix(&fix, 90.0);
        assert_eq!(point.heading, Some(90.0));
        assert_eq!(point.time().unwrap().timestamp(), 1_700_000_000);
    }
}
