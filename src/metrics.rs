// src/metrics.rs
//! Display formatting for session metrics

use crate::session::SessionMetrics;
use serde::Serialize;

/// Session metrics rendered as display strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayMetrics {
    pub duration: String,
    pub pace: String,
    pub speed_kmh: String,
    pub distance_km: String,
}

/// Stateless formatter from raw metrics to strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsPresenter;

impl MetricsPresenter {
    pub fn present(metrics: &SessionMetrics) -> DisplayMetrics {
        DisplayMetrics {
            duration: format_duration(metrics.duration_seconds),
            pace: format_pace(metrics.duration_seconds, metrics.distance_meters),
            speed_kmh: format!("{:.1}", speed_kmh(metrics.current_speed_mps)),
            distance_km: format!("{:.2}", distance_km(metrics.distance_meters)),
        }
    }
}

/// `H:MM:SS` from one hour on, `M:SS` below
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Average pace per kilometre as `M:SS`.
///
/// Seconds are rounded, so a remainder of 59.5 or more prints as `:60`.
pub fn format_pace(duration_seconds: u64, distance_meters: f64) -> String {
    if distance_meters.is_nan() || distance_meters <= 0.0 {
        return "0:00".to_string();
    }

    let seconds_per_km = duration_seconds as f64 / distance_meters * 1000.0;
    let minutes = (seconds_per_km / 60.0).floor();
    let seconds = (seconds_per_km % 60.0).round();
    format!("{}:{:02}", minutes as u64, seconds as u64)
}

pub fn speed_kmh(speed_mps: f64) -> f64 {
    speed_mps * 3.6
}

pub fn distance_km(distance_meters: f64) -> f64 {
    distance_meters / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3599), "59:59");
        assert_eq!(format_duration(3600), "1:00:00");
        assert_eq!(format_duration(36_061), "10:01:01");
    }

    #[test]
    fn test_format_pace() {
        assert_eq!(format_pace(300, 1000.0), "5:00");
        assert_eq!(format_pace(0, 0.0), "0:00");
        assert_eq!(format_pace(120, 0.0), "0:00");
        assert_eq!(format_pace(330, 1000.0), "5:30");
        assert_eq!(format_pace(1500, 2500.0), "10:00");
    }

    #[test]
    fn test_pace_rounding_can_reach_sixty() {
        // 359.6 s/km
        assert_eq!(format_pace(3596, 10_000.0), "5:60");
    }

    #[test]
    fn test_present() {
        let metrics = SessionMetrics {
            distance_meters: 5234.0,
            duration_seconds: 1820,
            current_speed_mps: 2.9,
        };
        let display = MetricsPresenter::present(&metrics);

        assert_eq!(display.duration, "30:20");
        assert_eq!(display.distance_km, "5.23");
        assert_eq!(display.speed_kmh, "10.4");
        assert_eq!(display.pace, "5:48");
    }

    #[test]
    fn test_present_empty_session() {
        let display = MetricsPresenter::present(&SessionMetrics::default());
        assert_eq!(display.duration, "0:00");
        assert_eq!(display.pace, "0:00");
        assert_eq!(display.speed_kmh, "0.0");
        assert_eq!(display.distance_km, "0.00");
    }
}
