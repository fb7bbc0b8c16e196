// src/track/accumulator.rs
//! Incremental track building: distance, heading and current speed

use super::filter::SampleFilter;
use crate::{
    geo::{bearing, haversine_distance},
    gps::data::{RawFix, TrackPoint},
};

pub type SubscriptionId = u64;

type Subscriber = Box<dyn FnMut(&TrackPoint) + Send>;

/// Owns the session track and its running distance/speed.
///
/// Each accepted fix costs O(1): only the previous point is consulted and
/// distance is a running sum.
pub struct TrackAccumulator {
    filter: SampleFilter,
    track: Vec<TrackPoint>,
    distance_meters: f64,
    current_speed_mps: f64,
    frozen: bool,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: SubscriptionId,
}

impl TrackAccumulator {
    pub fn new(filter: SampleFilter) -> Self {
        Self {
            filter,
            track: Vec::new(),
            distance_meters: 0.0,
            current_speed_mps: 0.0,
            frozen: false,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Start a fresh track. Subscribers are kept.
    pub fn reset(&mut self) {
        self.track.clear();
        self.distance_meters = 0.0;
        self.current_speed_mps = 0.0;
        self.frozen = false;
    }

    /// Make the track read-only until the next `reset`
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Try to add a fix. Returns the stored point, or `None` when the fix was
    /// filtered out or the track is frozen. Rejected fixes are not retried.
    pub fn append(&mut self, fix: &RawFix) -> Option<TrackPoint> {
        if self.frozen || !self.filter.accept(fix, self.track.last()) {
            return None;
        }

        let point = match self.track.last() {
            Some(last) => {
                let from = last.coordinate();
                let to = fix.coordinate();
                let increment = haversine_distance(from, to);
                self.distance_meters += increment;

                self.current_speed_mps = match fix.speed {
                    Some(speed) if speed.is_finite() && speed >= 0.0 => speed,
                    _ => {
                        let elapsed_ms = fix.timestamp - last.timestamp;
                        if elapsed_ms > 0 {
                            increment / (elapsed_ms as f64 / 1000.0)
                        } else {
                            self.current_speed_mps
                        }
                    }
                };

                TrackPoint::from_fix(fix, bearing(from, to))
            }
            None => {
                if let Some(speed) = fix.speed.filter(|s| s.is_finite() && *s >= 0.0) {
                    self.current_speed_mps = speed;
                }
                TrackPoint::from_fix(fix, 0.0)
            }
        };

        self.track.push(point.clone());
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&point);
        }

        Some(point)
    }

    /// Register a listener for accepted points
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&TrackPoint) + Send + 'static,
    {
        self.next_subscription += 1;
        self.subscribers.push((self.next_subscription, Box::new(callback)));
        self.next_subscription
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    pub fn track(&self) -> &[TrackPoint] {
        &self.track
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    pub fn current_speed_mps(&self) -> f64 {
        self.current_speed_mps
    }
}

impl Default for TrackAccumulator {
    fn default() -> Self {
        Self::new(SampleFilter::default())
    }
}
