// src/live_map.rs
//! Boundary towards the live map renderer

use crate::gps::data::{Coordinate, TrackPoint};
use std::sync::{Arc, PoisonError, RwLock};

/// Receives live track updates for drawing a route polyline and a rotated
/// position marker. Called on every accepted sample and on every session
/// transition.
pub trait LiveMapView: Send {
    /// A new session started: forget the previous route
    fn on_reset(&mut self);

    fn on_point(&mut self, point: &TrackPoint);

    fn on_tracking_changed(&mut self, is_tracking: bool);
}

/// Renderer-agnostic state of the live map.
#[derive(Debug, Clone, Default)]
pub struct LiveMapModel {
    pub track: Vec<Coordinate>,
    pub current_position: Option<Coordinate>,
    pub current_heading: f64,
    pub is_tracking: bool,
}

impl LiveMapModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model centered on a position before any recording, e.g. a one-shot
    /// fix or the fallback coordinate when permission was denied
    pub fn centered_on(position: Coordinate) -> Self {
        Self {
            current_position: Some(position),
            ..Self::default()
        }
    }

    pub fn start_position(&self) -> Option<Coordinate> {
        self.track.first().copied()
    }

    /// A polyline needs at least two vertices
    pub fn has_route(&self) -> bool {
        self.track.len() > 1
    }

    /// Marker direction as one of eight compass arrows
    pub fn heading_arrow(&self) -> char {
        const ARROWS: [char; 8] = ['↑', '↗', '→', '↘', '↓', '↙', '←', '↖'];
        let sector = ((self.current_heading.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
        ARROWS[sector]
    }
}

impl LiveMapView for LiveMapModel {
    fn on_reset(&mut self) {
        self.track.clear();
        self.current_heading = 0.0;
    }

    fn on_point(&mut self, point: &TrackPoint) {
        let position = point.coordinate();
        self.track.push(position);
        self.current_position = Some(position);
        self.current_heading = point.heading.unwrap_or(0.0);
    }

    fn on_tracking_changed(&mut self, is_tracking: bool) {
        self.is_tracking = is_tracking;
    }
}

/// Shared view: the controller writes, a renderer reads snapshots
impl<M: LiveMapView + Send + Sync> LiveMapView for Arc<RwLock<M>> {
    fn on_reset(&mut self) {
        self.write().unwrap_or_else(PoisonError::into_inner).on_reset();
    }

    fn on_point(&mut self, point: &TrackPoint) {
        self.write().unwrap_or_else(PoisonError::into_inner).on_point(point);
    }

    fn on_tracking_changed(&mut self, is_tracking: bool) {
        self.write()
            .unwrap_or_else(PoisonError::into_inner)
            .on_tracking_changed(is_tracking);
    }
}
