// src/session.rs
//! Recording session state machine

use crate::{
    error::{RecorderError, Result},
    gps::{
        data::{Coordinate, TrackPoint},
        sampler::{fix_channel, FixChannel, FixReceiver, GeoSampler, SampleEnvelope},
    },
    live_map::LiveMapView,
    track::{SampleFilter, SubscriptionId, TrackAccumulator},
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session recorded yet
    Idle,
    /// Recording fixes, duration advancing
    Running,
    /// Duration frozen, no fixes accepted
    Paused,
    /// Finished; track and metrics are read-only until the next start
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Transitions a caller can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Pause,
    Resume,
    Stop,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Start => "start",
            Transition::Pause => "pause",
            Transition::Resume => "resume",
            Transition::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Live numbers of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub distance_meters: f64,
    pub duration_seconds: u64,
    pub current_speed_mps: f64,
}

/// What happens to the location subscription while paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PausePolicy {
    /// Cancel the subscription on pause and restart it on resume
    #[default]
    SuspendSampler,
    /// Keep the subscription alive and drop fixes delivered while paused,
    /// including ones still queued at resume
    GateSamples,
}

/// Wall-clock source in milliseconds since epoch
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for simulations and tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_millis)),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Finalized snapshot of a stopped session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub track: Vec<TrackPoint>,
    pub distance_meters: f64,
    pub duration_seconds: u64,
}

impl CompletedSession {
    pub fn start_location(&self) -> Option<Coordinate> {
        self.track.first().map(TrackPoint::coordinate)
    }

    pub fn end_location(&self) -> Option<Coordinate> {
        self.track.last().map(TrackPoint::coordinate)
    }
}

/// Receives each completed session, e.g. for upload.
pub trait SessionSink: Send {
    fn hand_off(&mut self, session: CompletedSession);
}

impl SessionSink for mpsc::UnboundedSender<CompletedSession> {
    fn hand_off(&mut self, session: CompletedSession) {
        if self.send(session).is_err() {
            log::warn!("Completed session dropped: no receiver");
        }
    }
}

/// Owns one recording at a time and is the only writer of its state.
///
/// All methods take `&mut self`, so transitions are serialized by ownership.
/// The one-second duration timer is modelled by [`SessionController::tick`],
/// which any scheduler can call.
pub struct SessionController {
    state: SessionState,
    sampler: Box<dyn GeoSampler>,
    accumulator: TrackAccumulator,
    clock: Arc<dyn Clock>,
    fixes: FixChannel,
    pause_policy: PausePolicy,
    started_at_ms: i64,
    session_start_ms: i64,
    paused_accumulated_seconds: u64,
    duration_seconds: u64,
    timer_running: bool,
    /// Delivery sequence ranges `(after, up_to]` that arrived while gated
    gated: Vec<(u64, u64)>,
    live_map: Option<Box<dyn LiveMapView>>,
    session_sink: Option<Box<dyn SessionSink>>,
}

impl SessionController {
    /// Create an idle controller and the receiver its sampler delivers to.
    ///
    /// Every envelope from the receiver must be fed back through
    /// [`SessionController::on_fix`].
    pub fn new(sampler: Box<dyn GeoSampler>, filter: SampleFilter, clock: Arc<dyn Clock>) -> (Self, FixReceiver) {
        let (fixes, receiver) = fix_channel();
        let controller = Self {
            state: SessionState::Idle,
            sampler,
            accumulator: TrackAccumulator::new(filter),
            clock,
            fixes,
            pause_policy: PausePolicy::default(),
            started_at_ms: 0,
            session_start_ms: 0,
            paused_accumulated_seconds: 0,
            duration_seconds: 0,
            timer_running: false,
            gated: Vec::new(),
            live_map: None,
            session_sink: None,
        };
        (controller, receiver)
    }

    pub fn with_pause_policy(mut self, policy: PausePolicy) -> Self {
        self.pause_policy = policy;
        self
    }

    pub fn with_live_map(mut self, view: Box<dyn LiveMapView>) -> Self {
        self.live_map = Some(view);
        self
    }

    pub fn with_session_sink(mut self, sink: Box<dyn SessionSink>) -> Self {
        self.session_sink = Some(sink);
        self
    }

    /// Idle/Stopped → Running
    pub fn start(&mut self) -> Result<()> {
        self.ensure(Transition::Start, matches!(self.state, SessionState::Idle | SessionState::Stopped))?;

        if !self.sampler.permission().is_granted() {
            log::warn!("Cannot start recording: location permission denied");
            return Err(RecorderError::PermissionDenied);
        }
        let sink = self.fixes.subscribe();
        self.sampler.start(sink)?;

        self.accumulator.reset();
        let now = self.clock.now_millis();
        self.started_at_ms = now;
        self.session_start_ms = now;
        self.paused_accumulated_seconds = 0;
        self.duration_seconds = 0;
        self.timer_running = true;
        self.gated.clear();
        self.state = SessionState::Running;

        if let Some(view) = self.live_map.as_mut() {
            view.on_reset();
            view.on_tracking_changed(true);
        }
        log::info!("Recording started with {}", self.sampler.name());
        Ok(())
    }

    /// Running → Paused
    pub fn pause(&mut self) -> Result<()> {
        self.ensure(Transition::Pause, self.state == SessionState::Running)?;

        let now = self.clock.now_millis();
        self.duration_seconds = self.duration_seconds.max(self.elapsed_seconds(now));
        self.paused_accumulated_seconds = self.duration_seconds;
        self.timer_running = false;

        match self.pause_policy {
            PausePolicy::SuspendSampler => self.sampler.stop(),
            PausePolicy::GateSamples => {
                let after = self.fixes.delivered();
                self.gated.push((after, after));
            }
        }
        self.state = SessionState::Paused;

        if let Some(view) = self.live_map.as_mut() {
            view.on_tracking_changed(false);
        }
        log::info!("Recording paused at {}s", self.duration_seconds);
        Ok(())
    }

    /// Paused → Running, duration continues where it was frozen
    pub fn resume(&mut self) -> Result<()> {
        self.ensure(Transition::Resume, self.state == SessionState::Paused)?;

        if self.pause_policy == PausePolicy::SuspendSampler {
            if !self.sampler.permission().is_granted() {
                return Err(RecorderError::PermissionDenied);
            }
            let sink = self.fixes.subscribe();
            self.sampler.start(sink)?;
        } else if let Some(window) = self.gated.last_mut() {
            window.1 = self.fixes.delivered();
        }

        let now = self.clock.now_millis();
        self.session_start_ms = now - self.paused_accumulated_seconds as i64 * 1000;
        self.timer_running = true;
        self.state = SessionState::Running;

        if let Some(view) = self.live_map.as_mut() {
            view.on_tracking_changed(true);
        }
        log::info!("Recording resumed");
        Ok(())
    }

    /// Running/Paused → Stopped. The finished session is handed to the
    /// session sink and returned.
    pub fn stop(&mut self) -> Result<CompletedSession> {
        self.ensure(
            Transition::Stop,
            matches!(self.state, SessionState::Running | SessionState::Paused),
        )?;

        let now = self.clock.now_millis();
        if self.state == SessionState::Running {
            self.duration_seconds = self.duration_seconds.max(self.elapsed_seconds(now));
        }
        self.timer_running = false;
        self.sampler.stop();
        self.accumulator.freeze();
        self.state = SessionState::Stopped;

        let session = CompletedSession {
            id: format!("session_{}", self.started_at_ms),
            started_at: to_utc(self.started_at_ms),
            stopped_at: to_utc(now),
            track: self.accumulator.track().to_vec(),
            distance_meters: self.accumulator.distance_meters(),
            duration_seconds: self.duration_seconds,
        };

        if let Some(view) = self.live_map.as_mut() {
            view.on_tracking_changed(false);
        }
        if let Some(sink) = self.session_sink.as_mut() {
            sink.hand_off(session.clone());
        }
        log::info!(
            "Recording stopped: {} points, {:.0} m, {}s",
            session.track.len(),
            session.distance_meters,
            session.duration_seconds
        );
        Ok(session)
    }

    /// Timer step. Recomputes the duration while running; returns the current value.
    pub fn tick(&mut self, now_millis: i64) -> u64 {
        if self.state == SessionState::Running && self.timer_running {
            self.duration_seconds = self.duration_seconds.max(self.elapsed_seconds(now_millis));
        }
        self.duration_seconds
    }

    /// Timer step against the controller's own clock
    pub fn tick_now(&mut self) -> u64 {
        let now = self.clock.now_millis();
        self.tick(now)
    }

    /// Feed one delivered fix. Fixes from an older subscription, delivered
    /// during a gated pause, or arriving while not running are discarded.
    pub fn on_fix(&mut self, envelope: SampleEnvelope) -> Option<TrackPoint> {
        if self.state != SessionState::Running || envelope.epoch != self.fixes.current_epoch() {
            log::debug!("Discarding fix from subscription {} while {}", envelope.epoch, self.state);
            return None;
        }
        if self.delivered_while_paused(envelope.seq) {
            log::debug!("Discarding fix {} delivered while paused", envelope.seq);
            return None;
        }

        let point = self.accumulator.append(&envelope.fix)?;
        if let Some(view) = self.live_map.as_mut() {
            view.on_point(&point);
        }
        Some(point)
    }

    fn delivered_while_paused(&self, seq: u64) -> bool {
        self.gated.iter().any(|&(after, up_to)| seq > after && seq <= up_to)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            distance_meters: self.accumulator.distance_meters(),
            duration_seconds: self.duration_seconds,
            current_speed_mps: self.accumulator.current_speed_mps(),
        }
    }

    pub fn track(&self) -> &[TrackPoint] {
        self.accumulator.track()
    }

    pub fn sampler_name(&self) -> &str {
        self.sampler.name()
    }

    pub fn pause_policy(&self) -> PausePolicy {
        self.pause_policy
    }

    /// Listen for accepted points in addition to the live map
    pub fn subscribe_points<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&TrackPoint) + Send + 'static,
    {
        self.accumulator.subscribe(callback)
    }

    pub fn unsubscribe_points(&mut self, id: SubscriptionId) -> bool {
        self.accumulator.unsubscribe(id)
    }

    fn ensure(&self, action: Transition, allowed: bool) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(RecorderError::InvalidStateTransition {
                from: self.state,
                action,
            })
        }
    }

    fn elapsed_seconds(&self, now_millis: i64) -> u64 {
        ((now_millis - self.session_start_ms).max(0) / 1000) as u64
    }
}

fn to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
}
