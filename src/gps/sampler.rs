// src/gps/sampler.rs
//! Location source abstraction and the fix delivery channel

use super::data::{Coordinate, PermissionStatus, RawFix};
use crate::{
    error::{RecorderError, Result},
    geo::haversine_distance,
};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;

/// Default timeout for a one-shot position request
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(10);

/// A fix tagged with the subscription that produced it.
///
/// `seq` numbers deliveries across all subscriptions of one channel, starting at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleEnvelope {
    pub epoch: u64,
    pub seq: u64,
    pub fix: RawFix,
}

pub type FixReceiver = mpsc::UnboundedReceiver<SampleEnvelope>;

/// Sending half handed to a sampler for the lifetime of one subscription.
#[derive(Debug, Clone)]
pub struct FixSink {
    epoch: u64,
    delivered: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<SampleEnvelope>,
}

impl FixSink {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queue a fix; returns false once the receiving side is gone
    pub fn deliver(&self, fix: RawFix) -> bool {
        let seq = self.delivered.fetch_add(1, Ordering::AcqRel) + 1;
        self.tx.send(SampleEnvelope { epoch: self.epoch, seq, fix }).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Hands out one `FixSink` per subscription, each with a fresh epoch.
#[derive(Debug)]
pub struct FixChannel {
    tx: mpsc::UnboundedSender<SampleEnvelope>,
    epoch: u64,
    delivered: Arc<AtomicU64>,
}

/// Create a fix channel and its single receiver
pub fn fix_channel() -> (FixChannel, FixReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let channel = FixChannel {
        tx,
        epoch: 0,
        delivered: Arc::new(AtomicU64::new(0)),
    };
    (channel, rx)
}

impl FixChannel {
    /// Open a new subscription. Envelopes from earlier ones become stale.
    pub fn subscribe(&mut self) -> FixSink {
        self.epoch += 1;
        FixSink {
            epoch: self.epoch,
            delivered: Arc::clone(&self.delivered),
            tx: self.tx.clone(),
        }
    }

    /// Sequence number of the latest delivery through any sink (0 before the first)
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Epoch of the most recent subscription (0 before the first)
    pub fn current_epoch(&self) -> u64 {
        self.epoch
    }
}

/// A continuous location source.
///
/// `start` must not block: sources that talk to devices or daemons spawn a
/// task on the current tokio runtime and deliver through the sink.
pub trait GeoSampler: Send {
    /// Human readable source name for status output
    fn name(&self) -> &str;

    fn permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    /// Begin a subscription. Fails with `PermissionDenied` when access was not granted.
    fn start(&mut self, sink: FixSink) -> Result<()>;

    /// Cancel the subscription. Safe to call when not started.
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Requested delivery cadence for sources that do not throttle on their own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingPolicy {
    pub min_interval_ms: u64,
    pub min_displacement_m: f64,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            min_interval_ms: 3000,
            min_displacement_m: 5.0,
        }
    }
}

/// Drops fixes that arrive too soon or too close to the last forwarded one.
#[derive(Debug, Clone)]
pub struct Throttle {
    policy: SamplingPolicy,
    last: Option<RawFix>,
}

impl Throttle {
    pub fn new(policy: SamplingPolicy) -> Self {
        Self { policy, last: None }
    }

    /// Returns true when the fix should be forwarded
    pub fn admit(&mut self, fix: &RawFix) -> bool {
        if let Some(ref last) = self.last {
            let elapsed = fix.timestamp.saturating_sub(last.timestamp);
            if elapsed < self.policy.min_interval_ms as i64 {
                return false;
            }
            let moved = haversine_distance(last.coordinate(), fix.coordinate());
            if moved < self.policy.min_displacement_m {
                return false;
            }
        }
        self.last = Some(fix.clone());
        true
    }
}

/// One-shot position for centering a map without continuous tracking.
///
/// Subscribes, waits for the first valid fix and unsubscribes again.
pub async fn current_position(sampler: &mut dyn GeoSampler, timeout: Duration) -> Result<Coordinate> {
    if !sampler.permission().is_granted() {
        return Err(RecorderError::PermissionDenied);
    }

    let (mut channel, mut rx) = fix_channel();
    let sink = channel.subscribe();
    // Only the sampler may keep the channel open, so a finished source ends the wait
    drop(channel);

    sampler.start(sink)?;
    log::debug!("Waiting up to {:?} for a fix from {}", timeout, sampler.name());

    let first = tokio::time::timeout(timeout, async {
        while let Some(envelope) = rx.recv().await {
            let coordinate = envelope.fix.coordinate();
            if coordinate.is_valid() {
                return Some(coordinate);
            }
        }
        None
    })
    .await;

    sampler.stop();

    match first {
        Ok(Some(coordinate)) => Ok(coordinate),
        Ok(None) => {
            log::warn!("{} ended without producing a fix", sampler.name());
            Err(RecorderError::LocationUnavailable)
        }
        Err(_) => {
            log::warn!("No fix from {} within {:?}", sampler.name(), timeout);
            Err(RecorderError::LocationUnavailable)
        }
    }
}

/// Spawn handle for samplers that need the ambient tokio runtime
pub(crate) fn runtime_handle(source: &str) -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current()
        .map_err(|_| RecorderError::Other(format!("{} requires a running tokio runtime", source)))
}
