// src/gps/push.rs
//! Sampler fed by the host platform's own location callbacks

use super::{
    data::{PermissionStatus, RawFix},
    sampler::{FixSink, GeoSampler},
};
use crate::error::{RecorderError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct PushState {
    permission: PermissionStatus,
    sink: Option<FixSink>,
}

/// A `GeoSampler` whose fixes are pushed in by the embedding application.
///
/// The host keeps a [`PushHandle`], forwards its platform location updates
/// through it and reports the permission outcome. The platform is expected to
/// apply its own interval/displacement throttling.
pub struct PushSampler {
    state: Arc<Mutex<PushState>>,
}

/// Host side of a [`PushSampler`].
#[derive(Clone)]
pub struct PushHandle {
    state: Arc<Mutex<PushState>>,
}

fn lock(state: &Mutex<PushState>) -> MutexGuard<'_, PushState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PushSampler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PushState {
                permission: PermissionStatus::Granted,
                sink: None,
            })),
        }
    }

    pub fn handle(&self) -> PushHandle {
        PushHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for PushSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoSampler for PushSampler {
    fn name(&self) -> &str {
        "Platform location"
    }

    fn permission(&self) -> PermissionStatus {
        lock(&self.state).permission
    }

    fn start(&mut self, sink: FixSink) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.permission.is_granted() {
            return Err(RecorderError::PermissionDenied);
        }
        state.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.state).sink = None;
    }

    fn is_active(&self) -> bool {
        lock(&self.state).sink.is_some()
    }
}

impl PushHandle {
    /// Forward a platform fix. Dropped (returns false) when nobody is subscribed.
    pub fn push(&self, fix: RawFix) -> bool {
        match lock(&self.state).sink {
            Some(ref sink) => sink.deliver(fix),
            None => false,
        }
    }

    /// Record the outcome of the host's permission prompt
    pub fn set_permission(&self, permission: PermissionStatus) {
        let mut state = lock(&self.state);
        state.permission = permission;
        if !permission.is_granted() && state.sink.take().is_some() {
            log::warn!("Location permission revoked during an active subscription");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.state).sink.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::sampler::fix_channel;

    #[test]
    fn test_push_only_while_subscribed() {
        let (mut channel, mut rx) = fix_channel();
        let mut sampler = PushSampler::new();
        let handle = sampler.handle();

        assert!(!handle.push(RawFix::new(1.0, 1.0, 0)));

        sampler.start(channel.subscribe()).unwrap();
        assert!(sampler.is_active());
        assert!(handle.push(RawFix::new(1.0, 1.0, 0)));
        assert_eq!(rx.try_recv().unwrap().epoch, 1);

        sampler.stop();
        sampler.stop();
        assert!(!handle.push(RawFix::new(1.0, 1.0, 0)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_denied_permission_blocks_start() {
        let (mut channel, _rx) = fix_channel();
        let mut sampler = PushSampler::new();
        sampler.handle().set_permission(PermissionStatus::Denied);

        let result = sampler.start(channel.subscribe());
        assert!(matches!(result, Err(RecorderError::PermissionDenied)));
        assert!(!sampler.is_active());
    }

    #[test]
    fn test_revoking_permission_ends_subscription() {
        let (mut channel, _rx) = fix_channel();
        let mut sampler = PushSampler::new();
        let handle = sampler.handle();
        sampler.start(channel.subscribe()).unwrap();

        handle.set_permission(PermissionStatus::Denied);
        assert!(!sampler.is_active());
        assert_eq!(sampler.permission(), PermissionStatus::Denied);
    }
}
