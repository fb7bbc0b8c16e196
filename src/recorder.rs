// src/recorder.rs
//! Async runtime around the session controller

use crate::{
    error::{RecorderError, Result},
    gps::sampler::FixReceiver,
    session::{CompletedSession, SessionController, SessionMetrics, SessionState, Transition},
};
use serde::Serialize;
use std::time::Duration;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};

/// Duration timer period
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot published after every command, fix and timer tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub state: SessionState,
    pub metrics: SessionMetrics,
    pub point_count: usize,
    pub source: String,
}

impl RecorderStatus {
    fn capture(controller: &SessionController) -> Self {
        Self {
            state: controller.state(),
            metrics: controller.metrics(),
            point_count: controller.track().len(),
            source: controller.sampler_name().to_string(),
        }
    }
}

type Reply = oneshot::Sender<Result<Option<CompletedSession>>>;

struct Command {
    transition: Transition,
    reply: Reply,
}

/// Cloneable front end of a running recorder.
#[derive(Clone)]
pub struct RecorderHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<RecorderStatus>,
}

impl RecorderHandle {
    pub async fn start(&self) -> Result<()> {
        self.request(Transition::Start).await.map(|_| ())
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Transition::Pause).await.map(|_| ())
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(Transition::Resume).await.map(|_| ())
    }

    pub async fn stop(&self) -> Result<CompletedSession> {
        self.request(Transition::Stop)
            .await?
            .ok_or_else(|| RecorderError::Other("stop produced no session".to_string()))
    }

    /// Pause when running, resume when paused
    pub async fn toggle_pause(&self) -> Result<()> {
        match self.status().state {
            SessionState::Paused => self.resume().await,
            _ => self.pause().await,
        }
    }

    pub fn status(&self) -> RecorderStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.status.clone()
    }

    async fn request(&self, transition: Transition) -> Result<Option<CompletedSession>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command { transition, reply })
            .await
            .map_err(|_| RecorderError::Other("recorder is not running".to_string()))?;
        response
            .await
            .map_err(|_| RecorderError::Other("recorder dropped the request".to_string()))?
    }
}

/// Spawn the task that owns `controller`.
///
/// The task ends once every handle is dropped; an active session is stopped
/// first and the controller is returned from the join handle.
pub fn spawn_recorder(controller: SessionController, fixes: FixReceiver) -> (RecorderHandle, JoinHandle<SessionController>) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (status_tx, status_rx) = watch::channel(RecorderStatus::capture(&controller));

    let task = tokio::spawn(run(controller, fixes, command_rx, status_tx));
    let handle = RecorderHandle {
        commands: command_tx,
        status: status_rx,
    };
    (handle, task)
}

async fn run(
    mut controller: SessionController,
    mut fixes: FixReceiver,
    mut commands: mpsc::Receiver<Command>,
    status: watch::Sender<RecorderStatus>,
) -> SessionController {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command { transition, reply }) => {
                    let result = apply(&mut controller, transition);
                    if let Err(ref e) = result {
                        log::warn!("{}", e);
                    }
                    // Callers see the new state as soon as the reply arrives
                    publish(&status, &controller);
                    let _ = reply.send(result);
                }
                None => break,
            },
            Some(envelope) = fixes.recv() => {
                controller.on_fix(envelope);
            }
            _ = ticker.tick() => {
                controller.tick_now();
            }
        }

        publish(&status, &controller);
    }

    if matches!(controller.state(), SessionState::Running | SessionState::Paused) {
        log::info!("Recorder shutting down, stopping active session");
        if let Err(e) = controller.stop() {
            log::warn!("{}", e);
        }
    }
    controller
}

fn publish(status: &watch::Sender<RecorderStatus>, controller: &SessionController) {
    status.send_if_modified(|current| {
        let next = RecorderStatus::capture(controller);
        let changed = *current != next;
        *current = next;
        changed
    });
}

fn apply(controller: &mut SessionController, transition: Transition) -> Result<Option<CompletedSession>> {
    match transition {
        Transition::Start => controller.start().map(|_| None),
        Transition::Pause => controller.pause().map(|_| None),
        Transition::Resume => controller.resume().map(|_| None),
        Transition::Stop => controller.stop().map(Some),
    }
}
