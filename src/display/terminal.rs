// src/display/terminal.rs
//! Terminal recording screen

use crate::{
    error::{RecorderError, Result},
    live_map::LiveMapModel,
    metrics::MetricsPresenter,
    recorder::{RecorderHandle, RecorderStatus},
    session::{CompletedSession, SessionState},
};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};
use tokio::{sync::mpsc, time::sleep};

const REFRESH: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    TogglePause,
    Stop,
    Quit,
}

fn key_action(key: KeyEvent) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('p') | KeyCode::Char(' ') => Some(KeyAction::TogglePause),
        KeyCode::Char('s') => Some(KeyAction::Stop),
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Live dashboard for one recording: metrics, map marker and key controls.
pub struct TerminalDisplay {
    title: String,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self {
            title: "Activity Recorder".to_string(),
        }
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }

    /// Run until the session is stopped (`s`) or the user quits (`q`).
    ///
    /// Returns the completed session when one was stopped from this screen.
    pub async fn run(&self, recorder: RecorderHandle, map: Arc<RwLock<LiveMapModel>>) -> Result<Option<CompletedSession>> {
        let mut stdout = io::stdout();
        terminal::enable_raw_mode().map_err(RecorderError::Io)?;
        execute!(stdout, Hide, DisableLineWrap).map_err(RecorderError::Io)?;

        let running = Arc::new(AtomicBool::new(true));
        let mut keys = spawn_key_reader(Arc::clone(&running));
        let result = self.event_loop(&mut stdout, &recorder, &map, &mut keys).await;
        running.store(false, Ordering::Relaxed);

        execute!(stdout, Show, EnableLineWrap).map_err(RecorderError::Io)?;
        terminal::disable_raw_mode().map_err(RecorderError::Io)?;
        println!();
        result
    }

    async fn event_loop(
        &self,
        stdout: &mut impl Write,
        recorder: &RecorderHandle,
        map: &Arc<RwLock<LiveMapModel>>,
        keys: &mut mpsc::UnboundedReceiver<KeyAction>,
    ) -> Result<Option<CompletedSession>> {
        let mut message: Option<String> = None;

        loop {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0)).map_err(RecorderError::Io)?;
            let status = recorder.status();
            let model = map.read().unwrap_or_else(PoisonError::into_inner).clone();
            self.render_display(stdout, &status, &model, message.as_deref())?;
            stdout.flush().map_err(RecorderError::Io)?;

            let action = tokio::select! {
                action = keys.recv() => action,
                _ = sleep(REFRESH) => continue,
            };

            match action {
                Some(KeyAction::TogglePause) => {
                    message = recorder.toggle_pause().await.err().map(|e| e.to_string());
                }
                Some(KeyAction::Stop) => match recorder.stop().await {
                    Ok(session) => return Ok(Some(session)),
                    Err(e) => message = Some(e.to_string()),
                },
                Some(KeyAction::Quit) | None => {
                    if matches!(recorder.status().state, SessionState::Running | SessionState::Paused) {
                        return recorder.stop().await.map(Some);
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn render_display(
        &self,
        stdout: &mut impl Write,
        status: &RecorderStatus,
        map: &LiveMapModel,
        message: Option<&str>,
    ) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\r\n"),
            Print(&self.title),
            Print("\r\n"),
            Print("=".repeat(60)),
            Print("\r\n"),
            ResetColor
        )
        .map_err(RecorderError::Io)?;

        execute!(
            stdout,
            Print(format!("Source: {}\r\n\r\n", status.source))
        )
        .map_err(RecorderError::Io)?;

        self.render_session_section(stdout, status)?;
        self.render_map_section(stdout, map, status.point_count)?;

        if let Some(message) = message {
            execute!(
                stdout,
                SetForegroundColor(Color::Red),
                Print(format!("{}\r\n\r\n", message)),
                ResetColor
            )
            .map_err(RecorderError::Io)?;
        }

        let pause_label = if status.state == SessionState::Paused { "resume" } else { "pause" };
        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\r\n"),
            Print(format!("[p] {}  [s] stop  [q] quit\r\n", pause_label)),
            ResetColor
        )
        .map_err(RecorderError::Io)?;

        Ok(())
    }

    fn render_session_section(&self, stdout: &mut impl Write, status: &RecorderStatus) -> Result<()> {
        let display = MetricsPresenter::present(&status.metrics);
        let (state_color, state_label) = state_style(status.state);

        execute!(
            stdout,
            SetForegroundColor(Color::Yellow),
            Print("SESSION:\r\n"),
            ResetColor,
            Print("  State:     "),
            SetForegroundColor(state_color),
            Print(format!("{}\r\n", state_label)),
            ResetColor
        )
        .map_err(RecorderError::Io)?;

        execute!(
            stdout,
            Print(format!("  Duration:  {:>12}\r\n", display.duration)),
            Print(format!("  Distance:  {:>12} km\r\n", display.distance_km)),
            Print(format!("  Speed:     {:>12} km/h\r\n", display.speed_kmh)),
            Print(format!("  Pace:      {:>12} /km\r\n\r\n", display.pace))
        )
        .map_err(RecorderError::Io)?;

        Ok(())
    }

    fn render_map_section(&self, stdout: &mut impl Write, map: &LiveMapModel, point_count: usize) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Cyan),
            Print("MAP:\r\n"),
            ResetColor
        )
        .map_err(RecorderError::Io)?;

        let position = map
            .current_position
            .map_or_else(|| "No fix".to_string(), |p| p.format());
        execute!(
            stdout,
            Print(format!("  Position:  {}\r\n", position)),
            Print(format!(
                "  Heading:   {} {:>6.1}°\r\n",
                map.heading_arrow(),
                map.current_heading
            )),
            Print(format!("  Points:    {:>12}\r\n", point_count))
        )
        .map_err(RecorderError::Io)?;

        if let Some(start) = map.start_position() {
            execute!(stdout, Print(format!("  Start:     {}\r\n", start.format()))).map_err(RecorderError::Io)?;
        }

        let tracking = if map.is_tracking { "tracking" } else { "idle" };
        execute!(stdout, Print(format!("  Marker:    {:>12}\r\n\r\n", tracking))).map_err(RecorderError::Io)?;
        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

fn state_style(state: SessionState) -> (Color, &'static str) {
    match state {
        SessionState::Idle => (Color::DarkGrey, "IDLE"),
        SessionState::Running => (Color::Green, "RECORDING"),
        SessionState::Paused => (Color::Yellow, "PAUSED"),
        SessionState::Stopped => (Color::Red, "STOPPED"),
    }
}

/// Blocking crossterm reader on its own thread, forwarding recognised keys
fn spawn_key_reader(running: Arc<AtomicBool>) -> mpsc::UnboundedReceiver<KeyAction> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {
                    if let Ok(Event::Key(key)) = event::read() {
                        if let Some(action) = key_action(key) {
                            if tx.send(action).is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Terminal input error: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gps::data::{Coordinate, RawFix, TrackPoint},
        live_map::LiveMapView,
        session::SessionMetrics,
    };

    fn status(state: SessionState) -> RecorderStatus {
        RecorderStatus {
            state,
            metrics: SessionMetrics {
                distance_meters: 2500.0,
                duration_seconds: 750,
                current_speed_mps: 3.0,
            },
            point_count: 2,
            source: "gpsd".to_string(),
        }
    }

    #[test]
    fn test_key_actions() {
        let press = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(key_action(press(KeyCode::Char('p'))), Some(KeyAction::TogglePause));
        assert_eq!(key_action(press(KeyCode::Char('s'))), Some(KeyAction::Stop));
        assert_eq!(key_action(press(KeyCode::Char('q'))), Some(KeyAction::Quit));
        assert_eq!(key_action(press(KeyCode::Char('x'))), None);
        assert_eq!(
            key_action(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(KeyAction::Quit)
        );
    }

    #[test]
    fn test_render_display() {
        let mut map = LiveMapModel::centered_on(Coordinate::new(-7.797068, 110.370529));
        map.on_tracking_changed(true);
        map.on_point(&TrackPoint::from_fix(&RawFix::new(-7.797, 110.37, 0), 0.0));
        map.on_point(&TrackPoint::from_fix(&RawFix::new(-7.797, 110.3701, 3000), 90.0));

        let mut out = Vec::new();
        TerminalDisplay::new()
            .render_display(&mut out, &status(SessionState::Paused), &map, Some("Location permission denied"))
            .unwrap();
        let text = String::from_utf8_lossy(&out);

        assert!(text.contains("PAUSED"));
        assert!(text.contains("12:30"));
        assert!(text.contains("2.50 km"));
        assert!(text.contains("10.8 km/h"));
        assert!(text.contains("5:00 /km"));
        assert!(text.contains("→"));
        assert!(text.contains("Location permission denied"));
        assert!(text.contains("[p] resume"));
    }
}
