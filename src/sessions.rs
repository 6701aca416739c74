// src/sessions.rs
//
// Session controller: the state machine tying port catalog, device link,
// frame parsing and recording together under the periodic scheduler.
//
// Timer invariants:
// - CatalogRefresh runs iff Disconnected
// - DeviceRead runs iff Connected
// - RecordingAppend runs iff a recording is active (either connection state)
//
// The controller is single-owner and synchronous. `spawn_session` runs it on
// a dedicated blocking thread, fed by a command channel.

use serde::Serialize;
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use crate::catalog::{PortCatalog, PortSnapshot, SelectFault};
use crate::events::{EventEmitter, SessionEvent};
use crate::frame::{parse_frame, Measurement, ParseFault};
use crate::io::{Backend, ConnectFault, DeviceLink, LinkConfig, PortId, ReadTransportFault, Transport};
use crate::recording::{RecordingFault, RecordingSession, SinkFactory, SinkFault};
use crate::scheduler::{Clock, TickScheduler, TimerKind};

// ============================================================================
// Types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Cadences of the periodic tasks and visibility of transient messages.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionTiming {
    pub read_interval: Duration,
    pub save_interval: Duration,
    pub catalog_refresh_interval: Duration,
    pub info_message: Duration,
    pub error_message: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        SessionTiming {
            read_interval: Duration::from_millis(100),
            save_interval: Duration::from_secs(1),
            catalog_refresh_interval: Duration::from_secs(5),
            info_message: Duration::from_secs(1),
            error_message: Duration::from_secs(3),
        }
    }
}

/// Requests from the presentation side.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    SelectPort(PortId),
    RefreshPorts,
    Connect,
    Disconnect,
    ToggleConnection,
    StartRecording,
    StopRecording,
    ToggleRecording,
    Shutdown,
}

// ============================================================================
// Controller
// ============================================================================

pub struct SessionController {
    timing: SessionTiming,
    link_config: LinkConfig,
    catalog: PortCatalog,
    transport: Box<dyn Transport>,
    link: Option<DeviceLink>,
    last_measurement: Option<Measurement>,
    sink_factory: Box<dyn SinkFactory>,
    recording: Option<RecordingSession>,
    scheduler: TickScheduler,
    clock: Box<dyn Clock>,
    events: EventEmitter,
}

impl SessionController {
    /// Starts Disconnected with the port list refreshed right away and the
    /// refresh timer running.
    pub fn new(
        timing: SessionTiming,
        link_config: LinkConfig,
        backend: Backend,
        sink_factory: Box<dyn SinkFactory>,
        clock: Box<dyn Clock>,
        events: EventEmitter,
    ) -> Self {
        let mut controller = SessionController {
            timing,
            link_config,
            catalog: PortCatalog::new(backend.enumerator),
            transport: backend.transport,
            link: None,
            last_measurement: None,
            sink_factory,
            recording: None,
            scheduler: TickScheduler::new(),
            clock,
            events,
        };

        controller.refresh_catalog();
        controller.schedule_catalog_refresh();
        controller
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        if self.link.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn connected_port(&self) -> Option<&PortId> {
        self.link.as_ref().map(|link| link.port())
    }

    pub fn last_measurement(&self) -> Option<&Measurement> {
        self.last_measurement.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn catalog(&self) -> &PortCatalog {
        &self.catalog
    }

    pub fn active_timers(&self) -> Vec<TimerKind> {
        self.scheduler.active()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    // ------------------------------------------------------------------------
    // Port catalog
    // ------------------------------------------------------------------------

    pub fn refresh_catalog(&mut self) -> PortSnapshot {
        let snapshot = self.catalog.refresh();
        self.events.emit(SessionEvent::CatalogChanged {
            snapshot: snapshot.clone(),
        });
        snapshot
    }

    pub fn select_port(&mut self, port: &PortId) -> Result<(), SelectFault> {
        let snapshot = self.catalog.select(port)?;
        log::info!("Selected port {}", port);
        self.events.emit(SessionEvent::CatalogChanged { snapshot });
        Ok(())
    }

    fn schedule_catalog_refresh(&mut self) {
        let period = self.timing.catalog_refresh_interval;
        let first_due = self.clock.now() + period;
        self.scheduler
            .schedule(TimerKind::CatalogRefresh, period, first_due);
    }

    // ------------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------------

    /// Open a link to the selected port.
    pub fn connect(&mut self) -> Result<(), ConnectFault> {
        if let Some(port) = self.connected_port() {
            return Err(ConnectFault::AlreadyConnected(port.clone()));
        }

        let port = match self.catalog.selected() {
            Some(port) => port.clone(),
            None => {
                self.events
                    .message("Error", "Select a port to connect", self.timing.error_message);
                return Err(ConnectFault::NoPortSelected);
            }
        };

        let link = match DeviceLink::open(self.transport.as_ref(), &port, &self.link_config) {
            Ok(link) => link,
            Err(fault) => {
                log::warn!("Connection to {} failed: {}", port, fault);
                self.events.message(
                    "Error",
                    format!("Connection failed: {}", fault),
                    self.timing.error_message,
                );
                return Err(fault);
            }
        };
        self.link = Some(link);

        let now = self.clock.now();
        self.scheduler.cancel(TimerKind::CatalogRefresh);
        self.scheduler.schedule(
            TimerKind::DeviceRead,
            self.timing.read_interval,
            now + self.timing.read_interval,
        );

        log::info!("Connected to {}", port);
        self.events.emit(SessionEvent::ConnectionStateChanged {
            state: ConnectionState::Connected,
            port: Some(port),
            fault: None,
        });
        self.events
            .message("Scale", "Connected", self.timing.info_message);
        Ok(())
    }

    /// Close the link on request. No-op when already disconnected.
    pub fn disconnect(&mut self) {
        self.teardown_link(None);
    }

    pub fn toggle_connection(&mut self) -> Result<ConnectionState, ConnectFault> {
        match self.state() {
            ConnectionState::Connected => self.disconnect(),
            ConnectionState::Disconnected => self.connect()?,
        }
        Ok(self.state())
    }

    fn teardown_link(&mut self, fault: Option<ReadTransportFault>) {
        let Some(mut link) = self.link.take() else {
            return;
        };
        link.close();

        self.scheduler.cancel(TimerKind::DeviceRead);
        self.schedule_catalog_refresh();

        match &fault {
            Some(fault) => log::warn!("Lost connection to {}: {}", link.port(), fault),
            None => log::info!("Disconnected from {}", link.port()),
        }
        self.events.emit(SessionEvent::ConnectionStateChanged {
            state: ConnectionState::Disconnected,
            port: Some(link.port().clone()),
            fault: fault.map(|f| f.to_string()),
        });
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    /// Rejected without touching the running session if one is active.
    pub fn start_recording(&mut self) -> Result<(), RecordingFault> {
        if self.recording.is_some() {
            return Err(RecordingFault::AlreadyActive);
        }

        let now = self.clock.now();
        let session = match RecordingSession::start(self.sink_factory.as_ref(), now, self.clock.wall()) {
            Ok(session) => session,
            Err(fault) => {
                log::error!("Could not start recording: {}", fault);
                self.events.message(
                    "Error",
                    format!("Recording failed: {}", fault),
                    self.timing.error_message,
                );
                return Err(fault.into());
            }
        };
        let sink = session.sink_name().to_string();
        self.recording = Some(session);

        self.scheduler.schedule(
            TimerKind::RecordingAppend,
            self.timing.save_interval,
            now + self.timing.save_interval,
        );

        self.events.emit(SessionEvent::RecordingStateChanged {
            active: true,
            sink: Some(sink),
        });
        self.events
            .message("Recording", "Recording started", self.timing.info_message);
        Ok(())
    }

    /// Returns false if no recording was running.
    pub fn stop_recording(&mut self) -> bool {
        let Some(session) = self.recording.take() else {
            return false;
        };
        self.scheduler.cancel(TimerKind::RecordingAppend);

        let result = session.stop();

        self.events.emit(SessionEvent::RecordingStateChanged {
            active: false,
            sink: None,
        });
        match result {
            Ok(_) => self
                .events
                .message("Recording", "Recording stopped", self.timing.info_message),
            Err(fault) => {
                log::error!("Recording ended with an error: {}", fault);
                self.events.message(
                    "Error",
                    format!("Recording failed: {}", fault),
                    self.timing.error_message,
                );
            }
        }
        true
    }

    /// Returns whether a recording is active afterwards.
    pub fn toggle_recording(&mut self) -> Result<bool, RecordingFault> {
        if self.stop_recording() {
            return Ok(false);
        }
        self.start_recording()?;
        Ok(true)
    }

    fn abort_recording(&mut self, fault: SinkFault) {
        log::error!("Recording aborted: {}", fault);
        // The sink is already broken, dropping it is all that is left
        self.recording = None;
        self.scheduler.cancel(TimerKind::RecordingAppend);

        self.events.emit(SessionEvent::RecordingStateChanged {
            active: false,
            sink: None,
        });
        self.events.message(
            "Error",
            format!("Recording failed: {}", fault),
            self.timing.error_message,
        );
    }

    // ------------------------------------------------------------------------
    // Ticks
    // ------------------------------------------------------------------------

    /// Fire every timer that is due now. Returns how many fired.
    pub fn run_due_ticks(&mut self) -> usize {
        let due = self.scheduler.take_due(self.clock.now());
        for kind in &due {
            self.on_tick(*kind);
        }
        due.len()
    }

    fn on_tick(&mut self, kind: TimerKind) {
        // A tick can be queued behind one that changed state; skip it if its
        // timer was cancelled meanwhile.
        if !self.scheduler.is_active(kind) {
            return;
        }
        match kind {
            TimerKind::CatalogRefresh => {
                self.refresh_catalog();
            }
            TimerKind::DeviceRead => self.read_tick(),
            TimerKind::RecordingAppend => self.record_tick(),
        }
    }

    fn read_tick(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let result = link.read_line(self.link_config.read_timeout);

        match result {
            Ok(None) => {}
            Ok(Some(line)) => match parse_frame(&line, self.clock.wall()) {
                Ok(measurement) => {
                    log::trace!("Reading {} g", measurement.mass_grams);
                    self.last_measurement = Some(measurement.clone());
                    self.events
                        .emit(SessionEvent::MeasurementUpdated { measurement });
                }
                Err(ParseFault::Malformed { raw_text }) => {
                    log::warn!("Ignoring malformed frame {:?}", raw_text);
                    self.events.emit(SessionEvent::ReadingRejected { raw_text });
                }
            },
            Err(fault) => self.teardown_link(Some(fault)),
        }
    }

    fn record_tick(&mut self) {
        let now = self.clock.now();
        // Zero until the first reading arrives
        let mass_grams = self
            .last_measurement
            .as_ref()
            .map(|m| m.mass_grams)
            .unwrap_or(0.0);

        let Some(session) = self.recording.as_mut() else {
            return;
        };
        let elapsed = session.elapsed(now).as_secs_f64();

        if let Err(fault) = session.append(elapsed, mass_grams) {
            self.abort_recording(fault);
        }
    }

    // ------------------------------------------------------------------------
    // Commands and shutdown
    // ------------------------------------------------------------------------

    /// Apply a command. Returns false once the session should stop.
    /// Failures have already been reported through events.
    pub fn handle(&mut self, command: SessionCommand) -> bool {
        log::debug!("Command {:?}", command);
        match command {
            SessionCommand::SelectPort(port) => {
                if let Err(fault) = self.select_port(&port) {
                    log::warn!("{}", fault);
                    self.events
                        .message("Error", fault.to_string(), self.timing.error_message);
                }
            }
            SessionCommand::RefreshPorts => {
                if self.state() == ConnectionState::Disconnected {
                    self.refresh_catalog();
                }
            }
            SessionCommand::Connect => {
                let _ = self.connect();
            }
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::ToggleConnection => {
                let _ = self.toggle_connection();
            }
            SessionCommand::StartRecording => {
                if let Err(RecordingFault::AlreadyActive) = self.start_recording() {
                    log::debug!("Recording already running");
                }
            }
            SessionCommand::StopRecording => {
                self.stop_recording();
            }
            SessionCommand::ToggleRecording => {
                let _ = self.toggle_recording();
            }
            SessionCommand::Shutdown => return false,
        }
        true
    }

    /// Close whatever is live. Never fails; safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.recording.take() {
            if let Err(fault) = session.stop() {
                log::warn!("{}", fault);
            }
        }
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.scheduler.cancel_all();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Upper bound on how long the loop sleeps when no timer is running
const IDLE_WAIT: Duration = Duration::from_millis(500);

/// Handle to a controller running on its own thread.
pub struct SessionHandle {
    commands: std_mpsc::Sender<SessionCommand>,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) -> Result<(), String> {
        self.commands
            .send(command)
            .map_err(|_| "Session is no longer running".to_string())
    }

    /// Ask the session to stop and wait until it has closed everything.
    pub async fn shutdown(self) -> Result<(), String> {
        let _ = self.commands.send(SessionCommand::Shutdown);
        self.task
            .await
            .map_err(|e| format!("Session task failed: {}", e))
    }
}

/// Run `controller` on the blocking thread pool.
pub fn spawn_session(controller: SessionController) -> SessionHandle {
    let (commands, rx) = std_mpsc::channel();
    let task = tokio::task::spawn_blocking(move || run_session_blocking(controller, rx));
    SessionHandle { commands, task }
}

/// Session loop: sleep until the next deadline or command, dispatch, repeat.
/// Ends on `Shutdown` or when every command sender is gone.
pub fn run_session_blocking(
    mut controller: SessionController,
    commands: std_mpsc::Receiver<SessionCommand>,
) {
    log::debug!("Session loop started");
    loop {
        let wait = controller
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(controller.now()))
            .unwrap_or(IDLE_WAIT);

        match commands.recv_timeout(wait) {
            Ok(command) => {
                if !controller.handle(command) {
                    break;
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }

        controller.run_due_ticks();
    }

    controller.shutdown();
    log::debug!("Session loop stopped");
}
