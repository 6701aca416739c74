// src/testing.rs
//
// In-memory stand-ins for the serial backend, the recording sink and the
// clock, shared by the unit tests.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::events::{EventEmitter, SessionEvent};
use crate::io::{Backend, LinkConfig, PortEnumerator, PortId, SerialLine, Transport};
use crate::recording::SinkFactory;
use crate::scheduler::{Clock, SystemClock};
use crate::sessions::{SessionController, SessionTiming};

// ============================================================================
// Port enumeration
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeEnumerator {
    ports: Arc<Mutex<Vec<PortId>>>,
}

impl FakeEnumerator {
    pub fn new(ports: &[&str]) -> Self {
        let enumerator = FakeEnumerator::default();
        enumerator.set_ports(ports);
        enumerator
    }

    pub fn set_ports(&self, ports: &[&str]) {
        *self.ports.lock().unwrap() = ports.iter().map(|p| PortId::from(*p)).collect();
    }
}

impl PortEnumerator for FakeEnumerator {
    fn list_ports(&self) -> Result<Vec<PortId>, String> {
        Ok(self.ports.lock().unwrap().clone())
    }
}

pub struct FailingEnumerator;

impl PortEnumerator for FailingEnumerator {
    fn list_ports(&self) -> Result<Vec<PortId>, String> {
        Err("enumeration not permitted".to_string())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// One scripted outcome of a read call.
#[derive(Clone, Debug)]
pub enum FakeRead {
    Data(Vec<u8>),
    Timeout,
    Error(ErrorKind),
    Eof,
}

#[derive(Default)]
struct TransportState {
    script: VecDeque<FakeRead>,
    open_error: Option<String>,
    close_fails: bool,
    opens: usize,
    closes: usize,
}

/// Scripted transport. Reads pop the script front; an empty script times out.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self, reason: &str) {
        self.state.lock().unwrap().open_error = Some(reason.to_string());
    }

    pub fn push(&self, read: FakeRead) {
        self.state.lock().unwrap().script.push_back(read);
    }

    pub fn fail_close(&self) {
        self.state.lock().unwrap().close_fails = true;
    }

    /// Successful opens only
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

impl Transport for FakeTransport {
    fn open(&self, _port: &PortId, _config: &LinkConfig) -> Result<Box<dyn SerialLine>, String> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.open_error {
            return Err(reason.clone());
        }
        state.opens += 1;
        Ok(Box::new(FakeLine {
            state: self.state.clone(),
        }))
    }
}

struct FakeLine {
    state: Arc<Mutex<TransportState>>,
}

impl SerialLine for FakeLine {
    fn read_bytes(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        match state.script.pop_front() {
            Some(FakeRead::Data(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    state.script.push_front(FakeRead::Data(bytes[n..].to_vec()));
                }
                Ok(n)
            }
            Some(FakeRead::Error(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(FakeRead::Eof) => Ok(0),
            Some(FakeRead::Timeout) | None => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        if state.close_fails {
            return Err(io::Error::new(ErrorKind::Other, "scripted close failure"));
        }
        Ok(())
    }
}

// ============================================================================
// Recording sinks
// ============================================================================

/// Sink writing into a shared buffer. Each open truncates it, like a file.
#[derive(Clone, Default)]
pub struct MemorySinkFactory {
    buffer: Arc<Mutex<Vec<u8>>>,
    failing: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
    }

    /// Every write from now on fails, including on sinks already open
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open_sink(&self) -> io::Result<Box<dyn Write + Send>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.buffer.lock().unwrap().clear();
        Ok(Box::new(MemorySink {
            buffer: self.buffer.clone(),
            failing: self.failing.clone(),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
    failing: Arc<AtomicBool>,
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(ErrorKind::Other, "disk full"));
        }
        self.buffer.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(ErrorKind::Other, "disk full"));
        }
        Ok(())
    }
}

pub struct FailingSinkFactory;

impl SinkFactory for FailingSinkFactory {
    fn open_sink(&self) -> io::Result<Box<dyn Write + Send>> {
        Err(io::Error::new(ErrorKind::PermissionDenied, "read-only directory"))
    }

    fn describe(&self) -> String {
        "read-only".to_string()
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    start: Instant,
    start_wall: DateTime<Local>,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            start: Instant::now(),
            start_wall: Local::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    fn wall(&self) -> DateTime<Local> {
        let offset = *self.offset.lock().unwrap();
        self.start_wall + chrono::Duration::from_std(offset).unwrap()
    }
}

// ============================================================================
// Session harness
// ============================================================================

/// A controller wired to fakes, with handles to drive and observe them.
pub struct Harness {
    pub controller: SessionController,
    pub clock: ManualClock,
    pub enumerator: FakeEnumerator,
    pub transport: FakeTransport,
    pub sink: MemorySinkFactory,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    pub fn new(ports: &[&str]) -> Self {
        let sink = MemorySinkFactory::new();
        Self::build(ports, Box::new(sink.clone()), sink, None)
    }

    pub fn with_failing_sink(ports: &[&str]) -> Self {
        Self::build(ports, Box::new(FailingSinkFactory), MemorySinkFactory::new(), None)
    }

    pub fn with_system_clock(ports: &[&str]) -> Self {
        let sink = MemorySinkFactory::new();
        Self::build(ports, Box::new(sink.clone()), sink, Some(Box::new(SystemClock)))
    }

    fn build(
        ports: &[&str],
        sink_factory: Box<dyn SinkFactory>,
        sink: MemorySinkFactory,
        clock_override: Option<Box<dyn Clock>>,
    ) -> Self {
        let clock = ManualClock::new();
        let enumerator = FakeEnumerator::new(ports);
        let transport = FakeTransport::new();
        let (events, rx) = EventEmitter::channel();

        let backend = Backend {
            enumerator: Box::new(enumerator.clone()),
            transport: Box::new(transport.clone()),
        };
        let controller_clock = clock_override.unwrap_or_else(|| Box::new(clock.clone()));
        let controller = SessionController::new(
            SessionTiming::default(),
            LinkConfig::default(),
            backend,
            sink_factory,
            controller_clock,
            events,
        );

        Harness {
            controller,
            clock,
            enumerator,
            transport,
            sink,
            events: rx,
        }
    }

    /// Everything emitted so far, in order.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}
