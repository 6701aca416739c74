// src/scheduler.rs
//
// Cooperative periodic timers for the session loop.
//
// Each timer kind has at most one entry. Cadence is fixed-rate: a timer's
// next deadline advances by whole periods from its first deadline, so late
// ticks do not accumulate drift, and ticks missed while the loop was busy
// are skipped rather than fired in a burst.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::{Duration, Instant};

/// The periodic tasks a session runs. Ordered by dispatch priority when
/// several fall due together (reads before recording, so a due append sees
/// the freshest value).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    CatalogRefresh,
    DeviceRead,
    RecordingAppend,
}

#[derive(Debug)]
struct Timer {
    kind: TimerKind,
    period: Duration,
    next_due: Instant,
}

#[derive(Debug, Default)]
pub struct TickScheduler {
    timers: Vec<Timer>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) `kind`, first firing at `first_due`.
    pub fn schedule(&mut self, kind: TimerKind, period: Duration, first_due: Instant) {
        self.cancel(kind);
        self.timers.push(Timer {
            kind,
            period: period.max(Duration::from_millis(1)),
            next_due: first_due,
        });
    }

    /// Returns whether a timer was running.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.kind != kind);
        self.timers.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.timers.iter().any(|t| t.kind == kind)
    }

    pub fn active(&self) -> Vec<TimerKind> {
        let mut kinds: Vec<TimerKind> = self.timers.iter().map(|t| t.kind).collect();
        kinds.sort();
        kinds
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.next_due).min()
    }

    /// Timers due at `now`, each advanced to its next deadline after `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = Vec::new();

        for timer in self.timers.iter_mut().filter(|t| t.next_due <= now) {
            due.push((timer.next_due, timer.kind));
            while timer.next_due <= now {
                timer.next_due += timer.period;
            }
        }

        due.sort();
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

/// Time source for the session. Monotonic time drives timers and elapsed
/// computations; wall time stamps readings and log headers.
pub trait Clock: Send {
    fn now(&self) -> Instant;

    fn wall(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }
}
