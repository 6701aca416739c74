// src/events.rs
//
// Notifications from the session to whatever presents it. Events are
// pushed onto an unbounded channel so the session loop never waits on
// the presentation side.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::catalog::PortSnapshot;
use crate::frame::Measurement;
use crate::io::PortId;
use crate::sessions::ConnectionState;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    CatalogChanged {
        snapshot: PortSnapshot,
    },
    ConnectionStateChanged {
        state: ConnectionState,
        port: Option<PortId>,
        /// Set when the link was lost rather than closed on request
        fault: Option<String>,
    },
    MeasurementUpdated {
        measurement: Measurement,
    },
    /// A frame could not be decoded; the previous measurement stands
    ReadingRejected {
        raw_text: String,
    },
    RecordingStateChanged {
        active: bool,
        sink: Option<String>,
    },
    TransientMessage {
        title: String,
        body: String,
        visible_for_ms: u64,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::CatalogChanged { .. } => "catalog-changed",
            SessionEvent::ConnectionStateChanged { .. } => "connection-state-changed",
            SessionEvent::MeasurementUpdated { .. } => "measurement-updated",
            SessionEvent::ReadingRejected { .. } => "reading-rejected",
            SessionEvent::RecordingStateChanged { .. } => "recording-state-changed",
            SessionEvent::TransientMessage { .. } => "transient-message",
        }
    }
}

/// Sending half of the notification channel.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventEmitter { tx: Some(tx) }, rx)
    }

    /// An emitter nobody listens to.
    pub fn detached() -> Self {
        EventEmitter { tx: None }
    }

    pub fn emit(&self, event: SessionEvent) {
        log::trace!("[emit] {}", event.name());
        if let Some(tx) = &self.tx {
            // A closed receiver only means nobody is watching any more
            if tx.send(event).is_err() {
                log::trace!("[emit] no listener");
            }
        }
    }

    pub fn message(&self, title: &str, body: impl Into<String>, visible_for: Duration) {
        self.emit(SessionEvent::TransientMessage {
            title: title.to_string(),
            body: body.into(),
            visible_for_ms: visible_for.as_millis() as u64,
        });
    }
}
