// src/catalog.rs
//
// Port catalog: the latest port enumeration plus the operator's selection.
//
// After every refresh the selection policy is applied in this order:
// 1. A selected port that disappeared is cleared
// 2. An empty list reports "no ports available"
// 3. A single port is selected automatically
// Rule 1 runs first so rule 3 can re-select right after a clear.

use serde::Serialize;
use thiserror::Error;

use crate::io::{PortEnumerator, PortId};

/// What the presentation layer should show in place of a selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogStatus {
    Selected,
    NoSelection,
    NoPortsAvailable,
}

/// One enumeration with the selection that applies to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PortSnapshot {
    pub ports: Vec<PortId>,
    pub selected: Option<PortId>,
    pub status: CatalogStatus,
    /// The previous selection vanished during this refresh
    pub selection_cleared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectFault {
    #[error("port {0} is not in the current port list")]
    UnknownPort(PortId),
}

pub struct PortCatalog {
    enumerator: Box<dyn PortEnumerator>,
    ports: Vec<PortId>,
    selected: Option<PortId>,
}

impl PortCatalog {
    pub fn new(enumerator: Box<dyn PortEnumerator>) -> Self {
        PortCatalog {
            enumerator,
            ports: Vec::new(),
            selected: None,
        }
    }

    /// Re-enumerate and replace the port list wholesale.
    ///
    /// An enumeration failure is treated as "no ports".
    pub fn refresh(&mut self) -> PortSnapshot {
        let ports = match self.enumerator.list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                log::warn!("Port enumeration failed: {}", e);
                Vec::new()
            }
        };
        self.apply(ports)
    }

    fn apply(&mut self, ports: Vec<PortId>) -> PortSnapshot {
        if ports != self.ports {
            log::debug!("Port list changed: {:?} -> {:?}", self.ports, ports);
        }
        self.ports = ports;

        let mut selection_cleared = false;
        if let Some(selected) = &self.selected {
            if !self.ports.contains(selected) {
                log::info!("Selected port {} is gone", selected);
                self.selected = None;
                selection_cleared = true;
            }
        }

        if self.ports.len() == 1 && self.selected.is_none() {
            log::info!("Auto-selecting only port {}", self.ports[0]);
            self.selected = Some(self.ports[0].clone());
        }

        self.build_snapshot(selection_cleared)
    }

    /// Operator picks a port from the current list.
    pub fn select(&mut self, port: &PortId) -> Result<PortSnapshot, SelectFault> {
        if !self.ports.contains(port) {
            return Err(SelectFault::UnknownPort(port.clone()));
        }
        self.selected = Some(port.clone());
        Ok(self.build_snapshot(false))
    }

    pub fn selected(&self) -> Option<&PortId> {
        self.selected.as_ref()
    }

    fn build_snapshot(&self, selection_cleared: bool) -> PortSnapshot {
        let status = if self.ports.is_empty() {
            CatalogStatus::NoPortsAvailable
        } else if self.selected.is_some() {
            CatalogStatus::Selected
        } else {
            CatalogStatus::NoSelection
        };

        PortSnapshot {
            ports: self.ports.clone(),
            selected: self.selected.clone(),
            status,
            selection_cleared,
        }
    }
}
