pub mod catalog;
pub mod cli;
pub mod events;
pub mod frame;
pub mod io;
pub mod logging;
pub mod recording;
pub mod scheduler;
pub mod sessions;
pub mod settings;

#[cfg(test)]
mod testing;

pub use catalog::{CatalogStatus, PortCatalog, PortSnapshot, SelectFault};
pub use events::{EventEmitter, SessionEvent};
pub use frame::{parse_frame, Measurement, ParseFault};
pub use io::{ConnectFault, DeviceLink, LinkConfig, PortId, ReadTransportFault};
pub use recording::{FileSinkFactory, RecordingFault, RecordingSession, SinkFactory, SinkFault};
pub use sessions::{
    spawn_session, ConnectionState, SessionCommand, SessionController, SessionHandle,
    SessionTiming,
};
pub use settings::MonitorSettings;
