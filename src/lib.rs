//! Printer link for a personal dashboard: exclusive G-code control sessions
//! over the printer's TCP command port, and a status poller that derives
//! print lifecycle events from the printer's HTTP telemetry.

pub mod actions;
pub mod config;
pub mod events;
pub mod session;
pub mod status;
pub mod web;

pub use events::{ChannelEventSink, EventSink, PrintEvent, PrintEventKind, TracingEventSink};
pub use session::{run_session, Command, SessionConfig, SessionResult};
pub use status::{
    CombinedStatus, HttpStatusTransport, JobSnapshot, MachineState, PollerConfig, RawStatus,
    StatusPoller, StatusTransport,
};
