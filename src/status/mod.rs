//! Printer status: telemetry model, HTTP transport, transition tracking and
//! the polling loop that ties them together.

pub mod model;
pub mod poller;
pub mod tracker;
pub mod transport;

pub use model::{CombinedStatus, JobSnapshot, MachineState, PrinterInfo, RawStatus};
pub use poller::{PollerConfig, StatusPoller, TickOutcome, UpdateCallback};
pub use tracker::PollerState;
pub use transport::{unwrap_envelope, HttpStatusTransport, StatusError, StatusTransport};
