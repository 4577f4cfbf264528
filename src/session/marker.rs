//! Marker-line classification for the control port.
//!
//! The firmware has no structured framing for replies. Every line is matched
//! by substring against a handful of known phrases, and the phrases must stay
//! exactly as the firmware prints them.

/// Printed once the printer grants the control session.
pub const LOGIN_SUCCESS: &str = "Control Success";
/// Printed once the printer releases the control session.
pub const LOGOUT_SUCCESS: &str = "Control Release";

const ACK_MARKERS: &[&str] = &["ok", "received"];
const ERROR_MARKERS: &[&str] = &["error", "failed"];

/// What a single line of device output means to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    LoginSuccess,
    LogoutSuccess,
    Ack,
    Error,
    /// Anything else (temperature chatter, banners, blank lines).
    Other,
}

/// Classify one complete line.
///
/// Priority is Error > LoginSuccess > LogoutSuccess > Ack, so `Control failed`
/// is an error and `Control Success ... ok` is a login rather than an ack.
pub fn classify(line: &str) -> Marker {
    let lower = line.to_ascii_lowercase();
    if ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        Marker::Error
    } else if line.contains(LOGIN_SUCCESS) {
        Marker::LoginSuccess
    } else if line.contains(LOGOUT_SUCCESS) {
        Marker::LogoutSuccess
    } else if ACK_MARKERS.iter().any(|m| lower.contains(m)) {
        Marker::Ack
    } else {
        Marker::Other
    }
}
