// src/actions.rs - Named command batches offered to the dashboard
use serde::Serialize;

use crate::session::Command;

/// Canned operations the dashboard exposes as buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Home, then park the head over the bed center high enough to reach the nozzle.
    FilamentChange,
    Pause,
    Resume,
    Cancel,
    Home,
    LightOn,
    LightOff,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::FilamentChange,
        Action::Pause,
        Action::Resume,
        Action::Cancel,
        Action::Home,
        Action::LightOn,
        Action::LightOff,
    ];

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.slug() == slug)
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Action::FilamentChange => "filament-change",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Cancel => "cancel",
            Action::Home => "home",
            Action::LightOn => "light-on",
            Action::LightOff => "light-off",
        }
    }

    /// Commands in the order they must be sent.
    pub fn commands(&self) -> Vec<Command> {
        let lines: &[&str] = match self {
            // 220x220 bed: center is X110 Y110.
            Action::FilamentChange => &["G90", "G28", "G1 X110 Y110 Z100 F9000"],
            Action::Pause => &["M25"],
            Action::Resume => &["M24"],
            Action::Cancel => &["M26"],
            Action::Home => &["G28"],
            Action::LightOn => &["M146 r255 g255 b255 F0"],
            Action::LightOff => &["M146 r0 g0 b0 F0"],
        };
        lines.iter().copied().map(Command::from).collect()
    }
}
