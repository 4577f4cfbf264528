//! Lifecycle transition and milestone detection.
//!
//! Fed one sample per successful poll. Raw firmware fields are noisy, so a
//! transition is judged against the previous sample rather than trusted from
//! any single status string.

use serde::Serialize;
use std::collections::BTreeSet;

use super::MachineState;
use crate::events::PrintEventKind;

/// Completion threshold in percent.
const COMPLETE_PERCENT: f64 = 99.0;

/// What the poller remembers between samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollerState {
    pub previous_state: Option<MachineState>,
    pub previous_progress: f64,
    pub previous_file_name: String,
    /// Milestones already announced for the current file.
    pub milestones_sent: BTreeSet<u8>,
    /// A job has been seen running or paused and has not ended yet.
    pub in_job: bool,
}

impl PollerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a new sample with the previous one and return the events it implies.
    ///
    /// `progress` is in percent. The sample becomes the new "previous" afterwards.
    pub fn observe(
        &mut self,
        state: MachineState,
        file_name: &str,
        progress: f64,
        milestones: &[u8],
    ) -> Vec<PrintEventKind> {
        let mut events = Vec::new();
        let file_name = file_name.trim();

        if !file_name.is_empty()
            && !self.previous_file_name.is_empty()
            && file_name != self.previous_file_name
        {
            tracing::info!("New print detected: {} (was {})", file_name, self.previous_file_name);
            self.milestones_sent.clear();
        }

        let previous = self.previous_state;
        let was_active = matches!(
            previous,
            Some(MachineState::Printing | MachineState::Pausing | MachineState::Paused)
        );

        match state {
            MachineState::Printing if !self.in_job && starts_job(previous) => {
                self.milestones_sent.clear();
                events.push(PrintEventKind::Started);
            }
            MachineState::Paused
                if matches!(previous, Some(MachineState::Printing | MachineState::Pausing)) =>
            {
                events.push(PrintEventKind::Paused);
            }
            MachineState::Completed
                if matches!(previous, Some(MachineState::Printing | MachineState::Pausing)) =>
            {
                events.push(PrintEventKind::Completed);
            }
            idle if idle.is_idle() && was_active => {
                if self.previous_progress >= COMPLETE_PERCENT {
                    events.push(PrintEventKind::Completed);
                } else if self.previous_progress > 0.0 {
                    events.push(PrintEventKind::Failed);
                }
            }
            MachineState::Error if was_active => events.push(PrintEventKind::Failed),
            _ => {}
        }

        match state {
            MachineState::Printing | MachineState::Pausing | MachineState::Paused => self.in_job = true,
            MachineState::Error => self.in_job = false,
            idle if idle.is_idle() => self.in_job = false,
            _ => {}
        }

        if state == MachineState::Printing {
            for &threshold in milestones {
                let mark = f64::from(threshold);
                if !self.milestones_sent.contains(&threshold)
                    && progress >= mark
                    && self.previous_progress < mark
                {
                    self.milestones_sent.insert(threshold);
                    events.push(PrintEventKind::ProgressMilestone { threshold });
                }
            }
        }

        if let Some(last) = previous {
            if last != state {
                tracing::debug!("Printer state {} -> {}", last.as_str(), state.as_str());
            }
        }

        self.previous_state = Some(state);
        self.previous_progress = progress;
        if !file_name.is_empty() {
            self.previous_file_name = file_name.to_string();
        }
        events
    }
}

/// Entering Printing from here begins a new job, unless one is already active.
fn starts_job(previous: Option<MachineState>) -> bool {
    match previous {
        None => true,
        Some(state) => state.is_idle() || state.is_preparing(),
    }
}
