// src/status/model.rs - Printer telemetry as reported and as shown
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Normalized printer lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Ready,
    Printing,
    Heating,
    Pausing,
    Paused,
    Calibrating,
    Cancelled,
    Completed,
    Error,
    Busy,
    #[default]
    Unknown,
}

impl MachineState {
    /// Map the firmware's status string onto a lifecycle phase.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ready" | "idle" => MachineState::Ready,
            "printing" => MachineState::Printing,
            "heating" => MachineState::Heating,
            "pausing" => MachineState::Pausing,
            "paused" | "pause" => MachineState::Paused,
            "calibrate_doing" | "calibrating" => MachineState::Calibrating,
            "cancel" | "cancelled" | "canceled" => MachineState::Cancelled,
            "completed" | "complete" => MachineState::Completed,
            "error" => MachineState::Error,
            "busy" => MachineState::Busy,
            _ => MachineState::Unknown,
        }
    }

    /// No job is running and the printer will accept a new one.
    pub fn is_idle(&self) -> bool {
        matches!(self, MachineState::Ready | MachineState::Completed | MachineState::Cancelled)
    }

    /// Phases the firmware passes through right before a print starts.
    pub fn is_preparing(&self) -> bool {
        matches!(self, MachineState::Heating | MachineState::Calibrating | MachineState::Busy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Ready => "ready",
            MachineState::Printing => "printing",
            MachineState::Heating => "heating",
            MachineState::Pausing => "pausing",
            MachineState::Paused => "paused",
            MachineState::Calibrating => "calibrating",
            MachineState::Cancelled => "cancelled",
            MachineState::Completed => "completed",
            MachineState::Error => "error",
            MachineState::Busy => "busy",
            MachineState::Unknown => "unknown",
        }
    }
}

/// Firmware sends `null` for fields it has nothing to say about.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Telemetry payload of the detail call, replaced wholesale on every poll.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RawStatus {
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(rename = "printFileName", deserialize_with = "null_as_default")]
    pub file_name: String,
    /// Fraction complete, 0.0 to 1.0.
    #[serde(rename = "printProgress", deserialize_with = "null_as_default")]
    pub progress: f64,
    #[serde(rename = "estimatedTime", deserialize_with = "null_as_default")]
    pub remaining_secs: f64,
    #[serde(rename = "printDuration", deserialize_with = "null_as_default")]
    pub elapsed_secs: f64,
    #[serde(rename = "printLayer", deserialize_with = "null_as_default")]
    pub current_layer: u32,
    #[serde(rename = "targetPrintLayer", deserialize_with = "null_as_default")]
    pub total_layers: u32,
    #[serde(rename = "leftTemp", deserialize_with = "null_as_default")]
    pub nozzle_temp: f64,
    #[serde(rename = "leftTargetTemp", deserialize_with = "null_as_default")]
    pub nozzle_target: f64,
    #[serde(rename = "platTemp", deserialize_with = "null_as_default")]
    pub bed_temp: f64,
    #[serde(rename = "platTargetTemp", deserialize_with = "null_as_default")]
    pub bed_target: f64,
    #[serde(rename = "rightFilamentType", alias = "filamentType", deserialize_with = "null_as_default")]
    pub material: String,
    #[serde(rename = "estimatedRightWeight", deserialize_with = "null_as_default")]
    pub estimated_weight: f64,
    #[serde(rename = "fillAmount", deserialize_with = "null_as_default")]
    pub fill_amount: f64,
}

impl RawStatus {
    pub fn machine_state(&self) -> MachineState {
        MachineState::from_raw(&self.status)
    }

    /// Progress as a percentage clamped to 0..=100.
    pub fn progress_percent(&self) -> f64 {
        (self.progress * 100.0).clamp(0.0, 100.0)
    }

    /// Job fields, or `None` when the printer reports no file.
    pub fn job(&self) -> Option<JobSnapshot> {
        let file_name = self.file_name.trim();
        if file_name.is_empty() {
            return None;
        }
        Some(JobSnapshot {
            file_name: file_name.to_string(),
            progress: self.progress,
            remaining_secs: self.remaining_secs,
            elapsed_secs: self.elapsed_secs,
            current_layer: self.current_layer,
            total_layers: self.total_layers,
            estimated_weight: self.estimated_weight,
            fill_amount: self.fill_amount,
            material: self.material.clone(),
        })
    }
}

/// The job fields of one status sample that carried a file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub file_name: String,
    pub progress: f64,
    pub remaining_secs: f64,
    pub elapsed_secs: f64,
    pub current_layer: u32,
    pub total_layers: u32,
    pub estimated_weight: f64,
    pub fill_amount: f64,
    pub material: String,
}

/// Identity payload of the lightweight product call.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrinterInfo {
    #[serde(alias = "machineName")]
    pub name: Option<String>,
    #[serde(alias = "machineModel")]
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    #[serde(alias = "sn")]
    pub serial_number: Option<String>,
}

/// What subscribers see after each poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedStatus {
    pub is_connected: bool,
    pub machine_state: MachineState,
    pub raw_status: String,
    pub nozzle_temp: f64,
    pub nozzle_target: f64,
    pub bed_temp: f64,
    pub bed_target: f64,
    pub material: String,
    pub job: Option<JobSnapshot>,
    /// The job came from the last-known-good cache, not the current sample.
    pub job_masked: bool,
    pub info: Option<PrinterInfo>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CombinedStatus {
    pub fn from_raw(raw: &RawStatus, info: Option<PrinterInfo>) -> Self {
        Self {
            is_connected: true,
            machine_state: raw.machine_state(),
            raw_status: raw.status.clone(),
            nozzle_temp: raw.nozzle_temp,
            nozzle_target: raw.nozzle_target,
            bed_temp: raw.bed_temp,
            bed_target: raw.bed_target,
            material: raw.material.clone(),
            job: raw.job(),
            job_masked: false,
            info,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Status for a poll that could not reach the printer.
    pub fn offline(error: String, info: Option<PrinterInfo>) -> Self {
        Self {
            is_connected: false,
            machine_state: MachineState::Unknown,
            raw_status: String::new(),
            nozzle_temp: 0.0,
            nozzle_target: 0.0,
            bed_temp: 0.0,
            bed_target: 0.0,
            material: String::new(),
            job: None,
            job_masked: false,
            info,
            error: Some(error),
            updated_at: Utc::now(),
        }
    }

    /// Progress of the shown job in percent, 0 when there is none.
    pub fn progress_percent(&self) -> f64 {
        self.job
            .as_ref()
            .map(|job| (job.progress * 100.0).clamp(0.0, 100.0))
            .unwrap_or(0.0)
    }
}
