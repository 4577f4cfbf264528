//! Print lifecycle events and the sink they are delivered through.
//!
//! The poller only detects events. Whoever implements [`EventSink`] decides
//! what a notification looks like.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use crate::status::CombinedStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum PrintEventKind {
    #[serde(rename = "print_started")]
    Started,
    #[serde(rename = "print_completed")]
    Completed,
    #[serde(rename = "print_paused")]
    Paused,
    #[serde(rename = "print_failed")]
    Failed,
    #[serde(rename = "progress_milestone")]
    ProgressMilestone { threshold: u8 },
}

impl PrintEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            PrintEventKind::Started => "print_started",
            PrintEventKind::Completed => "print_completed",
            PrintEventKind::Paused => "print_paused",
            PrintEventKind::Failed => "print_failed",
            PrintEventKind::ProgressMilestone { .. } => "progress_milestone",
        }
    }
}

/// An event together with the status it was detected in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintEvent {
    #[serde(flatten)]
    pub kind: PrintEventKind,
    pub status: CombinedStatus,
}

impl PrintEvent {
    pub fn new(kind: PrintEventKind, status: CombinedStatus) -> Self {
        Self { kind, status }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.status.job.as_ref().map(|job| job.file_name.as_str())
    }
}

/// Receives every detected event, in detection order.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: PrintEvent);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: PrintEvent) {
        let file = event.file_name().unwrap_or("<no file>");
        match event.kind {
            PrintEventKind::ProgressMilestone { threshold } => {
                tracing::info!("{}: {} reached {}%", event.kind.name(), file, threshold)
            }
            _ => tracing::info!(
                "{}: {} ({:.0}%)",
                event.kind.name(),
                file,
                event.status.progress_percent()
            ),
        }
    }
}

/// Forwards events into an mpsc channel for a notification task to consume.
///
/// Never waits for room in the channel: when the consumer falls behind, the
/// event is dropped with a warning so the poll tick is not held up.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: Sender<PrintEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: Sender<PrintEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: PrintEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!("Dropping {} event: consumer is behind", event.kind.name())
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!("Dropping {} event: receiver closed", event.kind.name())
            }
        }
    }
}
