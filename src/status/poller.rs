// src/status/poller.rs - Periodic status polling with idle-masking
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, MissedTickBehavior};

use super::{CombinedStatus, JobSnapshot, PollerState, PrinterInfo, RawStatus, StatusError, StatusTransport};
use crate::events::{EventSink, PrintEvent};

/// Receives the combined status after every poll, connected or not.
pub type UpdateCallback = Arc<dyn Fn(CombinedStatus) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Gap between the identity call and the telemetry call.
    pub inter_call_delay: Duration,
    /// Progress percentages announced once per job.
    pub milestones: Vec<u8>,
    /// How long a finished job may mask an idle printer. `None` masks forever.
    pub job_cache_ttl: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            inter_call_delay: Duration::from_millis(100),
            milestones: vec![50],
            job_cache_ttl: None,
        }
    }
}

/// What happened to one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Polled,
    /// Another poll was still in flight.
    Skipped,
    /// The poller was stopped while this poll was in flight.
    Discarded,
}

struct CachedJob {
    snapshot: JobSnapshot,
    captured_at: Instant,
}

#[derive(Default)]
struct PollerData {
    tracker: PollerState,
    last_job: Option<CachedJob>,
    last_info: Option<PrinterInfo>,
}

struct PollerCore {
    transport: Arc<dyn StatusTransport>,
    sink: Arc<dyn EventSink>,
    config: PollerConfig,
    data: Mutex<PollerData>,
    in_flight: AtomicBool,
    running: AtomicBool,
    /// Bumped on every start so results from an earlier run can be told apart.
    epoch: AtomicU64,
}

/// Clears the in-flight flag however the poll ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polls one printer on a timer and turns raw telemetry into a stable view.
pub struct StatusPoller {
    core: Arc<PollerCore>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StatusPoller {
    pub fn new(
        transport: Arc<dyn StatusTransport>,
        sink: Arc<dyn EventSink>,
        config: PollerConfig,
    ) -> Self {
        Self {
            core: Arc::new(PollerCore {
                transport,
                sink,
                config,
                data: Mutex::new(PollerData::default()),
                in_flight: AtomicBool::new(false),
                running: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            }),
            shutdown_tx: None,
            task: None,
        }
    }

    /// Poll now, then every `interval`. Ticks that land while a poll is in
    /// flight are skipped.
    pub fn start<F>(&mut self, interval: Duration, on_update: F)
    where
        F: Fn(CombinedStatus) + Send + Sync + 'static,
    {
        if self.is_running() {
            tracing::warn!("Status poller already running; ignoring start");
            return;
        }
        let on_update: UpdateCallback = Arc::new(on_update);
        let interval = interval.max(Duration::from_millis(1));
        let epoch = self.core.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.core.running.store(true, Ordering::Release);

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let core = self.core.clone();
        tracing::info!("Starting status poller every {:?}", interval);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Status poller shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let core = core.clone();
                        let on_update = on_update.clone();
                        tokio::spawn(async move {
                            core.tick(on_update.as_ref(), Some(epoch)).await;
                        });
                    }
                }
            }
        }));
        self.shutdown_tx = Some(shutdown_tx);
    }

    /// Cancel future ticks. A poll already in flight finishes, but its result is dropped.
    pub fn stop(&mut self) {
        if !self.core.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        self.task = None;
        tracing::info!("Status poller stopped");
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    /// Run a single poll outside the timer, honoring the in-flight guard.
    pub async fn poll_once(&self, on_update: &(dyn Fn(CombinedStatus) + Send + Sync)) -> TickOutcome {
        self.core.tick(on_update, None).await
    }

    /// Copy of the transition-tracking state.
    pub async fn tracker_state(&self) -> PollerState {
        self.core.data.lock().await.tracker.clone()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PollerCore {
    async fn tick(&self, on_update: &(dyn Fn(CombinedStatus) + Send + Sync), epoch: Option<u64>) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Previous status poll still in flight; skipping tick");
            return TickOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let (info, status) = self.fetch().await;

        if let Some(epoch) = epoch {
            if !self.running.load(Ordering::Acquire) || self.epoch.load(Ordering::Acquire) != epoch {
                tracing::debug!("Poller stopped during fetch; discarding result");
                return TickOutcome::Discarded;
            }
        }

        let (combined, events) = {
            let mut data = self.data.lock().await;
            self.apply(&mut data, info, status)
        };

        for event in events {
            self.sink.emit(event).await;
        }
        on_update(combined);
        TickOutcome::Polled
    }

    async fn fetch(&self) -> (Option<PrinterInfo>, Result<RawStatus, StatusError>) {
        let info = match self.transport.fetch_info().await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!("Printer identity call failed: {}", e);
                None
            }
        };
        // The printer serves one request at a time.
        if !self.config.inter_call_delay.is_zero() {
            sleep(self.config.inter_call_delay).await;
        }
        (info, self.transport.fetch_status().await)
    }

    fn apply(
        &self,
        data: &mut PollerData,
        info: Option<PrinterInfo>,
        status: Result<RawStatus, StatusError>,
    ) -> (CombinedStatus, Vec<PrintEvent>) {
        if info.is_some() {
            data.last_info = info;
        }

        let raw = match status {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Status poll failed: {}", e);
                return (CombinedStatus::offline(e.to_string(), data.last_info.clone()), Vec::new());
            }
        };

        let mut combined = CombinedStatus::from_raw(&raw, data.last_info.clone());
        match raw.job() {
            Some(snapshot) => {
                data.last_job = Some(CachedJob {
                    snapshot,
                    captured_at: Instant::now(),
                });
            }
            None if combined.machine_state.is_idle() => {
                if let Some(cached) = data.last_job.as_ref().filter(|c| self.cache_valid(c)) {
                    combined.job = Some(cached.snapshot.clone());
                    combined.job_masked = true;
                }
            }
            None => {}
        }

        let events = data
            .tracker
            .observe(
                combined.machine_state,
                &raw.file_name,
                raw.progress_percent(),
                &self.config.milestones,
            )
            .into_iter()
            .map(|kind| PrintEvent::new(kind, combined.clone()))
            .collect();

        (combined, events)
    }

    fn cache_valid(&self, cached: &CachedJob) -> bool {
        match self.config.job_cache_ttl {
            Some(ttl) => cached.captured_at.elapsed() < ttl,
            None => true,
        }
    }
}
