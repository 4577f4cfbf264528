//! Integration tests for the status poller against a scripted transport.

use async_trait::async_trait;
use printer_dash::events::{ChannelEventSink, PrintEvent, PrintEventKind};
use printer_dash::status::{
    CombinedStatus, MachineState, PollerConfig, PrinterInfo, RawStatus, StatusError,
    StatusPoller, StatusTransport, TickOutcome,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Replays a fixed list of samples, repeating the last one once exhausted.
struct ScriptedTransport {
    samples: Mutex<VecDeque<Result<RawStatus, String>>>,
    last: Mutex<Option<RawStatus>>,
    delay: Duration,
    fail_info: AtomicBool,
    status_calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedTransport {
    fn new(samples: Vec<Result<RawStatus, String>>) -> Self {
        Self {
            samples: Mutex::new(samples.into()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            fail_info: AtomicBool::new(false),
            status_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn slow(samples: Vec<Result<RawStatus, String>>, delay: Duration) -> Self {
        Self { delay, ..Self::new(samples) }
    }
}

#[async_trait]
impl StatusTransport for ScriptedTransport {
    async fn fetch_info(&self) -> Result<PrinterInfo, StatusError> {
        if self.fail_info.load(Ordering::SeqCst) {
            return Err(StatusError::Malformed {
                endpoint: "/product".to_string(),
                reason: "truncated".to_string(),
            });
        }
        Ok(PrinterInfo {
            name: Some("Adventurer 5M".to_string()),
            ..Default::default()
        })
    }

    async fn fetch_status(&self) -> Result<RawStatus, StatusError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let next = self.samples.lock().unwrap().pop_front();
        match next {
            Some(Ok(raw)) => {
                *self.last.lock().unwrap() = Some(raw.clone());
                Ok(raw)
            }
            Some(Err(reason)) => Err(StatusError::Malformed {
                endpoint: "/detail".to_string(),
                reason,
            }),
            None => Ok(self.last.lock().unwrap().clone().unwrap_or_else(ready)),
        }
    }
}

fn ready() -> RawStatus {
    RawStatus {
        status: "ready".to_string(),
        ..Default::default()
    }
}

fn printing(file: &str, percent: f64) -> RawStatus {
    RawStatus {
        status: "printing".to_string(),
        file_name: file.to_string(),
        progress: percent / 100.0,
        current_layer: percent as u32,
        total_layers: 100,
        material: "PLA".to_string(),
        ..Default::default()
    }
}

fn quick_config() -> PollerConfig {
    PollerConfig {
        inter_call_delay: Duration::ZERO,
        milestones: vec![50],
        job_cache_ttl: None,
    }
}

struct Harness {
    poller: StatusPoller,
    transport: Arc<ScriptedTransport>,
    events: mpsc::Receiver<PrintEvent>,
    updates: Arc<Mutex<Vec<CombinedStatus>>>,
}

impl Harness {
    fn new(transport: ScriptedTransport, config: PollerConfig) -> Self {
        let transport = Arc::new(transport);
        let (tx, events) = mpsc::channel(64);
        let poller = StatusPoller::new(transport.clone(), Arc::new(ChannelEventSink::new(tx)), config);
        Self {
            poller,
            transport,
            events,
            updates: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn recorder(&self) -> impl Fn(CombinedStatus) + Send + Sync + 'static {
        let updates = self.updates.clone();
        move |status| updates.lock().unwrap().push(status)
    }

    async fn poll(&self, times: usize) {
        let record = self.recorder();
        for _ in 0..times {
            assert_eq!(self.poller.poll_once(&record).await, TickOutcome::Polled);
        }
    }

    fn drain_events(&mut self) -> Vec<PrintEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    fn last_update(&self) -> CombinedStatus {
        self.updates.lock().unwrap().last().cloned().expect("no update recorded")
    }
}

#[tokio::test]
async fn test_full_print_lifecycle_with_idle_masking() {
    let samples = vec![
        Ok(ready()),
        Ok(printing("benchy.gx", 0.0)),
        Ok(printing("benchy.gx", 60.0)),
        Ok(printing("benchy.gx", 100.0)),
        Ok(ready()),
    ];
    let mut harness = Harness::new(ScriptedTransport::new(samples), quick_config());
    harness.poll(5).await;

    assert_eq!(
        harness.drain_events(),
        vec![
            PrintEventKind::Started,
            PrintEventKind::ProgressMilestone { threshold: 50 },
            PrintEventKind::Completed,
        ]
    );

    let last = harness.last_update();
    assert_eq!(last.machine_state, MachineState::Ready);
    assert!(last.job_masked);
    let job = last.job.expect("idle printer should still show the finished job");
    assert_eq!(job.file_name, "benchy.gx");
    assert_eq!(job.progress, 1.0);
}

#[tokio::test]
async fn test_abandoned_print_fails_and_keeps_last_job_fields() {
    let samples = vec![
        Ok(ready()),
        Ok(printing("benchy.gx", 0.0)),
        Ok(printing("benchy.gx", 60.0)),
        Ok(ready()),
    ];
    let mut harness = Harness::new(ScriptedTransport::new(samples), quick_config());
    harness.poll(4).await;

    assert_eq!(
        harness.drain_events(),
        vec![
            PrintEventKind::Started,
            PrintEventKind::ProgressMilestone { threshold: 50 },
            PrintEventKind::Failed,
        ]
    );
    let job = harness.last_update().job.unwrap();
    assert_eq!(job.file_name, "benchy.gx");
    assert_eq!(job.current_layer, 60);
}

#[tokio::test]
async fn test_events_carry_masked_status() {
    let samples = vec![Ok(printing("cube.gx", 99.5)), Ok(ready())];
    let mut harness = Harness::new(ScriptedTransport::new(samples), quick_config());
    harness.poll(2).await;

    let mut completed = None;
    while let Ok(event) = harness.events.try_recv() {
        if event.kind == PrintEventKind::Completed {
            completed = Some(event);
        }
    }
    let completed = completed.expect("completion event");
    assert_eq!(completed.file_name(), Some("cube.gx"));
}

#[tokio::test]
async fn test_noisy_progress_fires_milestone_once() {
    let samples = vec![
        Ok(printing("a.gx", 10.0)),
        Ok(printing("a.gx", 55.0)),
        Ok(printing("a.gx", 40.0)),
        Ok(printing("a.gx", 70.0)),
    ];
    let mut harness = Harness::new(ScriptedTransport::new(samples), quick_config());
    harness.poll(4).await;

    let milestones: Vec<_> = harness
        .drain_events()
        .into_iter()
        .filter(|kind| matches!(kind, PrintEventKind::ProgressMilestone { .. }))
        .collect();
    assert_eq!(milestones, vec![PrintEventKind::ProgressMilestone { threshold: 50 }]);
}

#[tokio::test]
async fn test_new_file_can_hit_the_same_milestone_again() {
    let samples = vec![
        Ok(printing("a.gx", 40.0)),
        Ok(printing("a.gx", 60.0)),
        Ok(printing("b.gx", 10.0)),
        Ok(printing("b.gx", 60.0)),
    ];
    let mut harness = Harness::new(ScriptedTransport::new(samples), quick_config());
    harness.poll(4).await;

    let milestones = harness
        .drain_events()
        .into_iter()
        .filter(|kind| *kind == PrintEventKind::ProgressMilestone { threshold: 50 })
        .count();
    assert_eq!(milestones, 2);
}

#[tokio::test]
async fn test_overlapping_poll_is_skipped() {
    let transport = ScriptedTransport::slow(vec![Ok(ready())], Duration::from_millis(200));
    let harness = Harness::new(transport, quick_config());
    let record = harness.recorder();

    let (first, second) = tokio::join!(harness.poller.poll_once(&record), async {
        tokio::task::yield_now().await;
        harness.poller.poll_once(&record).await
    });

    assert_eq!(first, TickOutcome::Polled);
    assert_eq!(second, TickOutcome::Skipped);
    assert_eq!(harness.transport.status_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.updates.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timer_never_overlaps_slow_fetches() {
    let transport = ScriptedTransport::slow(vec![Ok(ready())], Duration::from_millis(250));
    let mut harness = Harness::new(transport, quick_config());
    let record = harness.recorder();

    harness.poller.start(Duration::from_millis(100), record);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    harness.poller.stop();

    let calls = harness.transport.status_calls.load(Ordering::SeqCst);
    assert_eq!(harness.transport.max_active.load(Ordering::SeqCst), 1);
    assert!(calls >= 3 && calls <= 5, "unexpected fetch count {}", calls);
    assert!(!harness.updates.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_is_immediate() {
    let mut harness = Harness::new(ScriptedTransport::new(vec![Ok(ready())]), quick_config());
    let record = harness.recorder();

    harness.poller.start(Duration::from_secs(60), record);
    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.poller.stop();

    assert_eq!(harness.updates.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_result() {
    let transport = ScriptedTransport::slow(vec![Ok(printing("a.gx", 10.0))], Duration::from_millis(200));
    let mut harness = Harness::new(transport, quick_config());
    let record = harness.recorder();

    harness.poller.start(Duration::from_secs(10), record);
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.poller.stop();
    assert!(!harness.poller.is_running());
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(harness.transport.status_calls.load(Ordering::SeqCst), 1);
    assert!(harness.updates.lock().unwrap().is_empty());
    assert!(harness.drain_events().is_empty());
    assert_eq!(harness.poller.tracker_state().await.previous_state, None);
}

#[tokio::test]
async fn test_failed_poll_reports_offline_and_recovers() {
    let samples = vec![
        Ok(printing("a.gx", 30.0)),
        Err("unexpected end of JSON".to_string()),
        Ok(printing("a.gx", 31.0)),
    ];
    let mut harness = Harness::new(ScriptedTransport::new(samples), quick_config());
    harness.poll(2).await;

    let offline = harness.last_update();
    assert!(!offline.is_connected);
    assert!(offline.error.unwrap().contains("unexpected end of JSON"));
    assert_eq!(offline.info.and_then(|i| i.name).as_deref(), Some("Adventurer 5M"));
    // The outage did not look like the print stopping.
    assert_eq!(
        harness.poller.tracker_state().await.previous_state,
        Some(MachineState::Printing)
    );

    harness.poll(1).await;
    assert!(harness.last_update().is_connected);
    assert_eq!(harness.drain_events(), vec![PrintEventKind::Started]);
}

#[tokio::test]
async fn test_identity_failure_is_not_an_outage() {
    let transport = ScriptedTransport::new(vec![Ok(ready())]);
    transport.fail_info.store(true, Ordering::SeqCst);
    let harness = Harness::new(transport, quick_config());
    harness.poll(1).await;

    let status = harness.last_update();
    assert!(status.is_connected);
    assert!(status.info.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_identity_and_telemetry_calls_are_spaced() {
    let config = PollerConfig {
        inter_call_delay: Duration::from_millis(100),
        ..quick_config()
    };
    let harness = Harness::new(ScriptedTransport::new(vec![Ok(ready())]), config);

    let started = tokio::time::Instant::now();
    harness.poll(1).await;
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_job_cache_ttl_bounds_masking() {
    let config = PollerConfig {
        job_cache_ttl: Some(Duration::from_secs(60)),
        ..quick_config()
    };
    let samples = vec![Ok(printing("a.gx", 100.0)), Ok(ready()), Ok(ready())];
    let harness = Harness::new(ScriptedTransport::new(samples), config);

    harness.poll(2).await;
    assert!(harness.last_update().job_masked);

    tokio::time::advance(Duration::from_secs(61)).await;
    harness.poll(1).await;
    let status = harness.last_update();
    assert!(!status.job_masked);
    assert!(status.job.is_none());
}

#[tokio::test]
async fn test_masking_never_applies_while_busy() {
    let busy = RawStatus {
        status: "busy".to_string(),
        ..Default::default()
    };
    let harness = Harness::new(
        ScriptedTransport::new(vec![Ok(printing("a.gx", 20.0)), Ok(busy)]),
        quick_config(),
    );
    harness.poll(2).await;
    assert!(harness.last_update().job.is_none());
}

#[tokio::test]
async fn test_resume_after_reheat_does_not_restart_the_job() {
    let paused = RawStatus {
        status: "paused".to_string(),
        ..printing("a.gx", 60.0)
    };
    let heating = RawStatus {
        status: "heating".to_string(),
        ..printing("a.gx", 60.0)
    };
    let samples = vec![
        Ok(ready()),
        Ok(printing("a.gx", 40.0)),
        Ok(printing("a.gx", 60.0)),
        Ok(paused),
        Ok(heating),
        Ok(printing("a.gx", 61.0)),
    ];
    let mut harness = Harness::new(ScriptedTransport::new(samples), quick_config());
    harness.poll(6).await;

    assert_eq!(
        harness.drain_events(),
        vec![
            PrintEventKind::Started,
            PrintEventKind::ProgressMilestone { threshold: 50 },
            PrintEventKind::Paused,
        ]
    );
}
