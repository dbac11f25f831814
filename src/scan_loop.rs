//! Fixed-interval polling of the frame source.
//!
//! Every tick hands one scan cycle to the blocking pool. Stopping the loop stops the
//! timer only: cycles already running are awaited, never cancelled.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::camera::FrameSource;
use crate::presentation::StatusSink;
use crate::session::{CycleReport, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Start a cycle on every tick, even while earlier cycles are still running.
    #[default]
    Overlapping,
    /// Skip a tick while a cycle is in flight.
    Serialized,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub ticks: u64,
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub ticks_skipped: u64,
    pub recognized: u64,
    pub failed: u64,
}

pub struct ScanLoop {
    session: Arc<Session>,
    source: Arc<Mutex<Box<dyn FrameSource>>>,
    sink: Arc<Mutex<Box<dyn StatusSink>>>,
    interval: Duration,
    policy: CyclePolicy,
    max_cycles: Option<u64>,
}

/// Clears the in-flight flag when the cycle ends, including by panic.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    recognized: AtomicU64,
    failed: AtomicU64,
}

impl ScanLoop {
    /// `interval` must be non-zero.
    pub fn new(
        session: Arc<Session>,
        source: Box<dyn FrameSource>,
        sink: Arc<Mutex<Box<dyn StatusSink>>>,
        interval: Duration,
    ) -> Self {
        Self {
            session,
            source: Arc::new(Mutex::new(source)),
            sink,
            interval,
            policy: CyclePolicy::default(),
            max_cycles: None,
        }
    }

    pub fn with_policy(mut self, policy: CyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Runs until `shutdown` resolves, `max_cycles` cycles have started, or the frame
    /// source runs dry.
    pub async fn run<F>(self, shutdown: F) -> ScanSummary
    where
        F: Future<Output = ()>,
    {
        let mut summary = ScanSummary::default();
        // like a browser interval timer, the first tick comes one period in
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let in_flight = Arc::new(AtomicBool::new(false));
        let exhausted = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());
        let mut cycles = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("scan loop stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }
            summary.ticks += 1;
            while let Some(joined) = cycles.try_join_next() {
                if let Err(e) = joined {
                    log::error!("scan cycle panicked: {}", e);
                }
            }
            if exhausted.load(Ordering::Acquire) {
                log::info!("frame source exhausted");
                break;
            }
            if self.max_cycles.is_some_and(|max| summary.cycles_started >= max) {
                break;
            }
            if self.policy == CyclePolicy::Serialized && in_flight.swap(true, Ordering::AcqRel) {
                log::debug!("previous cycle still running, skipping tick");
                summary.ticks_skipped += 1;
                continue;
            }

            summary.cycles_started += 1;
            let session = Arc::clone(&self.session);
            let source = Arc::clone(&self.source);
            let sink = Arc::clone(&self.sink);
            let in_flight = Arc::clone(&in_flight);
            let exhausted = Arc::clone(&exhausted);
            let counters = Arc::clone(&counters);
            cycles.spawn_blocking(move || {
                let _in_flight = InFlightGuard(in_flight);
                match session.run_cycle(&source, &sink) {
                    CycleReport::Exhausted => exhausted.store(true, Ordering::Release),
                    CycleReport::Scanned(outcome) => {
                        if outcome.poster_id().is_some() {
                            counters.recognized.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    CycleReport::Failed(_) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                counters.completed.fetch_add(1, Ordering::Relaxed);
            });
            if self.max_cycles.is_some_and(|max| summary.cycles_started >= max) {
                break;
            }
        }

        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                log::error!("scan cycle panicked: {}", e);
            }
        }
        summary.cycles_completed = counters.completed.load(Ordering::Relaxed);
        summary.recognized = counters.recognized.load(Ordering::Relaxed);
        summary.failed = counters.failed.load(Ordering::Relaxed);
        summary
    }
}
