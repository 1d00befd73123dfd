//! Status poller implementation.
//!
//! Each subscription runs one self-scheduling task: fetch, apply, sleep, fetch
//! again. A fetch is awaited before the next one is scheduled, so there is
//! never more than one request in flight per subscription.
//!
//! Results are applied under the subscription's state lock after checking the
//! cancellation token and the generation counter. [`PollSubscription::stop`]
//! cancels the token and then takes the same lock, so once it returns no
//! fetch result can reach the cached state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, broadcast};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::{BackoffConfig, FailureTracker};
use super::events::{PollEvent, PollEventBroadcaster};
use crate::api::StatusSource;
use crate::config::{ClientConfig, validate_poll_interval};
use crate::status::merge_monotonic;
use crate::{ArtifactKey, Error, JobStatus, Result};

/// Roughly 30 years; used when an interval does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Configuration for the status poller.
#[derive(Debug, Clone)]
pub struct StatusPollerConfig {
    /// Retry policy for failed fetches.
    pub backoff: BackoffConfig,
    /// Stop once the job reaches a final status.
    pub stop_when_terminal: bool,
    /// Event channel capacity per subscription.
    pub event_capacity: usize,
}

impl Default for StatusPollerConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            stop_when_terminal: false,
            event_capacity: 64,
        }
    }
}

impl From<&ClientConfig> for StatusPollerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            backoff: config.backoff.clone(),
            stop_when_terminal: config.stop_when_terminal,
            ..Self::default()
        }
    }
}

/// Point-in-time view of a subscription, handed out by value.
#[derive(Debug, Clone, Serialize)]
pub struct PollSnapshot {
    pub artifact: ArtifactKey,
    /// Last successfully fetched status. Survives fetch errors.
    pub status: Option<JobStatus>,
    /// Message of the most recent failed fetch, cleared on success.
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub interval_secs: u64,
    pub generation: u64,
    pub active: bool,
}

impl PollSnapshot {
    /// Whether the displayed status may be out of date.
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }
}

/// State shared between a subscription handle and its task.
struct PollState {
    artifact: ArtifactKey,
    generation: u64,
    status: Option<JobStatus>,
    last_error: Option<String>,
    consecutive_failures: u32,
    last_updated: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    interval: Duration,
    refresh_requested: bool,
    active: bool,
}

impl PollState {
    fn snapshot(&self) -> PollSnapshot {
        PollSnapshot {
            artifact: self.artifact.clone(),
            status: self.status.clone(),
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
            last_updated: self.last_updated,
            last_attempt: self.last_attempt,
            interval_secs: self.interval.as_secs(),
            generation: self.generation,
            active: self.active,
        }
    }
}

struct Shared {
    state: Mutex<PollState>,
    cancellation: CancellationToken,
    wake: Notify,
    events: PollEventBroadcaster,
}

/// What the task does after applying a fetch result.
enum Next {
    Wait,
    FetchNow,
    Exit,
}

/// The status poller.
///
/// Cheap to clone; every subscription gets its own task and state.
#[derive(Clone)]
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    config: StatusPollerConfig,
}

impl StatusPoller {
    /// Create a new poller with default configuration.
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self::with_config(source, StatusPollerConfig::default())
    }

    /// Create a new poller with custom configuration.
    pub fn with_config(source: Arc<dyn StatusSource>, config: StatusPollerConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &StatusPollerConfig {
        &self.config
    }

    /// Perform exactly one status query, outside of any subscription.
    pub async fn fetch_once(&self, artifact: &ArtifactKey) -> Result<JobStatus> {
        debug!(artifact = %artifact, "Fetching status");
        let status = self.source.fetch_status(artifact).await?;
        ensure_artifact(artifact, &status)?;
        Ok(status)
    }

    /// Start polling `artifact` every `interval_secs` seconds.
    ///
    /// The first fetch is issued immediately. Must be called from within a
    /// tokio runtime.
    pub fn start_polling(&self, artifact: ArtifactKey, interval_secs: u64) -> Result<PollSubscription> {
        validate_poll_interval(interval_secs)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(PollState {
                artifact: artifact.clone(),
                generation: 0,
                status: None,
                last_error: None,
                consecutive_failures: 0,
                last_updated: None,
                last_attempt: None,
                interval: Duration::from_secs(interval_secs),
                refresh_requested: false,
                active: true,
            }),
            cancellation: CancellationToken::new(),
            wake: Notify::new(),
            events: PollEventBroadcaster::with_capacity(self.config.event_capacity.max(1)),
        });

        info!(artifact = %artifact, interval_secs, "Starting status polling");

        let task = PollTask {
            shared: shared.clone(),
            source: self.source.clone(),
            tracker: FailureTracker::new(self.config.backoff.clone()),
            generation: 0,
            stop_when_terminal: self.config.stop_when_terminal,
        };
        let handle = tokio::spawn(task.run());

        Ok(PollSubscription {
            shared,
            task: Some(handle),
        })
    }

    /// Stop a subscription. See [`PollSubscription::stop`].
    pub fn stop_polling(&self, subscription: PollSubscription) -> PollSnapshot {
        subscription.stop()
    }
}

/// Handle to a running poll. Dropping it stops the poll.
pub struct PollSubscription {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl PollSubscription {
    /// Current cached state.
    pub fn snapshot(&self) -> PollSnapshot {
        self.shared.state.lock().snapshot()
    }

    /// Last successfully fetched status, if any.
    pub fn status(&self) -> Option<JobStatus> {
        self.shared.state.lock().status.clone()
    }

    pub fn artifact(&self) -> ArtifactKey {
        self.shared.state.lock().artifact.clone()
    }

    /// Whether the poll task is still scheduling fetches.
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().active
    }

    /// Receive events for this subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.shared.events.subscribe()
    }

    /// Ask for a fetch now instead of at the next interval.
    ///
    /// If a fetch is already in flight, one more fetch follows it; repeated
    /// requests while it runs are coalesced.
    pub fn refresh_now(&self) {
        self.shared.state.lock().refresh_requested = true;
        self.shared.wake.notify_one();
    }

    /// Change the poll interval. Takes effect for the wait in progress.
    pub fn set_interval(&self, interval_secs: u64) -> Result<()> {
        validate_poll_interval(interval_secs)?;
        self.shared.state.lock().interval = Duration::from_secs(interval_secs);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Track a different artifact.
    ///
    /// The cached status is cleared and a fetch is issued right away. A
    /// response for the previous artifact that arrives later is discarded.
    pub fn retarget(&self, artifact: ArtifactKey) {
        {
            let mut state = self.shared.state.lock();
            if state.artifact == artifact {
                return;
            }
            info!(from = %state.artifact, to = %artifact, "Retargeting status polling");
            state.artifact = artifact;
            state.generation += 1;
            state.status = None;
            state.last_error = None;
            state.consecutive_failures = 0;
            state.last_updated = None;
            state.refresh_requested = true;
        }
        self.shared.wake.notify_one();
    }

    /// Stop polling.
    ///
    /// After this returns, no in-flight or future fetch can change the cached
    /// state. Returns the final snapshot.
    pub fn stop(mut self) -> PollSnapshot {
        self.shutdown()
    }

    /// Stop polling and wait for the task to exit.
    pub async fn stop_and_wait(mut self) -> PollSnapshot {
        let snapshot = self.shutdown();
        if let Some(task) = self.task.take() {
            self.reap(task.await);
        }
        snapshot
    }

    /// Wait until the task exits on its own (finished, gave up) or is stopped.
    pub async fn wait(&mut self) -> PollSnapshot {
        if let Some(task) = self.task.as_mut() {
            let result = task.await;
            self.task = None;
            self.reap(result);
        }
        self.snapshot()
    }

    /// Report a poll task that panicked and mark the subscription inactive.
    fn reap(&self, result: std::result::Result<(), JoinError>) {
        if let Err(e) = result {
            if e.is_panic() {
                let mut state = self.shared.state.lock();
                warn!(artifact = %state.artifact, "Status poll task panicked: {}", e);
                state.active = false;
            }
        }
    }

    fn shutdown(&mut self) -> PollSnapshot {
        self.shared.cancellation.cancel();

        let mut state = self.shared.state.lock();
        if state.active {
            state.active = false;
            state.generation += 1;
            info!(artifact = %state.artifact, "Stopped status polling");
            self.shared.events.publish(PollEvent::Stopped {
                artifact: state.artifact.clone(),
                timestamp: Utc::now(),
            });
        }
        state.snapshot()
    }
}

impl Drop for PollSubscription {
    fn drop(&mut self) {
        self.shared.cancellation.cancel();
    }
}

struct PollTask {
    shared: Arc<Shared>,
    source: Arc<dyn StatusSource>,
    tracker: FailureTracker,
    /// Generation the tracker's failure count belongs to.
    generation: u64,
    stop_when_terminal: bool,
}

impl PollTask {
    async fn run(mut self) {
        loop {
            if self.shared.cancellation.is_cancelled() {
                break;
            }

            let (artifact, generation) = {
                let mut state = self.shared.state.lock();
                state.refresh_requested = false;
                state.last_attempt = Some(Utc::now());
                (state.artifact.clone(), state.generation)
            };
            let started = Instant::now();

            let result = tokio::select! {
                biased;

                _ = self.shared.cancellation.cancelled() => break,

                result = self.source.fetch_status(&artifact) => result,
            };

            match self.apply(&artifact, generation, result) {
                Next::Exit => break,
                Next::FetchNow => continue,
                Next::Wait => {}
            }

            if !self.wait_until_due(started).await {
                break;
            }
        }
        debug!("Status poll task exiting");
    }

    /// Apply a fetch result to the shared state.
    fn apply(&mut self, artifact: &ArtifactKey, generation: u64, result: Result<JobStatus>) -> Next {
        let mut state = self.shared.state.lock();

        if self.shared.cancellation.is_cancelled() {
            debug!(artifact = %artifact, "Discarding status fetched after stop");
            return Next::Exit;
        }
        if state.generation != generation {
            debug!(
                artifact = %artifact,
                generation,
                current = state.generation,
                "Discarding status for previous target"
            );
            return Next::FetchNow;
        }
        if self.generation != generation {
            // Failures of the previous target do not count against this one.
            self.tracker.record_success();
            self.generation = generation;
        }

        let result = result.and_then(|status| ensure_artifact(artifact, &status).map(|_| status));
        let now = Utc::now();

        match result {
            Ok(status) => {
                self.tracker.record_success();

                let outcome = merge_monotonic(state.status.as_ref(), status);
                let changed = state.status.as_ref() != Some(&outcome.status);
                if changed {
                    debug!(
                        artifact = %artifact,
                        overall = %outcome.status.overall(),
                        "Status changed"
                    );
                }

                let terminal = outcome.status.is_terminal();
                let overall = outcome.status.overall();
                state.status = Some(outcome.status.clone());
                state.last_error = None;
                state.consecutive_failures = 0;
                state.last_updated = Some(now);

                self.shared.events.publish(PollEvent::Updated {
                    artifact: artifact.clone(),
                    status: outcome.status,
                    changed,
                    timestamp: now,
                });

                if terminal && self.stop_when_terminal {
                    info!(artifact = %artifact, overall = %overall, "Job finished, stopping status polling");
                    state.active = false;
                    self.shared.events.publish(PollEvent::Finished {
                        artifact: artifact.clone(),
                        overall,
                        timestamp: now,
                    });
                    return Next::Exit;
                }
            }
            Err(e) => {
                let failures = self.tracker.record_failure(artifact.as_str());
                warn!(artifact = %artifact, "Status fetch failed: {}", e);

                state.last_error = Some(e.to_string());
                state.consecutive_failures = failures;

                self.shared.events.publish(PollEvent::FetchFailed {
                    artifact: artifact.clone(),
                    error_message: e.to_string(),
                    transient: e.is_transient(),
                    consecutive_failures: failures,
                    timestamp: now,
                });

                if self.tracker.should_give_up() {
                    warn!(
                        artifact = %artifact,
                        "Giving up on status polling after {} consecutive failures",
                        failures
                    );
                    state.active = false;
                    self.shared.events.publish(PollEvent::GaveUp {
                        artifact: artifact.clone(),
                        consecutive_failures: failures,
                        timestamp: now,
                    });
                    return Next::Exit;
                }
            }
        }

        if state.refresh_requested {
            Next::FetchNow
        } else {
            Next::Wait
        }
    }

    /// Sleep until the next fetch is due, measured from the start of the
    /// previous one. Returns `false` when cancelled.
    async fn wait_until_due(&self, started: Instant) -> bool {
        loop {
            let (delay, refresh) = {
                let state = self.shared.state.lock();
                (self.tracker.next_delay(state.interval), state.refresh_requested)
            };
            if refresh {
                return true;
            }

            tokio::select! {
                biased;

                _ = self.shared.cancellation.cancelled() => return false,

                // Interval change, refresh request or retarget: re-evaluate.
                _ = self.shared.wake.notified() => continue,

                _ = tokio::time::sleep_until(deadline(started, delay)) => return true,
            }
        }
    }
}

/// `started + delay`, saturating to a far-future instant for huge intervals.
fn deadline(started: Instant, delay: Duration) -> Instant {
    started
        .checked_add(delay)
        .unwrap_or_else(|| started + FAR_FUTURE)
}

fn ensure_artifact(expected: &ArtifactKey, status: &JobStatus) -> Result<()> {
    if status.artifact() != expected {
        return Err(Error::decode(format!(
            "status for {} returned while querying {}",
            status.artifact(),
            expected
        )));
    }
    Ok(())
}
