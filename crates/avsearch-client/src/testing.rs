//! Deterministic test doubles.
//!
//! [`ScriptedStatusSource`] replays a fixed list of responses in order and
//! repeats the last one once the list is exhausted. It records how many
//! fetches were made and the highest number that were in flight at once.
//! [`MemoryObjectStore`] keeps uploaded objects in memory.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::api::StatusSource;
use crate::storage::{ObjectStore, ProgressCallback, StoredObject, UploadProgress};
use crate::status::{JobStatus, ProcessingStatus, Stage, StageStatuses};
use crate::{ArtifactKey, Error, Result};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Respond with these stage statuses.
    Stages(StageStatuses),
    /// Fail with a transient backend error (503).
    Unavailable,
    /// Fail with a permanent backend error (404).
    Rejected,
}

impl ScriptStep {
    /// Video and audio done, transcription running, the rest pending.
    pub fn running() -> Self {
        ScriptStep::Stages(
            StageStatuses::default()
                .with(Stage::VideoProcessing, ProcessingStatus::Completed)
                .with(Stage::AudioProcessing, ProcessingStatus::Completed)
                .with(Stage::Transcription, ProcessingStatus::Running),
        )
    }

    /// Every stage completed.
    pub fn completed() -> Self {
        ScriptStep::Stages(StageStatuses::uniform(ProcessingStatus::Completed))
    }

    /// Audio processing failed, everything else completed.
    pub fn failed_stage() -> Self {
        ScriptStep::Stages(
            StageStatuses::uniform(ProcessingStatus::Completed)
                .with(Stage::AudioProcessing, ProcessingStatus::Failed),
        )
    }
}

/// A [`StatusSource`] that replays a script.
pub struct ScriptedStatusSource {
    script: Mutex<VecDeque<ScriptStep>>,
    last: Mutex<Option<ScriptStep>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedStatusSource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make every fetch take `delay` before responding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Append steps to the script.
    pub fn push(&self, step: ScriptStep) {
        self.script.lock().push_back(step);
    }

    /// Number of fetches started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> ScriptStep {
        let mut last = self.last.lock();
        match self.script.lock().pop_front() {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(ScriptStep::Unavailable),
        }
    }
}

/// Decrements the in-flight counter even when the fetch is cancelled.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusSource for ScriptedStatusSource {
    async fn fetch_status(&self, artifact: &ArtifactKey) -> Result<JobStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.next_step() {
            ScriptStep::Stages(stages) => Ok(JobStatus::new(artifact.clone(), stages, None)),
            ScriptStep::Unavailable => Err(Error::backend(503, "service unavailable")),
            ScriptStep::Rejected => Err(Error::backend(404, "no execution for artifact")),
        }
    }
}

/// An [`ObjectStore`] held in memory, listed in key order.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly. Panics on an invalid key.
    pub fn insert(&self, key: &str, body: &[u8]) {
        let key = ArtifactKey::new(key).expect("valid test key");
        self.objects.lock().insert(
            key.to_string(),
            (Bytes::copy_from_slice(body), "video/mp4".to_string()),
        );
    }

    /// Body and content type of a stored object.
    pub fn get(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        self.objects
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (body, _))| {
                Ok(StoredObject {
                    key: ArtifactKey::new(key.as_str())?,
                    size: body.len() as u64,
                    last_modified: None,
                })
            })
            .collect()
    }

    async fn put(
        &self,
        key: &ArtifactKey,
        body: Bytes,
        content_type: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let total = body.len() as u64;
        self.objects
            .lock()
            .insert(key.to_string(), (body, content_type.to_string()));
        if let Some(progress) = progress {
            progress(UploadProgress {
                loaded: total,
                total,
            });
        }
        Ok(())
    }

    async fn download_url(&self, key: &ArtifactKey) -> Result<String> {
        if !self.objects.lock().contains_key(key.as_str()) {
            return Err(Error::backend(404, format!("no object {}", key)));
        }
        Ok(format!("memory://{}", key))
    }
}
