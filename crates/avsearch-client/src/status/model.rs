//! Processing job data model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::compute_overall_status;
use crate::{ArtifactKey, Error};

/// Status of a single stage, and of a job as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 4] = [
        ProcessingStatus::Pending,
        ProcessingStatus::Running,
        ProcessingStatus::Completed,
        ProcessingStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "PENDING",
            ProcessingStatus::Running => "RUNNING",
            ProcessingStatus::Completed => "COMPLETED",
            ProcessingStatus::Failed => "FAILED",
        }
    }

    /// Completed and failed are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    /// Progress rank used to detect regressions. Both terminal states share
    /// the highest rank.
    fn rank(&self) -> u8 {
        match self {
            ProcessingStatus::Pending => 0,
            ProcessingStatus::Running => 1,
            ProcessingStatus::Completed | ProcessingStatus::Failed => 2,
        }
    }

    /// Whether a stage in this status may move to `next`.
    ///
    /// Terminal statuses never change; otherwise the status may only advance.
    pub fn can_advance_to(&self, next: ProcessingStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ProcessingStatus::Pending),
            "RUNNING" => Ok(ProcessingStatus::Running),
            "COMPLETED" => Ok(ProcessingStatus::Completed),
            "FAILED" => Ok(ProcessingStatus::Failed),
            other => Err(Error::decode(format!("unknown status: {}", other))),
        }
    }
}

/// One step of the processing pipeline, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    VideoProcessing,
    AudioProcessing,
    Transcription,
    Embedding,
    DatabaseWrite,
}

impl Stage {
    pub const COUNT: usize = 5;

    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::VideoProcessing,
        Stage::AudioProcessing,
        Stage::Transcription,
        Stage::Embedding,
        Stage::DatabaseWrite,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Stage::VideoProcessing => "video-processing",
            Stage::AudioProcessing => "audio-processing",
            Stage::Transcription => "transcription",
            Stage::Embedding => "embedding",
            Stage::DatabaseWrite => "database-write",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::VideoProcessing => "Video Processing",
            Stage::AudioProcessing => "Audio Processing",
            Stage::Transcription => "Transcription",
            Stage::Embedding => "Embedding Generation",
            Stage::DatabaseWrite => "Database Storage",
        }
    }

    /// Key used by the status endpoint.
    pub fn wire_key(&self) -> &'static str {
        match self {
            Stage::VideoProcessing => "videoProcessing",
            Stage::AudioProcessing => "audioProcessing",
            Stage::Transcription => "transcription",
            Stage::Embedding => "embedding",
            Stage::DatabaseWrite => "database",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Status of every stage, always complete and in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageStatuses([ProcessingStatus; Stage::COUNT]);

impl StageStatuses {
    /// Every stage in the same status.
    pub fn uniform(status: ProcessingStatus) -> Self {
        Self([status; Stage::COUNT])
    }

    /// Build from statuses given in pipeline order.
    pub fn from_ordered(statuses: [ProcessingStatus; Stage::COUNT]) -> Self {
        Self(statuses)
    }

    pub fn get(&self, stage: Stage) -> ProcessingStatus {
        self.0[stage.index()]
    }

    pub fn set(&mut self, stage: Stage, status: ProcessingStatus) {
        self.0[stage.index()] = status;
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, stage: Stage, status: ProcessingStatus) -> Self {
        self.set(stage, status);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, ProcessingStatus)> + '_ {
        Stage::ALL
            .into_iter()
            .map(move |stage| (stage, self.get(stage)))
    }

    pub fn statuses(&self) -> impl Iterator<Item = ProcessingStatus> + '_ {
        self.0.iter().copied()
    }
}

impl Default for StageStatuses {
    fn default() -> Self {
        Self::uniform(ProcessingStatus::Pending)
    }
}

impl Serialize for StageStatuses {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(Stage::COUNT))?;
        for (stage, status) in self.iter() {
            map.serialize_entry(stage.id(), &status)?;
        }
        map.end()
    }
}

/// Timing and detail text for one execution step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDetail {
    pub name: String,
    pub status: ProcessingStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub detail: String,
}

impl StepDetail {
    /// Wall time of the step, when it has both started and ended.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }
}

/// Backend execution information attached to a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub video_file: Option<String>,
    pub steps: Vec<StepDetail>,
}

impl ExecutionMetadata {
    /// Extract the execution id from an execution ARN (its last `:` segment).
    pub fn execution_id_from_arn(arn: &str) -> &str {
        arn.rsplit(':').next().unwrap_or(arn)
    }

    /// Time elapsed since the execution started.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }
}

/// Processing state of one tracked artifact.
///
/// The overall status is always derived from the stage list; it cannot be set
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    artifact: ArtifactKey,
    overall: ProcessingStatus,
    stages: StageStatuses,
    execution: Option<ExecutionMetadata>,
}

impl JobStatus {
    pub fn new(
        artifact: ArtifactKey,
        stages: StageStatuses,
        execution: Option<ExecutionMetadata>,
    ) -> Self {
        Self {
            artifact,
            overall: compute_overall_status(stages.statuses()),
            stages,
            execution,
        }
    }

    pub fn artifact(&self) -> &ArtifactKey {
        &self.artifact
    }

    pub fn overall(&self) -> ProcessingStatus {
        self.overall
    }

    pub fn stages(&self) -> &StageStatuses {
        &self.stages
    }

    pub fn stage(&self, stage: Stage) -> ProcessingStatus {
        self.stages.get(stage)
    }

    pub fn execution(&self) -> Option<&ExecutionMetadata> {
        self.execution.as_ref()
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.execution.as_ref().map(|e| e.execution_id.as_str())
    }

    /// Whether the job has reached a final overall status.
    pub fn is_terminal(&self) -> bool {
        self.overall.is_terminal()
    }

    pub(crate) fn set_stages(&mut self, stages: StageStatuses) {
        self.overall = compute_overall_status(stages.statuses());
        self.stages = stages;
    }
}
