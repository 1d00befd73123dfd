//! Wire formats of the processing API.
//!
//! These mirror the JSON bodies exchanged with the backend and are converted
//! into the crate's domain types at the client boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::search::{SearchContent, SearchHit};
use crate::status::{ExecutionMetadata, JobStatus, ProcessingStatus, StageStatuses, StepDetail};
use crate::ArtifactKey;

fn pending() -> ProcessingStatus {
    ProcessingStatus::Pending
}

/// Body of `GET /status/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: StageStatusBody,
    #[serde(default)]
    pub execution_details: Option<ExecutionDetailsBody>,
}

/// Per-stage statuses as reported by the backend. Missing stages are pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStatusBody {
    /// Overall status as reported. Informational only; the client derives
    /// its own from the stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<String>,
    #[serde(default = "pending")]
    pub video_processing: ProcessingStatus,
    #[serde(default = "pending")]
    pub audio_processing: ProcessingStatus,
    #[serde(default = "pending")]
    pub transcription: ProcessingStatus,
    #[serde(default = "pending")]
    pub embedding: ProcessingStatus,
    #[serde(default = "pending")]
    pub database: ProcessingStatus,
}

impl StageStatusBody {
    pub fn stages(&self) -> StageStatuses {
        StageStatuses::from_ordered([
            self.video_processing,
            self.audio_processing,
            self.transcription,
            self.embedding,
            self.database,
        ])
    }
}

impl From<&StageStatuses> for StageStatusBody {
    fn from(stages: &StageStatuses) -> Self {
        use crate::status::{Stage, compute_overall_status};

        Self {
            overall: Some(compute_overall_status(stages.statuses()).to_string()),
            video_processing: stages.get(Stage::VideoProcessing),
            audio_processing: stages.get(Stage::AudioProcessing),
            transcription: stages.get(Stage::Transcription),
            embedding: stages.get(Stage::Embedding),
            database: stages.get(Stage::DatabaseWrite),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetailsBody {
    pub execution_arn: String,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub video_file: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepBody {
    pub name: String,
    pub status: ProcessingStatus,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: String,
}

impl StatusResponse {
    /// Convert into a [`JobStatus`] for `artifact`.
    pub fn into_job_status(self, artifact: ArtifactKey) -> JobStatus {
        let stages = self.status.stages();
        let execution = self.execution_details.map(|details| ExecutionMetadata {
            execution_id: ExecutionMetadata::execution_id_from_arn(&details.execution_arn)
                .to_string(),
            started_at: details.start_date,
            video_file: details.video_file,
            steps: details
                .steps
                .into_iter()
                .map(|step| StepDetail {
                    name: step.name,
                    status: step.status,
                    started_at: step.start_time,
                    ended_at: step.end_time,
                    detail: step.details,
                })
                .collect(),
        });

        let job = JobStatus::new(artifact, stages, execution);
        if let Some(reported) = self.status.overall.as_deref()
            && !reported.eq_ignore_ascii_case(job.overall().as_str())
        {
            debug!(
                artifact = %job.artifact(),
                "Backend reported overall {} but stages give {}",
                reported,
                job.overall()
            );
        }
        job
    }
}

/// Body of `POST /process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub s3_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub execution_arn: String,
}

/// Body of `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequestBody {
    pub query: String,
    pub limit: u32,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResultBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultBody {
    #[serde(default)]
    pub id: Option<String>,
    pub video_id: String,
    pub video_name: String,
    pub timestamp: f64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub frame_url: Option<String>,
    pub similarity: f64,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
}

impl SearchResultBody {
    /// Convert into a [`SearchHit`]. Results with neither text nor a frame
    /// reference are dropped.
    pub fn into_hit(self, index: usize) -> Option<SearchHit> {
        let is_image = self.kind.as_deref() == Some("image");
        let content = match (is_image, self.text, self.frame_url) {
            (true, _, Some(frame)) => SearchContent::Image {
                image_reference: frame,
            },
            (_, Some(text), _) => SearchContent::Text {
                matched_text: text,
                speaker: self.speaker,
            },
            (false, None, Some(frame)) => SearchContent::Image {
                image_reference: frame,
            },
            _ => return None,
        };

        Some(SearchHit {
            id: self.id.unwrap_or_else(|| format!("result-{}", index + 1)),
            source_artifact_id: self.video_id,
            source_name: self.video_name,
            timestamp_seconds: self.timestamp.max(0.0),
            content,
            similarity: self.similarity,
        })
    }
}

/// Body of `GET /transcript/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResponse {
    #[serde(default)]
    pub transcript: Vec<crate::transcript::TranscriptSegment>,
}

/// Body of a storage listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageListResponse {
    #[serde(default)]
    pub items: Vec<StoredObjectBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObjectBody {
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadUrlResponse {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Stage;

    const STATUS_BODY: &str = r#"{
        "status": {
            "overall": "RUNNING",
            "videoProcessing": "COMPLETED",
            "audioProcessing": "COMPLETED",
            "transcription": "RUNNING",
            "embedding": "PENDING",
            "database": "PENDING"
        },
        "executionDetails": {
            "executionArn": "arn:aws:states:us-east-1:123456789012:execution:VideoProcessingWorkflow:abc123",
            "startDate": "2024-05-01T10:00:00Z",
            "videoFile": "video_in/1-demo.mp4",
            "steps": [
                {
                    "name": "Extract Video Frames",
                    "status": "COMPLETED",
                    "startTime": "2024-05-01T10:00:00Z",
                    "endTime": "2024-05-01T10:01:00Z",
                    "details": "Extracted 120 frames from video"
                },
                {
                    "name": "Store in Database",
                    "status": "PENDING",
                    "startTime": null,
                    "endTime": null,
                    "details": "Storing vectors"
                }
            ]
        }
    }"#;

    #[test]
    fn test_status_response_conversion() {
        let response: StatusResponse = serde_json::from_str(STATUS_BODY).unwrap();
        let key = ArtifactKey::new("video_in/1-demo.mp4").unwrap();
        let job = response.into_job_status(key.clone());

        assert_eq!(job.artifact(), &key);
        assert_eq!(job.overall(), ProcessingStatus::Running);
        assert_eq!(job.stage(Stage::Transcription), ProcessingStatus::Running);
        assert_eq!(job.execution_id(), Some("abc123"));

        let execution = job.execution().unwrap();
        assert_eq!(execution.steps.len(), 2);
        assert_eq!(
            execution.steps[0].duration(),
            Some(chrono::Duration::seconds(60))
        );
        assert_eq!(execution.steps[1].started_at, None);
    }

    #[test]
    fn test_overall_is_derived_not_trusted() {
        let body = r#"{"status": {"overall": "COMPLETED", "videoProcessing": "COMPLETED",
            "audioProcessing": "FAILED", "transcription": "COMPLETED",
            "embedding": "COMPLETED", "database": "COMPLETED"}}"#;
        let response: StatusResponse = serde_json::from_str(body).unwrap();
        let job = response.into_job_status(ArtifactKey::new("k.mp4").unwrap());
        assert_eq!(job.overall(), ProcessingStatus::Failed);
        assert!(job.execution().is_none());
    }

    #[test]
    fn test_missing_stages_are_pending() {
        let body = r#"{"status": {"videoProcessing": "RUNNING"}}"#;
        let response: StatusResponse = serde_json::from_str(body).unwrap();
        let job = response.into_job_status(ArtifactKey::new("k.mp4").unwrap());
        assert_eq!(job.stage(Stage::DatabaseWrite), ProcessingStatus::Pending);
        assert_eq!(job.overall(), ProcessingStatus::Running);
    }

    #[test]
    fn test_unknown_stage_status_rejected() {
        let body = r#"{"status": {"videoProcessing": "EXPLODED"}}"#;
        assert!(serde_json::from_str::<StatusResponse>(body).is_err());
    }

    #[test]
    fn test_search_result_conversion() {
        let text: SearchResultBody = serde_json::from_value(serde_json::json!({
            "id": "result-1",
            "videoId": "video-1",
            "videoName": "Company Meeting.mp4",
            "timestamp": 125,
            "text": "We need to focus on customer satisfaction.",
            "similarity": 0.92,
            "type": "text",
            "speaker": "John Smith"
        }))
        .unwrap();
        let hit = text.into_hit(0).unwrap();
        assert_eq!(hit.id, "result-1");
        assert_eq!(hit.timestamp_seconds, 125.0);
        assert!(matches!(
            hit.content,
            SearchContent::Text { ref speaker, .. } if speaker.as_deref() == Some("John Smith")
        ));

        let image: SearchResultBody = serde_json::from_value(serde_json::json!({
            "videoId": "video-3",
            "videoName": "Brainstorm.mp4",
            "timestamp": 512,
            "frameUrl": "https://example.com/frame123.jpg",
            "similarity": 0.79,
            "type": "image"
        }))
        .unwrap();
        let hit = image.into_hit(3).unwrap();
        assert_eq!(hit.id, "result-4");
        assert!(matches!(hit.content, SearchContent::Image { .. }));

        let empty: SearchResultBody = serde_json::from_value(serde_json::json!({
            "videoId": "v", "videoName": "n", "timestamp": 1, "similarity": 0.5
        }))
        .unwrap();
        assert!(empty.into_hit(0).is_none());
    }

    #[test]
    fn test_stage_body_from_stages() {
        let stages = StageStatuses::uniform(ProcessingStatus::Completed);
        let body = StageStatusBody::from(&stages);
        assert_eq!(body.overall.as_deref(), Some("COMPLETED"));
        assert_eq!(body.stages(), stages);
    }
}
