//! Processing status model.
//!
//! A submitted video goes through five stages (video processing, audio
//! processing, transcription, embedding, database write). Each stage reports
//! its own status; the job's overall status is derived from them.

mod aggregate;
mod model;

pub use aggregate::{MergeOutcome, Regression, compute_overall_status, merge_monotonic};
pub use model::{
    ExecutionMetadata, JobStatus, ProcessingStatus, Stage, StageStatuses, StepDetail,
};
