//! Aggregate status derivation.
//!
//! # Dominance rule
//!
//! - any stage `FAILED` → `FAILED` (failure dominates completion)
//! - every stage `COMPLETED` → `COMPLETED`
//! - otherwise → `RUNNING`
//!
//! An empty stage list has no progress to report and yields `PENDING`.

use tracing::warn;

use super::model::{JobStatus, ProcessingStatus, Stage, StageStatuses};

/// Derive the overall status of a job from its stage statuses.
///
/// Pure: the result depends only on the input.
pub fn compute_overall_status<I>(stages: I) -> ProcessingStatus
where
    I: IntoIterator<Item = ProcessingStatus>,
{
    let mut any = false;
    let mut all_completed = true;

    for status in stages {
        any = true;
        match status {
            ProcessingStatus::Failed => return ProcessingStatus::Failed,
            ProcessingStatus::Completed => {}
            ProcessingStatus::Pending | ProcessingStatus::Running => all_completed = false,
        }
    }

    if !any {
        ProcessingStatus::Pending
    } else if all_completed {
        ProcessingStatus::Completed
    } else {
        ProcessingStatus::Running
    }
}

/// A stage whose fetched status would have moved backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regression {
    pub stage: Stage,
    pub kept: ProcessingStatus,
    pub rejected: ProcessingStatus,
}

/// Result of merging a freshly fetched status into the cached one.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub status: JobStatus,
    pub regressions: Vec<Regression>,
}

/// Merge `next` into `previous`, keeping stage statuses monotonic.
///
/// When both describe the same execution of the same artifact, any stage that
/// would regress keeps its earlier value and the overall status is derived
/// again. A different artifact or execution id is a different job, so `next`
/// is taken as-is.
pub fn merge_monotonic(previous: Option<&JobStatus>, next: JobStatus) -> MergeOutcome {
    let Some(previous) = previous else {
        return MergeOutcome {
            status: next,
            regressions: Vec::new(),
        };
    };

    if !same_job(previous, &next) {
        return MergeOutcome {
            status: next,
            regressions: Vec::new(),
        };
    }

    let mut stages: StageStatuses = *next.stages();
    let mut regressions = Vec::new();

    for (stage, kept) in previous.stages().iter() {
        let fetched = stages.get(stage);
        if !kept.can_advance_to(fetched) {
            warn!(
                artifact = %next.artifact(),
                stage = %stage,
                "Ignoring stage regression {} -> {}",
                kept,
                fetched
            );
            stages.set(stage, kept);
            regressions.push(Regression {
                stage,
                kept,
                rejected: fetched,
            });
        }
    }

    let mut status = next;
    if !regressions.is_empty() {
        status.set_stages(stages);
    }

    MergeOutcome {
        status,
        regressions,
    }
}

fn same_job(previous: &JobStatus, next: &JobStatus) -> bool {
    if previous.artifact() != next.artifact() {
        return false;
    }
    match (previous.execution_id(), next.execution_id()) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}
