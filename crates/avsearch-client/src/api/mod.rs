//! Processing API access.
//!
//! [`StatusSource`] is the seam between the poller and the backend: the
//! HTTP [`ApiClient`] implements it for production, and
//! [`ScriptedStatusSource`](crate::testing::ScriptedStatusSource) for tests.

mod client;
pub mod models;

use async_trait::async_trait;

use crate::{ArtifactKey, JobStatus, Result};

pub use client::{ApiClient, ProcessingTicket, TicketState};
pub(crate) use client::{authorize, build_http_client, check_response};

/// Something that can report the processing status of an artifact.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Perform exactly one status query.
    ///
    /// An `Err` means the status is unknown. A job whose stages failed is an
    /// `Ok` status with a failed overall status.
    async fn fetch_status(&self, artifact: &ArtifactKey) -> Result<JobStatus>;
}
