use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::StatusSource;
use super::models::{
    ProcessRequest, ProcessResponse, SearchRequestBody, SearchResponse, StatusResponse,
    TranscriptResponse,
};
use crate::search::{SearchHit, SearchQuery, rank_hits};
use crate::session::SessionProvider;
use crate::status::ExecutionMetadata;
use crate::transcript::TranscriptSegment;
use crate::{ArtifactKey, ClientConfig, Error, JobStatus, Result};

/// State of a freshly submitted processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketState {
    Started,
}

/// Acknowledgement of a processing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTicket {
    pub key: ArtifactKey,
    pub execution_id: String,
    pub status: TicketState,
}

/// HTTP client for the processing API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
    session: Arc<dyn SessionProvider>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        config.validate()?;
        let client = build_http_client(&config)?;
        Ok(Self {
            client,
            config,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Submit an uploaded artifact for processing.
    pub async fn start_processing(&self, key: &ArtifactKey) -> Result<ProcessingTicket> {
        if self.config.bucket.trim().is_empty() {
            return Err(Error::validation(
                "a bucket name is required to start processing",
            ));
        }

        let url = self.config.url("process")?;
        let body = ProcessRequest {
            s3_uri: format!("s3://{}/{}", self.config.bucket, key),
        };
        debug!(artifact = %key, "Starting processing via {}", url);

        let request = authorize(self.client.post(url).json(&body), self.session.as_ref()).await?;
        let response: ProcessResponse = check_response(request.send().await?).await?.json().await?;

        let execution_id = ExecutionMetadata::execution_id_from_arn(&response.execution_arn);
        if execution_id.is_empty() {
            return Err(Error::decode("processing response has an empty execution id"));
        }

        info!(artifact = %key, execution_id, "Processing started");
        Ok(ProcessingTicket {
            key: key.clone(),
            execution_id: execution_id.to_string(),
            status: TicketState::Started,
        })
    }

    /// Run a similarity search. Hits are filtered and ordered locally.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        query.validate()?;

        let url = self.config.url("search")?;
        let body = SearchRequestBody {
            query: query.text.trim().to_string(),
            limit: query.limit,
            threshold: query.threshold,
        };

        let request = authorize(self.client.post(url).json(&body), self.session.as_ref()).await?;
        let response: SearchResponse = check_response(request.send().await?).await?.json().await?;

        let received = response.results.len();
        let hits: Vec<SearchHit> = response
            .results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| result.into_hit(index))
            .collect();
        if hits.len() < received {
            warn!(
                "Dropped {} search results without content",
                received - hits.len()
            );
        }

        Ok(rank_hits(hits, query))
    }

    /// Fetch the transcript of a processed video.
    pub async fn transcript(&self, key: &ArtifactKey) -> Result<Vec<TranscriptSegment>> {
        let url = self.config.url(&format!("transcript/{}", key.url_encoded()))?;
        let request = authorize(self.client.get(url), self.session.as_ref()).await?;
        let response: TranscriptResponse =
            check_response(request.send().await?).await?.json().await?;
        Ok(response.transcript)
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, artifact: &ArtifactKey) -> Result<JobStatus> {
        let url = self.config.url(&format!("status/{}", artifact.url_encoded()))?;
        let request = authorize(self.client.get(url), self.session.as_ref()).await?;
        let response = check_response(request.send().await?).await?;

        let bytes = response.bytes().await?;
        let body: StatusResponse = serde_json::from_slice(&bytes)
            .map_err(|e| Error::decode(format!("status response for {}: {}", artifact, e)))?;
        Ok(body.into_job_status(artifact.clone()))
    }
}

pub(crate) fn build_http_client(config: &ClientConfig) -> Result<Client> {
    Ok(Client::builder()
        .timeout(config.request_timeout)
        .user_agent(concat!("avsearch-client/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Attach the session's bearer token, if any.
pub(crate) async fn authorize(
    request: RequestBuilder,
    session: &dyn SessionProvider,
) -> Result<RequestBuilder> {
    Ok(match session.id_token().await? {
        Some(token) => request.bearer_auth(token),
        None => request,
    })
}

/// Turn a non-2xx response into [`Error::Backend`].
pub(crate) async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body
    };
    Err(Error::backend(status.as_u16(), message))
}
