use crate::cli::OutputFormat;
use crate::config::{AppConfig, Overrides};
use crate::error::{CliError, Result};
use crate::output::{OutputManager, write_output};
use avsearch_client::api::StatusSource;
use avsearch_client::library::list_videos;
use avsearch_client::poller::{PollEvent, StatusPollerConfig};
use avsearch_client::search::SearchQuery;
use avsearch_client::session::{AnonymousSession, SessionProvider, StaticSession};
use avsearch_client::storage::{HttpObjectStore, ProgressCallback, UploadProgress};
use avsearch_client::upload::{UploadCandidate, upload_and_process};
use avsearch_client::{ApiClient, ArtifactKey, ClientConfig, ProcessingStatus, StatusPoller};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub struct CommandExecutor {
    config: AppConfig,
    overrides: Overrides,
    output: OutputManager,
}

/// Options for `watch`.
pub struct WatchOptions {
    pub interval: Option<u64>,
    pub follow: bool,
    pub give_up_after: Option<u32>,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, overrides: Overrides) -> Self {
        let output = OutputManager::new(config.colored_output);
        Self {
            config,
            overrides,
            output,
        }
    }

    fn client_config(&self) -> Result<ClientConfig> {
        self.config.client_config(&self.overrides)
    }

    fn session(&self) -> Arc<dyn SessionProvider> {
        match self.config.token(&self.overrides) {
            Some(token) => Arc::new(StaticSession::from_token(token)),
            None => {
                debug!("No token configured, sending requests without credentials");
                Arc::new(AnonymousSession)
            }
        }
    }

    fn api(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(self.client_config()?, self.session())?)
    }

    pub async fn status(&self, key: &str, format: OutputFormat) -> Result<()> {
        let key = ArtifactKey::new(key)?;
        let status = self.api()?.fetch_status(&key).await?;
        write_output(&self.output.format_status(&status, &format)?)
    }

    /// Poll until the job finishes, the user interrupts, or polling gives up.
    pub async fn watch(&self, key: &str, options: WatchOptions, format: OutputFormat) -> Result<()> {
        let key = ArtifactKey::new(key)?;
        let client_config = self.client_config()?;
        let interval = options.interval.unwrap_or(client_config.poll_interval_secs);

        let mut poller_config = StatusPollerConfig::from(&client_config);
        poller_config.stop_when_terminal = !options.follow;
        if let Some(give_up_after) = options.give_up_after {
            poller_config.backoff.give_up_after = give_up_after;
        }

        let api = ApiClient::new(client_config, self.session())?;
        let poller = StatusPoller::with_config(Arc::new(api), poller_config);
        let subscription = poller.start_polling(key.clone(), interval)?;
        let mut events = subscription.subscribe();
        info!(artifact = %key, interval, "Watching processing status");

        let mut final_event = None;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        write_output(&self.output.format_event(&event, &format)?)?;
                        if event.is_final() {
                            final_event = Some(event);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Skipped {} status events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        let snapshot = subscription.stop_and_wait().await;
        debug!(?snapshot, "Final poll state");

        match final_event {
            Some(PollEvent::Finished {
                overall: ProcessingStatus::Failed,
                ..
            }) => Err(CliError::ProcessingFailed(key.to_string())),
            Some(PollEvent::GaveUp { .. }) => Err(CliError::GaveUp(key.to_string())),
            _ => Ok(()),
        }
    }

    pub async fn list(&self, format: OutputFormat) -> Result<()> {
        let client_config = self.client_config()?;
        let concurrency = client_config.listing_concurrency;
        let session = self.session();
        let store = HttpObjectStore::new(client_config.clone(), session.clone())?;
        let api = ApiClient::new(client_config, session)?;

        let videos = list_videos(&store, &api, concurrency).await?;
        write_output(&self.output.format_videos(&videos, &format)?)
    }

    pub async fn upload(
        &self,
        file: &Path,
        watch: Option<WatchOptions>,
        format: OutputFormat,
    ) -> Result<()> {
        let file_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| CliError::invalid_input(format!("not a file: {}", file.display())))?;

        let client_config = self.client_config()?;
        let metadata = tokio::fs::metadata(file).await?;
        let candidate = UploadCandidate::from_file_name(file_name, metadata.len());
        // Fail before reading a large file into memory.
        candidate.validate(client_config.max_upload_bytes)?;

        let body = tokio::fs::read(file).await?;
        let session = self.session();
        let store = HttpObjectStore::new(client_config.clone(), session.clone())?;
        let api = ApiClient::new(client_config, session)?;

        let bar = (format == OutputFormat::Pretty).then(|| upload_bar(candidate.size));
        let progress: Option<ProgressCallback> = bar.clone().map(|bar| {
            Arc::new(move |p: UploadProgress| bar.set_position(p.loaded)) as ProgressCallback
        });

        let result =
            upload_and_process(&store, &api, &candidate, body.into(), progress).await;
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        let ticket = result?;

        write_output(&self.output.format_ticket(&ticket, &format)?)?;

        match watch {
            Some(options) => self.watch(ticket.key.as_str(), options, format).await,
            None => Ok(()),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        limit: u32,
        threshold: f64,
        format: OutputFormat,
    ) -> Result<()> {
        let query = SearchQuery::new(query)
            .with_limit(limit)
            .with_threshold(threshold);
        let hits = self.api()?.search(&query).await?;
        write_output(&self.output.format_hits(&hits, &format)?)
    }

    pub async fn transcript(&self, key: &str, format: OutputFormat) -> Result<()> {
        let key = ArtifactKey::new(key)?;
        let segments = self.api()?.transcript(&key).await?;
        write_output(&self.output.format_transcript(&segments, &format)?)
    }
}

fn upload_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner} Uploading [{bar:40}] {bytes}/{total_bytes} ({percent}%) {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar
}
