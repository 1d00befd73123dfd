//! # avsearch-client
//!
//! Client library for the audio/video embeddings processing service.
//!
//! An uploaded video goes through a multi-stage processing pipeline (video
//! processing, audio processing, transcription, embedding, database write).
//! This crate tracks that pipeline and talks to the service around it.
//!
//! ## Features
//!
//! - Stage status model with a derived overall status
//! - A status poller that survives transient failures and never mutates
//!   state after it is stopped
//! - HTTP clients for status, processing, search, transcripts and storage
//! - Upload validation and video library listing
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use avsearch_client::session::AnonymousSession;
//! use avsearch_client::{ApiClient, ArtifactKey, ClientConfig, StatusPoller};
//!
//! # async fn run() -> avsearch_client::Result<()> {
//! let config = ClientConfig::new("https://api.example.com/")?;
//! let api = ApiClient::new(config, Arc::new(AnonymousSession))?;
//! let poller = StatusPoller::new(Arc::new(api));
//!
//! let key = ArtifactKey::new("video_in/1714557600000-demo.mp4")?;
//! let subscription = poller.start_polling(key, 10)?;
//! let mut events = subscription.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.description());
//!     if event.is_final() {
//!         break;
//!     }
//! }
//! subscription.stop();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod artifact;
pub mod config;
pub mod error;
pub mod format;
pub mod library;
pub mod poller;
pub mod search;
pub mod session;
pub mod status;
pub mod storage;
pub mod testing;
pub mod transcript;
pub mod upload;

pub use api::{ApiClient, ProcessingTicket, StatusSource};
pub use artifact::ArtifactKey;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use poller::{PollEvent, PollSnapshot, PollSubscription, StatusPoller};
pub use status::{JobStatus, ProcessingStatus, Stage, StageStatuses, compute_overall_status};
