//! Processing status poller.
//!
//! The poller is responsible for:
//! - Fetching the status of one artifact immediately and then on an interval
//! - Keeping the last good status when a fetch fails
//! - Backing off after repeated failures, and optionally giving up
//! - Discarding responses that arrive after a stop or a retarget
//! - Emitting events for front ends

mod backoff;
mod events;
mod service;

pub use backoff::{
    BackoffConfig, DEFAULT_BASE_BACKOFF_SECS, DEFAULT_FAILURE_THRESHOLD, DEFAULT_MAX_BACKOFF_SECS,
    FailureTracker,
};
pub use events::{PollEvent, PollEventBroadcaster};
pub use service::{PollSnapshot, PollSubscription, StatusPoller, StatusPollerConfig};
