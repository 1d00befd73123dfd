//! The user's video library with the current processing status of each video.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::StatusSource;
use crate::storage::{ObjectStore, StoredObject};
use crate::{ArtifactKey, ProcessingStatus, Result};

/// One uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoEntry {
    pub key: ArtifactKey,
    pub name: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// `None` when the status could not be fetched.
    pub status: Option<ProcessingStatus>,
    pub url: Option<String>,
}

/// List the videos in storage and fetch their statuses, at most
/// `concurrency` at a time. Entries come back in listing order.
///
/// Only the listing itself can fail; per-video errors leave the status or
/// URL empty.
pub async fn list_videos(
    store: &dyn ObjectStore,
    source: &dyn StatusSource,
    concurrency: usize,
) -> Result<Vec<VideoEntry>> {
    let objects: Vec<StoredObject> = store
        .list("")
        .await?
        .into_iter()
        .filter(|object| object.key.is_video())
        .collect();
    debug!("Listing {} videos", objects.len());

    let mut entries: Vec<(usize, VideoEntry)> = stream::iter(objects.into_iter().enumerate())
        .map(|(index, object)| async move { (index, describe(store, source, object).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    entries.sort_by_key(|(index, _)| *index);
    Ok(entries.into_iter().map(|(_, entry)| entry).collect())
}

async fn describe(
    store: &dyn ObjectStore,
    source: &dyn StatusSource,
    object: StoredObject,
) -> VideoEntry {
    let (status, url) = futures::join!(source.fetch_status(&object.key), store.download_url(&object.key));

    let status = match status {
        Ok(job) => Some(job.overall()),
        Err(e) => {
            debug!(artifact = %object.key, "Status unavailable: {}", e);
            None
        }
    };
    let url = match url {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(artifact = %object.key, "Failed to get download url: {}", e);
            None
        }
    };

    VideoEntry {
        name: object.key.file_name().to_string(),
        key: object.key,
        size: object.size,
        last_modified: object.last_modified,
        status,
        url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryObjectStore, ScriptStep, ScriptedStatusSource};

    #[tokio::test]
    async fn test_list_videos_keeps_order_and_filters() {
        let store = MemoryObjectStore::new();
        store.insert("video_in/1-a.mp4", b"aaaa");
        store.insert("video_in/2-notes.txt", b"nope");
        store.insert("video_in/3-b.mov", b"bb");

        let source = ScriptedStatusSource::new(vec![
            ScriptStep::completed(),
            ScriptStep::Unavailable,
        ]);

        let entries = list_videos(&store, &source, 4).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["1-a.mp4", "3-b.mov"]);
        assert_eq!(entries[0].size, 4);
        assert!(entries.iter().all(|e| e.url.is_some()));

        let mut statuses: Vec<_> = entries.iter().map(|e| e.status).collect();
        statuses.sort_by_key(|s| s.is_some());
        assert_eq!(statuses, [None, Some(ProcessingStatus::Completed)]);
    }

    #[tokio::test]
    async fn test_list_videos_empty() {
        let store = MemoryObjectStore::new();
        let source = ScriptedStatusSource::new(vec![]);
        assert!(list_videos(&store, &source, 2).await.unwrap().is_empty());
        assert_eq!(source.calls(), 0);
    }
}
