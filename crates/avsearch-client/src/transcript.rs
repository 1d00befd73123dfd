//! Transcripts of processed videos.

use serde::{Deserialize, Serialize};

use crate::format::format_timestamp;

/// One spoken passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub speaker: Option<String>,
}

impl TranscriptSegment {
    pub fn contains(&self, seconds: f64) -> bool {
        seconds >= self.start && seconds < self.end
    }

    /// `m:ss` label of the start offset.
    pub fn start_label(&self) -> String {
        format_timestamp(self.start)
    }
}

/// The segment being spoken at `seconds`, if any.
pub fn segment_at(segments: &[TranscriptSegment], seconds: f64) -> Option<&TranscriptSegment> {
    segments.iter().find(|segment| segment.contains(seconds))
}
