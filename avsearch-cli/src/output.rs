use crate::{cli::OutputFormat, error::Result};
use avsearch_client::format::{format_duration, format_megabytes, format_timestamp, status_label};
use avsearch_client::search::{SearchContent, SearchHit};
use avsearch_client::transcript::TranscriptSegment;
use avsearch_client::library::VideoEntry;
use avsearch_client::{JobStatus, PollEvent, ProcessingStatus, ProcessingTicket};
#[cfg(feature = "table-output")]
use avsearch_client::Stage;
#[cfg(feature = "colored-output")]
use colored::*;
use serde::Serialize;
use std::io::Write;
#[cfg(feature = "table-output")]
use tabled::{Table, Tabled, settings::Style};

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_status(&self, status: &JobStatus, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_status_pretty(status)),
            OutputFormat::Json => to_json(status, true),
            OutputFormat::JsonCompact => to_json(status, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => Ok(self.format_status_table(status)),
            #[cfg(not(feature = "table-output"))]
            OutputFormat::Table => Ok(self.format_status_pretty(status)),
        }
    }

    fn format_status_pretty(&self, status: &JobStatus) -> String {
        let mut output = String::new();
        output.push_str(&self.colorize(
            &format!("Processing status: {}", status.artifact()),
            &Color::Green,
            true,
        ));
        output.push('\n');
        output.push_str(&format!(
            "  {}: {}\n",
            self.colorize("Overall", &Color::Yellow, false),
            self.status(Some(status.overall()))
        ));

        for (stage, stage_status) in status.stages().iter() {
            output.push_str(&format!(
                "  {}: {}\n",
                self.colorize(stage.label(), &Color::Yellow, false),
                self.status(Some(stage_status))
            ));
        }

        if let Some(execution) = status.execution() {
            output.push_str(&format!(
                "  {}: {}\n",
                self.colorize("Execution", &Color::Yellow, false),
                self.colorize(&execution.execution_id, &Color::Cyan, false)
            ));
            output.push_str(&format!(
                "  {}: {} ({} ago)\n",
                self.colorize("Started", &Color::Yellow, false),
                execution.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                format_duration(execution.elapsed(chrono::Utc::now()))
            ));
            if !execution.steps.is_empty() {
                output.push_str(&self.colorize("  Steps:", &Color::Green, true));
                output.push('\n');
                for step in &execution.steps {
                    let took = step
                        .duration()
                        .map(|d| format!(" in {}", format_duration(d)))
                        .unwrap_or_default();
                    output.push_str(&format!(
                        "    {} {}{}\n",
                        self.status(Some(step.status)),
                        step.name,
                        took
                    ));
                    if !step.detail.is_empty() {
                        output.push_str(&format!("      {}\n", step.detail));
                    }
                }
            }
        }
        output
    }

    #[cfg(feature = "table-output")]
    fn format_status_table(&self, status: &JobStatus) -> String {
        #[derive(Tabled)]
        struct StageRow {
            stage: &'static str,
            status: &'static str,
        }

        let mut rows: Vec<StageRow> = Stage::ALL
            .into_iter()
            .map(|stage| StageRow {
                stage: stage.label(),
                status: status.stage(stage).as_str(),
            })
            .collect();
        rows.push(StageRow {
            stage: "Overall",
            status: status.overall().as_str(),
        });

        let mut table = Table::new(rows).with(Style::modern()).to_string();
        table.push('\n');
        table
    }

    /// One line per poll event; JSON formats emit one object per line.
    pub fn format_event(&self, event: &PollEvent, format: &OutputFormat) -> Result<String> {
        if format.is_json() {
            let mut line = serde_json::to_string(event)?;
            line.push('\n');
            return Ok(line);
        }

        let time = chrono::Local::now().format("%H:%M:%S");
        let line = match event {
            PollEvent::Updated { status, .. } => {
                let stages: Vec<String> = status
                    .stages()
                    .iter()
                    .map(|(stage, s)| format!("{}={}", stage.id(), s))
                    .collect();
                format!(
                    "[{}] {} ({})",
                    time,
                    self.status(Some(status.overall())),
                    stages.join(" ")
                )
            }
            PollEvent::FetchFailed {
                error_message,
                consecutive_failures,
                ..
            } => format!(
                "[{}] {} {} (attempt {}), showing last known status",
                time,
                self.colorize("poll failed:", &Color::Red, false),
                error_message,
                consecutive_failures
            ),
            other => format!("[{}] {}", time, other.description()),
        };
        Ok(format!("{}\n", line))
    }

    pub fn format_videos(&self, videos: &[VideoEntry], format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => to_json(&videos, true),
            OutputFormat::JsonCompact => to_json(&videos, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => Ok(self.format_videos_table(videos)),
            _ => Ok(self.format_videos_pretty(videos)),
        }
    }

    fn format_videos_pretty(&self, videos: &[VideoEntry]) -> String {
        if videos.is_empty() {
            return "No videos uploaded yet\n".to_string();
        }

        let mut output = String::new();
        output.push_str(&self.colorize(
            &format!("Videos ({})", videos.len()),
            &Color::Green,
            true,
        ));
        output.push('\n');
        for video in videos {
            output.push_str(&format!(
                "  {} [{}] {}\n",
                self.colorize(&video.name, &Color::Cyan, false),
                self.status(video.status),
                format_megabytes(video.size)
            ));
            output.push_str(&format!("    key: {}\n", video.key));
            if let Some(url) = &video.url {
                output.push_str(&format!(
                    "    url: {}\n",
                    self.colorize(url, &Color::Blue, false)
                ));
            }
        }
        output
    }

    #[cfg(feature = "table-output")]
    fn format_videos_table(&self, videos: &[VideoEntry]) -> String {
        #[derive(Tabled)]
        struct VideoRow<'a> {
            name: &'a str,
            status: &'static str,
            size: String,
            modified: String,
            key: &'a str,
        }

        let rows: Vec<VideoRow> = videos
            .iter()
            .map(|video| VideoRow {
                name: &video.name,
                status: status_label(video.status),
                size: format_megabytes(video.size),
                modified: video
                    .last_modified
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                key: video.key.as_str(),
            })
            .collect();

        let mut table = Table::new(rows).with(Style::modern()).to_string();
        table.push('\n');
        table
    }

    pub fn format_hits(&self, hits: &[SearchHit], format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => to_json(&hits, true),
            OutputFormat::JsonCompact => to_json(&hits, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => Ok(self.format_hits_table(hits)),
            _ => Ok(self.format_hits_pretty(hits)),
        }
    }

    fn format_hits_pretty(&self, hits: &[SearchHit]) -> String {
        if hits.is_empty() {
            return "No results found. Try a different search term or lower the threshold.\n"
                .to_string();
        }

        let mut output = String::new();
        output.push_str(&self.colorize(
            &format!("Search results ({})", hits.len()),
            &Color::Green,
            true,
        ));
        output.push('\n');
        for hit in hits {
            output.push_str(&format!(
                "  {} @ {} ({}% match)\n",
                self.colorize(&hit.source_name, &Color::Cyan, true),
                format_timestamp(hit.timestamp_seconds),
                hit.similarity_percent()
            ));
            match &hit.content {
                SearchContent::Text {
                    matched_text,
                    speaker,
                } => {
                    if let Some(speaker) = speaker {
                        output.push_str(&format!(
                            "    {}: ",
                            self.colorize(speaker, &Color::Yellow, false)
                        ));
                    } else {
                        output.push_str("    ");
                    }
                    output.push_str(&format!("\"{}\"\n", matched_text));
                }
                SearchContent::Image { image_reference } => {
                    output.push_str(&format!(
                        "    frame: {}\n",
                        self.colorize(image_reference, &Color::Blue, false)
                    ));
                }
            }
        }
        output
    }

    #[cfg(feature = "table-output")]
    fn format_hits_table(&self, hits: &[SearchHit]) -> String {
        #[derive(Tabled)]
        struct HitRow<'a> {
            video: &'a str,
            at: String,
            matched: String,
            similarity: String,
        }

        let rows: Vec<HitRow> = hits
            .iter()
            .map(|hit| HitRow {
                video: &hit.source_name,
                at: format_timestamp(hit.timestamp_seconds),
                matched: match &hit.content {
                    SearchContent::Text { matched_text, .. } => matched_text.clone(),
                    SearchContent::Image { .. } => "[frame]".to_string(),
                },
                similarity: format!("{}%", hit.similarity_percent()),
            })
            .collect();

        let mut table = Table::new(rows).with(Style::modern()).to_string();
        table.push('\n');
        table
    }

    pub fn format_transcript(
        &self,
        segments: &[TranscriptSegment],
        format: &OutputFormat,
    ) -> Result<String> {
        match format {
            OutputFormat::Json => to_json(&segments, true),
            OutputFormat::JsonCompact => to_json(&segments, false),
            _ => {
                if segments.is_empty() {
                    return Ok("No transcript available for this video\n".to_string());
                }
                let mut output = String::new();
                for segment in segments {
                    let start = self.colorize(&segment.start_label(), &Color::Cyan, false);
                    match &segment.speaker {
                        Some(speaker) => output.push_str(&format!(
                            "[{}] {}: {}\n",
                            start,
                            self.colorize(speaker, &Color::Yellow, false),
                            segment.text
                        )),
                        None => output.push_str(&format!("[{}] {}\n", start, segment.text)),
                    }
                }
                Ok(output)
            }
        }
    }

    pub fn format_ticket(&self, ticket: &ProcessingTicket, format: &OutputFormat) -> Result<String> {
        if format.is_json() {
            return to_json(ticket, matches!(format, OutputFormat::Json));
        }
        Ok(format!(
            "{} {}\n  {}: {}\n",
            self.colorize("✓ Processing started for", &Color::Green, true),
            ticket.key,
            self.colorize("Execution", &Color::Yellow, false),
            self.colorize(&ticket.execution_id, &Color::Cyan, false)
        ))
    }

    fn status(&self, status: Option<ProcessingStatus>) -> String {
        let label = status_label(status);
        let color = match status {
            Some(ProcessingStatus::Completed) => Color::Green,
            Some(ProcessingStatus::Failed) => Color::Red,
            Some(ProcessingStatus::Running) => Color::Blue,
            Some(ProcessingStatus::Pending) | None => Color::Yellow,
        };
        self.colorize(label, &color, status.is_some_and(|s| s.is_terminal()))
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                    Color::Red => text.red(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
    Red,
}

fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(Into::into)
}

pub fn write_output(content: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avsearch_client::{ArtifactKey, Stage, StageStatuses};

    fn job(stages: StageStatuses) -> JobStatus {
        JobStatus::new(ArtifactKey::new("video_in/1-demo.mp4").unwrap(), stages, None)
    }

    #[test]
    fn test_pretty_status_lists_every_stage() {
        let output = OutputManager::new(false);
        let stages = StageStatuses::uniform(ProcessingStatus::Completed)
            .with(Stage::AudioProcessing, ProcessingStatus::Failed);
        let text = output
            .format_status(&job(stages), &OutputFormat::Pretty)
            .unwrap();

        assert!(text.contains("Overall: FAILED"));
        for stage in Stage::ALL {
            assert!(text.contains(stage.label()));
        }
    }

    #[test]
    fn test_json_status() {
        let output = OutputManager::new(false);
        let text = output
            .format_status(&job(StageStatuses::default()), &OutputFormat::JsonCompact)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["overall"], "PENDING");
    }

    #[test]
    fn test_unknown_status_label() {
        let output = OutputManager::new(false);
        assert_eq!(output.status(None), "UNKNOWN");
    }

    #[test]
    fn test_empty_search_results() {
        let output = OutputManager::new(false);
        let text = output.format_hits(&[], &OutputFormat::Pretty).unwrap();
        assert!(text.starts_with("No results found"));
    }
}
