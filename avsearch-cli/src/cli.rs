use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "avsearch")]
#[command(about = "Upload videos, track their processing and search what was said and shown")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Processing API endpoint
    #[arg(long, global = true, env = "AVSEARCH_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Identity token sent as a bearer token
    #[arg(long, global = true, env = "AVSEARCH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Private storage namespace
    #[arg(long, global = true, env = "AVSEARCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Bucket used for processing requests
    #[arg(long, global = true, env = "AVSEARCH_BUCKET")]
    pub bucket: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the current processing status of a video
    Status {
        /// Storage key of the video
        key: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Poll the processing status of a video until it finishes
    Watch {
        /// Storage key of the video
        key: String,

        /// Seconds between polls
        #[arg(short, long, env = "AVSEARCH_POLL_INTERVAL")]
        interval: Option<u64>,

        /// Keep polling after the job finished
        #[arg(long)]
        follow: bool,

        /// Stop after this many consecutive failed polls (0 = never)
        #[arg(long)]
        give_up_after: Option<u32>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// List uploaded videos with their processing status
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Upload a video and start processing it
    Upload {
        /// Video file to upload
        file: PathBuf,

        /// Watch processing after the upload
        #[arg(short, long)]
        watch: bool,

        /// Seconds between polls when watching
        #[arg(short, long, env = "AVSEARCH_POLL_INTERVAL")]
        interval: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Search processed videos
    Search {
        /// What to search for
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = avsearch_client::search::DEFAULT_SEARCH_LIMIT)]
        limit: u32,

        /// Minimum similarity (0.0 - 1.0)
        #[arg(short, long, default_value_t = avsearch_client::search::DEFAULT_SIMILARITY_THRESHOLD)]
        threshold: f64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Print the transcript of a processed video
    Transcript {
        /// Storage key of the video
        key: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Show or reset configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,

        /// Print the configuration file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    pub fn output_format(&self) -> Option<OutputFormat> {
        match self {
            Commands::Status { output, .. }
            | Commands::Watch { output, .. }
            | Commands::List { output }
            | Commands::Upload { output, .. }
            | Commands::Search { output, .. }
            | Commands::Transcript { output, .. } => Some(*output),
            Commands::Config { .. } | Commands::Completions { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Pretty,
    /// JSON output
    Json,
    /// Compact JSON output
    JsonCompact,
    /// Table output
    Table,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::JsonCompact)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_watch() {
        let args = Args::try_parse_from([
            "avsearch",
            "watch",
            "video_in/1-demo.mp4",
            "--interval",
            "30",
            "--output",
            "json",
        ])
        .unwrap();
        match args.command {
            Commands::Watch {
                key,
                interval,
                follow,
                output,
                ..
            } => {
                assert_eq!(key, "video_in/1-demo.mp4");
                assert_eq!(interval, Some(30));
                assert!(!follow);
                assert_eq!(output, OutputFormat::Json);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_search_defaults() {
        let args = Args::try_parse_from(["avsearch", "search", "customer feedback"]).unwrap();
        match args.command {
            Commands::Search {
                limit, threshold, ..
            } => {
                assert_eq!(limit, 20);
                assert_eq!(threshold, 0.7);
            }
            _ => panic!("expected search"),
        }
    }
}
