//! Command-line and environment configuration of the `bioforge` binary.

use std::path::PathBuf;
use std::time::Duration;

use bioforge_engine::config::{BatchConfig, EngineConfig, RetryPolicy};
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default Anthropic model.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Extract structured biographical records from source documents.
#[derive(Debug, Parser)]
#[command(name = "bioforge", author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = LogFormat::Text,
        env = "BIOFORGE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,
}

/// Log line formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Subcommands of `bioforge`.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract one record from a text file and print the routed outcome
    Extract {
        /// File holding the source text.
        file: PathBuf,
        /// Source URL recorded on the record (defaults to the file's `file://` URL).
        #[arg(long)]
        url: Option<String>,
        /// Also write the outcome into this output directory.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Engine settings.
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run every source listed in a file (`<path>` or `<url> <path>` per line)
    Batch {
        /// File listing the sources.
        list: PathBuf,
        /// Output directory.
        #[arg(long, short, default_value = "output", env = "BIOFORGE_OUTPUT_DIR")]
        output: PathBuf,
        /// Engine settings.
        #[command(flatten)]
        engine: EngineArgs,
        /// Batch settings.
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Check a saved record file against the schema and date chronology
    Validate {
        /// JSON file holding a record, or an output file with a `result.outcome.record`.
        file: PathBuf,
    },
    /// Print the record JSON schema
    Schema,
}

/// Settings shared by commands that call the model.
#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// Anthropic model name.
    #[arg(long, default_value = DEFAULT_MODEL, env = "BIOFORGE_MODEL")]
    pub model: String,

    /// Maximum model turns per source.
    #[arg(long, default_value_t = 10, env = "BIOFORGE_MAX_TURNS")]
    pub max_turns: usize,

    /// Confidence needed for a record to be accepted.
    #[arg(long, default_value_t = 0.65, env = "BIOFORGE_ACCEPTANCE_THRESHOLD")]
    pub threshold: f64,

    /// Output token limit per model turn.
    #[arg(long, default_value_t = 4096, env = "BIOFORGE_MAX_OUTPUT_TOKENS")]
    pub max_output_tokens: u64,

    /// Keep the model-reported confidence instead of calibrating it.
    #[arg(long)]
    pub no_calibration: bool,

    /// Drop the source text from history after the first turn.
    #[arg(long)]
    pub compact_source: bool,

    /// Past records shown to the model as examples.
    #[arg(long, default_value_t = 2, env = "BIOFORGE_FEW_SHOT")]
    pub few_shot: usize,

    /// Attempts per model call.
    #[arg(long, default_value_t = 3, env = "BIOFORGE_RETRY_ATTEMPTS")]
    pub retry_attempts: u32,

    /// Base retry delay in seconds.
    #[arg(long, default_value_t = 2, env = "BIOFORGE_RETRY_DELAY_SECS")]
    pub retry_delay_secs: u64,

    /// Deadline of one model call in seconds.
    #[arg(long, default_value_t = 120, env = "BIOFORGE_CALL_TIMEOUT_SECS")]
    pub call_timeout_secs: u64,

    /// JSON Lines record store for accepted records and lookups.
    #[arg(long, env = "BIOFORGE_STORE")]
    pub store: Option<PathBuf>,
}

impl EngineArgs {
    /// Engine configuration from these arguments.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let retry = RetryPolicy::default()
            .with_max_attempts(self.retry_attempts)
            .with_base_delay(Duration::from_secs(self.retry_delay_secs))
            .with_call_timeout(Duration::from_secs(self.call_timeout_secs));
        EngineConfig::default()
            .with_max_turns(self.max_turns)
            .with_acceptance_threshold(self.threshold)
            .with_max_output_tokens(self.max_output_tokens)
            .with_calibration(!self.no_calibration)
            .with_source_compaction(self.compact_source)
            .with_few_shot_examples(self.few_shot)
            .with_retry(retry)
    }
}

/// Settings of the `batch` command.
#[derive(Debug, Clone, Args)]
pub struct BatchArgs {
    /// Minimum milliseconds between model calls across the batch.
    #[arg(long, default_value_t = 1000, env = "BIOFORGE_MIN_INTERVAL_MS")]
    pub min_interval_ms: u64,

    /// Sources processed at once.
    #[arg(long, default_value_t = 1, env = "BIOFORGE_CONCURRENCY")]
    pub concurrency: usize,

    /// Do not write accepted records to the store.
    #[arg(long)]
    pub no_persist: bool,
}

impl BatchArgs {
    /// Batch configuration from these arguments.
    #[must_use]
    pub const fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            min_interval: Duration::from_millis(self.min_interval_ms),
            concurrency: self.concurrency,
            persist_accepted: !self.no_persist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_defaults_match_engine_defaults() {
        let cli = Cli::try_parse_from(["bioforge", "batch", "sources.txt"]).unwrap();
        let Command::Batch { engine, batch, output, .. } = cli.command else {
            panic!("expected batch");
        };
        assert_eq!(output, PathBuf::from("output"));
        assert_eq!(engine.engine_config(), EngineConfig::default());
        assert_eq!(batch.batch_config(), BatchConfig::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "bioforge",
            "--log-format",
            "json",
            "extract",
            "obit.txt",
            "--url",
            "https://www.news.cn/a.html",
            "--max-turns",
            "4",
            "--no-calibration",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        let Command::Extract { engine, url, .. } = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(url.as_deref(), Some("https://www.news.cn/a.html"));
        let config = engine.engine_config();
        assert_eq!(config.max_turns, 4);
        assert!(!config.calibrate_confidence);
    }
}
