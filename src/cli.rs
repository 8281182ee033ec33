//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use harvester_core::export::{
    DEFAULT_INPUT_PREFIX, DEFAULT_OUTPUT_PREFIX, DEFAULT_SERVED_EXTENSION, ExportOptions,
};
use harvester_core::process::DEFAULT_MODEL;
use harvester_core::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_MAX_ROUNDS, DEFAULT_SETTLE_ROUNDS, RunConfig,
};

/// Default output directory for downloaded images.
pub const DEFAULT_DOWNLOAD_DIR: &str = "imgs";

/// Default output directory for transformed images.
pub const DEFAULT_TRANSFORM_DIR: &str = "imgs_transformed";

/// Default output directory for WebP re-encodes.
pub const DEFAULT_COMPRESS_DIR: &str = "imgs_webp";

/// Resumable batch harvesting of gallery images.
///
/// Harvester discovers images on a paginated gallery page, downloads them with
/// bounded parallelism, optionally transforms each one through an
/// image-generation API, and checkpoints every finished image so interrupted
/// runs pick up where they stopped. Finished runs can be re-encoded as WebP
/// and exported as gallery pairs.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline modes.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover images on a gallery page and download them
    Crawl(CrawlArgs),
    /// Transform local images through the image-generation API
    Transform(TransformArgs),
    /// Re-run the items listed in a failure list
    Retry(RetryArgs),
    /// Re-encode local PNG/JPEG images as WebP
    Compress(CompressArgs),
    /// Write gallery input/output pairs from a transform manifest
    Export(ExportArgs),
}

/// Arguments of `harvester crawl`.
#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Gallery page URL; `{page}` is replaced by the round number
    #[arg(long)]
    pub url: String,

    /// Keep paging while the page still contains this text
    #[arg(long)]
    pub load_more_text: Option<String>,

    /// Present a browser User-Agent to the gallery and image hosts
    #[arg(long)]
    pub browser_agent: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments of `harvester transform`.
#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Directory of images to transform (GIFs are skipped)
    #[arg(long, default_value = DEFAULT_DOWNLOAD_DIR)]
    pub input_dir: PathBuf,

    #[command(flatten)]
    pub api: ApiArgs,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments of `harvester retry`.
#[derive(Args, Debug)]
pub struct RetryArgs {
    /// Failure list written by an earlier run
    #[arg(long)]
    pub failures: PathBuf,

    /// Transform the listed items instead of downloading them
    #[arg(long)]
    pub transform: bool,

    #[command(flatten)]
    pub api: ApiArgs,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments of `harvester compress`.
#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Directory of PNG/JPEG images to re-encode
    #[arg(long, default_value = DEFAULT_DOWNLOAD_DIR)]
    pub input_dir: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments of `harvester export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Manifest journal of a transform run
    #[arg(long, default_value = "imgs_transformed/manifest.jsonl")]
    pub manifest: PathBuf,

    /// Destination JSON file
    #[arg(long, default_value = "gallery.json")]
    pub out: PathBuf,

    /// URL prefix of source images
    #[arg(long, default_value = DEFAULT_INPUT_PREFIX)]
    pub input_prefix: String,

    /// URL prefix of transformed images
    #[arg(long, default_value = DEFAULT_OUTPUT_PREFIX)]
    pub output_prefix: String,

    /// Extension the gallery serves both images with
    #[arg(long, default_value = DEFAULT_SERVED_EXTENSION)]
    pub extension: String,
}

impl ExportArgs {
    /// URL layout from the flags.
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            input_prefix: self.input_prefix.clone(),
            output_prefix: self.output_prefix.clone(),
            extension: self.extension.clone(),
        }
    }
}

/// Image-generation API options. Credentials come from `OPENAI_BASE_URL`
/// and `OPENAI_API_KEY` (environment or `.env`).
#[derive(Args, Debug)]
pub struct ApiArgs {
    /// Reference image sent alongside every input
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Model name passed to the chat-completions endpoint
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// File holding the instruction prompt
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,
}

/// Options shared by every mode.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Output directory (also holds manifest.jsonl and failed.txt)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum discovery rounds
    #[arg(long, default_value_t = DEFAULT_MAX_ROUNDS, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_rounds: u32,

    /// Consecutive rounds without new images that end discovery
    #[arg(long, default_value_t = DEFAULT_SETTLE_ROUNDS, value_parser = clap::value_parser!(u32).range(1..))]
    pub settle_rounds: u32,

    /// Pause between discovery rounds in milliseconds
    #[arg(long, default_value_t = 1200, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub pause_ms: u64,

    /// Maximum concurrent items (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Maximum retry attempts per item (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Base delay before a retry in milliseconds (doubles per attempt)
    #[arg(long, default_value_t = 3000, value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub retry_delay_ms: u64,

    /// Per-attempt timeout in seconds [default: 60, or 900 when transforming]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Process at most this many items (0 = all)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Ignore the existing manifest and process every item again
    #[arg(long)]
    pub no_resume: bool,
}

impl RunArgs {
    /// Maps the flags onto a [`RunConfig`].
    pub fn to_config(&self, default_dir: &str, default_timeout: Duration) -> RunConfig {
        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_dir));
        RunConfig::new(output_dir)
            .with_concurrency(usize::from(self.concurrency))
            .with_rounds(self.max_rounds, self.settle_rounds)
            .with_round_pause(Duration::from_millis(self.pause_ms))
            .with_timeout(
                self.timeout_secs
                    .map_or(default_timeout, Duration::from_secs),
            )
            .with_retries(
                u32::from(self.max_retries),
                Duration::from_millis(self.retry_delay_ms),
            )
            .with_resume(!self.no_resume)
            .with_limit(self.limit)
    }
}
