//! Runs one CLI invocation: builds the source and processor for the chosen
//! mode, drives the pipeline, and reports the result.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use harvester_core::config::{DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_TRANSFORM_TIMEOUT};
use harvester_core::process::CONNECT_TIMEOUT;
use harvester_core::export::export_gallery;
use harvester_core::process::COMPRESSIBLE_EXTENSIONS;
use harvester_core::{
    ChatImageTransformer, CompressProcessor, DirectorySource, DownloadProcessor,
    FailureListSource, HttpClient, ItemSource, PagedHtmlSource, Processor, RunConfig, RunSummary,
    TransformProcessor, run_pipeline,
};
use tracing::{debug, info, warn};

use super::{exit_handler, progress::RunProgress, terminal};
use crate::ProcessExit;
use crate::cli::{
    ApiArgs, Cli, Command, DEFAULT_COMPRESS_DIR, DEFAULT_DOWNLOAD_DIR, DEFAULT_TRANSFORM_DIR,
    ExportArgs,
};

/// Environment variable holding the transform API base URL.
const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Environment variable holding the transform API key.
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Everything a run needs, built from the CLI.
struct RunPlan {
    mode: &'static str,
    config: RunConfig,
    source: Box<dyn ItemSource>,
    processor: Arc<dyn Processor>,
}

pub(crate) async fn run_harvester(cli: Cli) -> Result<ProcessExit> {
    info!("Harvester starting");
    if let Command::Export(args) = &cli.command {
        return run_export(args).await;
    }
    let plan = build_plan(&cli.command)?;
    debug!(mode = plan.mode, config = ?plan.config, "run planned");

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let use_spinner = terminal::should_use_spinner(
        std::io::stderr().is_terminal(),
        cli.quiet,
        terminal::is_dumb_terminal(),
    );
    let mut progress = RunProgress::new(use_spinner, plan.mode);

    let result = run_pipeline(
        &plan.config,
        plan.source,
        plan.processor,
        &interrupted,
        |outcome| progress.observe(outcome),
    )
    .await;
    progress.finish();

    let summary = result.context("harvest run failed")?;
    report(&summary, &plan.config);
    Ok(exit_handler::exit_outcome_for(&summary))
}

async fn run_export(args: &ExportArgs) -> Result<ProcessExit> {
    let pairs = export_gallery(&args.manifest, &args.out, &args.options())
        .await
        .with_context(|| format!("failed to export {}", args.manifest.display()))?;
    if pairs == 0 {
        warn!(manifest = %args.manifest.display(), "No completed records to export");
    }
    Ok(ProcessExit::Success)
}

fn build_plan(command: &Command) -> Result<RunPlan> {
    match command {
        Command::Crawl(args) => {
            let config = args
                .run
                .to_config(DEFAULT_DOWNLOAD_DIR, DEFAULT_DOWNLOAD_TIMEOUT);
            let client = if args.browser_agent {
                HttpClient::with_browser_agent(CONNECT_TIMEOUT, config.timeout)
            } else {
                HttpClient::with_timeouts(CONNECT_TIMEOUT, config.timeout)
            }
            .context("failed to build HTTP client")?;

            let mut source = PagedHtmlSource::new(client.clone(), &args.url);
            if let Some(text) = &args.load_more_text {
                source = source.with_load_more_text(text);
            }
            let processor = DownloadProcessor::new(client, &config.output_dir);
            Ok(RunPlan {
                mode: "crawl",
                source: Box::new(source),
                processor: Arc::new(processor),
                config,
            })
        }
        Command::Transform(args) => {
            let config = args
                .run
                .to_config(DEFAULT_TRANSFORM_DIR, DEFAULT_TRANSFORM_TIMEOUT);
            let processor = build_transform_processor(&args.api, &config)?;
            Ok(RunPlan {
                mode: "transform",
                source: Box::new(DirectorySource::new(&args.input_dir)),
                processor,
                config,
            })
        }
        Command::Retry(args) => {
            let source = Box::new(FailureListSource::new(&args.failures));
            if args.transform {
                let config = args
                    .run
                    .to_config(DEFAULT_TRANSFORM_DIR, DEFAULT_TRANSFORM_TIMEOUT);
                let processor = build_transform_processor(&args.api, &config)?;
                Ok(RunPlan {
                    mode: "retry",
                    source,
                    processor,
                    config,
                })
            } else {
                let config = args
                    .run
                    .to_config(DEFAULT_DOWNLOAD_DIR, DEFAULT_DOWNLOAD_TIMEOUT);
                let client = HttpClient::with_timeouts(CONNECT_TIMEOUT, config.timeout)
                    .context("failed to build HTTP client")?;
                Ok(RunPlan {
                    mode: "retry",
                    source,
                    processor: Arc::new(DownloadProcessor::new(client, &config.output_dir)),
                    config,
                })
            }
        }
        Command::Compress(args) => {
            let config = args
                .run
                .to_config(DEFAULT_COMPRESS_DIR, DEFAULT_DOWNLOAD_TIMEOUT);
            let source =
                DirectorySource::new(&args.input_dir).with_extensions(COMPRESSIBLE_EXTENSIONS);
            Ok(RunPlan {
                mode: "compress",
                source: Box::new(source),
                processor: Arc::new(CompressProcessor::new(&config.output_dir)),
                config,
            })
        }
        Command::Export(_) => anyhow::bail!("export does not run the pipeline"),
    }
}

fn build_transform_processor(api: &ApiArgs, config: &RunConfig) -> Result<Arc<dyn Processor>> {
    if let Err(error) = dotenvy::dotenv() {
        debug!(error = %error, "no .env file loaded");
    }
    let base_url = std::env::var(BASE_URL_ENV)
        .with_context(|| format!("{BASE_URL_ENV} is not set (environment or .env)"))?;
    let api_key = std::env::var(API_KEY_ENV)
        .with_context(|| format!("{API_KEY_ENV} is not set (environment or .env)"))?;

    let client = HttpClient::with_timeouts(CONNECT_TIMEOUT, config.timeout)
        .context("failed to build HTTP client")?;
    let mut transformer =
        ChatImageTransformer::new(client.clone(), &base_url, api_key).with_model(&api.model);
    if let Some(path) = &api.prompt_file {
        let prompt = read_text(path)?;
        transformer = transformer.with_prompt(prompt.trim());
    }
    if let Some(path) = &api.reference {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read reference image {}", path.display()))?;
        transformer = transformer.with_reference_image(&bytes);
    }
    info!(endpoint = transformer.endpoint(), model = %api.model, "transform endpoint configured");

    Ok(Arc::new(TransformProcessor::new(
        client,
        Arc::new(transformer),
        &config.output_dir,
    )))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn report(summary: &RunSummary, config: &RunConfig) {
    info!(
        discovered = summary.discovered,
        skipped = summary.skipped,
        succeeded = summary.succeeded,
        failed = summary.failed,
        retried = summary.retried,
        output_dir = %config.output_dir.display(),
        "Run summary"
    );
    if summary.failed > 0 {
        let failures = config.output_dir.join(harvester_core::FAILURE_LIST_FILE);
        warn!(
            failed = summary.failed,
            failure_list = %failures.display(),
            "Some items failed; re-run them with `harvester retry --failures {}`",
            failures.display()
        );
    }
    if summary.interrupted {
        warn!(
            succeeded = summary.succeeded,
            "Interrupted. Run again to resume."
        );
    }
}
