//! CLI entry point for the harvester tool.

use std::process::ExitCode;

use clap::Parser;

mod app;
mod cli;

use cli::Cli;

/// Process outcome mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every processed item succeeded (or there was nothing to do).
    Success,
    /// Some items failed, or the run was interrupted.
    Partial,
    /// Fatal error, or every processed item failed.
    Failure,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
            Self::Failure => 2,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    let default_level = app::terminal::resolve_default_log_level(cli.verbose, cli.quiet);
    app::terminal::init_tracing(default_level, app::terminal::no_color_env_requested());

    match app::runtime::run_harvester(cli).await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:?}");
            ProcessExit::Failure.into()
        }
    }
}
