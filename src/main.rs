use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use webrec::settings::Settings;

/// Records a local web animation, either as a PNG frame sequence or
/// straight to an MP4 file via FFmpeg screen capture.
#[derive(Parser)]
#[command(name = "webrec", version, about)]
struct Cli {
    /// Optional JSON settings file; defaults cover the reference setup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Capture individual PNG frames until the animation finishes.
    Frames,
    /// Record the screen region to a timestamped MP4 via FFmpeg.
    Record,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    if let Err(error) = run().await {
        tracing::error!("{error:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.mode {
        Mode::Frames => {
            webrec::frames::run(&settings).await?;
        }
        Mode::Record => {
            webrec::session::run(&settings).await?;
        }
    }
    Ok(())
}
