use anyhow::Result;
use clap::Parser;
use sora_scenes::generator::{Settings, run_generation};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Generate a chain of video clips, each continuing from a frame of the
/// previous one.
#[derive(Parser, Debug)]
#[command(name = "sora-scenes", version)]
struct Args {
    /// Config file (defaults to ./config.json when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scene list JSON, overrides `scenes_file`
    #[arg(long)]
    scenes: Option<PathBuf>,

    /// Directory the clips are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Give up on a job after this many seconds of polling
    #[arg(long, value_name = "SECS")]
    job_timeout: Option<u64>,

    /// Skip a scene whose reference frame has not appeared after this many seconds
    #[arg(long, value_name = "SECS")]
    reference_timeout: Option<u64>,

    /// Regenerate scenes whose clip already exists
    #[arg(long)]
    force: bool,

    /// Do not draw the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sora_scenes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let settings = Settings {
        config_path: args.config,
        scenes_path: args.scenes,
        output_dir: args.output_dir,
        api_key: args.api_key,
        job_timeout_secs: args.job_timeout,
        reference_timeout_secs: args.reference_timeout,
        force: args.force,
        no_progress: args.no_progress,
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            tracing::warn!("interrupt received, stopping after the current wait");
            on_signal.cancel();
        }
    });

    let report = run_generation(settings, cancel).await?;
    if report.cancelled {
        std::process::exit(130);
    }
    Ok(())
}
