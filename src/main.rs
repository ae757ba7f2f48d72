mod comment;
mod config;
mod detect;
mod pipeline;
mod pr;
mod report;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, info_span};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, EnvContext, Resolution};
use crate::pr::GitHubApi;

/// Queue Index Advisor — reads the pull request named by GITHUB_REPOSITORY and
/// GITHUB_REF and comments when a change adds an async action queue or moves one
/// to the indexed mapping, so the indexes are created before deploy.
#[derive(Parser, Debug)]
#[command(name = "queue-index-advisor", version, about)]
struct Cli {
    /// Which detections to run
    #[arg(long, value_enum, default_value_t = detect::Check::All)]
    check: detect::Check,

    /// Render and deduplicate advisories without posting them
    #[arg(long)]
    dry_run: bool,

    /// Config file (defaults to .queue-index-advisor.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Optional output file path for a markdown run summary
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli, |name| std::env::var(name).ok()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}

/// One advisory run. `lookup` reads the CI environment variables.
async fn run<F>(cli: Cli, lookup: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: Fn(&str) -> Option<String>,
{
    info!("loading configuration");
    let config = Config::load(cli.config.as_deref())?;

    let env_ctx = match EnvContext::resolve(lookup, config.github.token.as_deref())? {
        Resolution::Ready(env_ctx) => env_ctx,
        Resolution::Skip { git_ref } => {
            info!(git_ref = %git_ref, "ref does not name a pull request; nothing to do");
            return Ok(());
        }
    };

    let _main_span = info_span!(
        "advise",
        repo = %env_ctx.repository,
        pr = env_ctx.pr_number
    )
    .entered();

    let detectors = detect::build(cli.check, &config.detection)?;
    let templates = comment::Templates::new(&config.detection)?;
    debug!(check = ?cli.check, detectors = detectors.len(), "detectors ready");

    let client = pr::GitHubClient::new(&env_ctx.repository, &env_ctx.access_token, &config.github)?;

    info!("fetching pull request revisions");
    let revisions = client.pull_revisions(env_ctx.pr_number).await?;
    let ctx = env_ctx.with_revisions(revisions);
    debug!(?ctx, "resolved pull request context");

    let summary = pipeline::run(
        &ctx,
        &client,
        &detectors,
        &templates,
        pipeline::RunOptions {
            dry_run: cli.dry_run,
        },
    )
    .await?;

    report::output(&summary, cli.output.as_deref())?;
    info!(posted = summary.posted(), failed = summary.failures(), "done");

    Ok(())
}
