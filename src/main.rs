use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use release_watchbot::clone::GitCli;
use release_watchbot::config;
use release_watchbot::dispatch::{Dispatcher, SmtpMailer};
use release_watchbot::github::GithubClient;
use release_watchbot::pool::CollectingSink;
use release_watchbot::scan::Scanner;
use release_watchbot::window::FreshnessWindow;

#[derive(Debug, Parser)]
#[command(author, version, about = "Email fresh GitHub releases and tags, then exit")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log fresh events instead of sending email
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let run_id = Uuid::new_v4().to_string();
    let window = FreshnessWindow::starting_now(cfg.window());
    info!(%run_id, dry_run = args.dry_run, "starting scan");

    let api = Arc::new(GithubClient::from_config(&cfg)?);
    let local = Arc::new(GitCli::new(&cfg.app.scratch_dir).with_timeout(cfg.clone_timeout()));
    let scanner = Scanner::new(
        api,
        local,
        cfg.github.orgs.clone(),
        cfg.scan.workers,
        cfg.resolver_options(),
        window,
    );

    if args.dry_run {
        let sink = Arc::new(CollectingSink::new());
        let summary = scanner.run(sink.clone()).await?;
        for job in sink.jobs().await {
            println!(
                "{}\t{}\t{}",
                job.repo.full_name,
                job.event.name(),
                job.event.url()
            );
        }
        info!(%run_id, repositories = summary.repositories, events = summary.pool.emitted(), "dry run complete");
        return Ok(());
    }

    let mailer = SmtpMailer::from_config(&cfg.email).context("failed to set up smtp transport")?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(mailer),
        cfg.email.user.clone(),
        cfg.email.receiver.clone(),
        cfg.retry_policy(),
        window,
        run_id.clone(),
    ));
    let summary = scanner.run(dispatcher).await?;
    info!(%run_id, repositories = summary.repositories, sent = summary.pool.emitted(), "exit");
    Ok(())
}
