use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use release_watchbot::clone::GitCli;
use release_watchbot::config;
use release_watchbot::github::{GithubClient, GithubService};
use release_watchbot::model::FreshEvent;
use release_watchbot::resolver::FreshnessResolver;
use release_watchbot::window::{humanize_age, FreshnessWindow};

#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Repository to check, as owner/name
    #[arg(long)]
    repo: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let client = Arc::new(GithubClient::from_config(&cfg)?);
    let mut repo = client.get_repository(&args.repo).await?;
    if repo.is_fork {
        let upstream = client.upstream_of(&repo).await?;
        println!("{} is a fork of {}", repo.full_name, upstream.full_name);
        repo = upstream;
    }
    println!("Repository: {} (id {})", repo.full_name, repo.id);

    let window = FreshnessWindow::starting_now(cfg.window());
    let resolver = FreshnessResolver::new(
        client.clone(),
        Arc::new(GitCli::new(&cfg.app.scratch_dir).with_timeout(cfg.clone_timeout())),
        window,
        cfg.resolver_options(),
    );
    match resolver.resolve(&repo).await? {
        Some(event) => {
            let kind = match &event {
                FreshEvent::Release(_) => "release",
                FreshEvent::Tag(_) => "tag",
            };
            let age = event
                .published_at()
                .map(|at| humanize_age(window.age(at)))
                .unwrap_or_default();
            println!("Fresh {}: {} {} ({})", kind, event.name(), event.url(), age);
        }
        None => println!("Nothing new within {} hours", cfg.scan.window_hours),
    }

    let rate = client.rate_limit().await?;
    println!(
        "Rate limit: {} of {} left, resets {}",
        rate.remaining,
        rate.limit,
        rate.reset.to_rfc3339()
    );
    Ok(())
}
