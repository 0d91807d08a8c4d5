use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::aggregator;
use crate::clone::LocalTagSource;
use crate::error::ScanError;
use crate::github::GithubService;
use crate::pool::{run_pool, JobSink, PoolReport};
use crate::resolver::{FreshnessResolver, ResolverOptions};
use crate::window::FreshnessWindow;

/// One stateless pass: aggregate, resolve in parallel, hand results to a sink.
pub struct Scanner {
    api: Arc<dyn GithubService>,
    local: Arc<dyn LocalTagSource>,
    orgs: Vec<String>,
    workers: usize,
    options: ResolverOptions,
    window: FreshnessWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub repositories: usize,
    pub pool: PoolReport,
}

impl Scanner {
    pub fn new(
        api: Arc<dyn GithubService>,
        local: Arc<dyn LocalTagSource>,
        orgs: Vec<String>,
        workers: usize,
        options: ResolverOptions,
        window: FreshnessWindow,
    ) -> Self {
        Self {
            api,
            local,
            orgs,
            workers,
            options,
            window,
        }
    }

    #[instrument(skip_all)]
    pub async fn run(&self, sink: Arc<dyn JobSink>) -> Result<RunSummary, ScanError> {
        info!("start at {}", self.window.reference.to_rfc3339());
        self.log_rate().await;

        let repos = aggregator::collect(self.api.as_ref(), &self.orgs).await?;
        let repositories = repos.len();

        let resolver = Arc::new(FreshnessResolver::new(
            Arc::clone(&self.api),
            Arc::clone(&self.local),
            self.window,
            self.options,
        ));
        let pool = run_pool(repos.into_values().collect(), self.workers, resolver, sink).await?;
        info!(
            repositories,
            processed = pool.processed(),
            events = pool.emitted(),
            "scan finished"
        );

        self.log_rate().await;
        Ok(RunSummary { repositories, pool })
    }

    async fn log_rate(&self) {
        match self.api.rate_limit().await {
            Ok(rate) => info!(
                "rate: limit {}, remain {}, reset {}",
                rate.limit,
                rate.remaining,
                rate.reset.to_rfc3339()
            ),
            Err(err) => warn!(error = %err, "failed to read rate limit"),
        }
    }
}
