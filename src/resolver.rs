//! Per-repository freshness decision: newest published release first, tags second.
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::clone::LocalTagSource;
use crate::error::{FetchError, ScanError};
use crate::github::GithubService;
use crate::model::{FreshEvent, ReleaseCandidate, RepositoryRef, TagCandidate};
use crate::tags::{newest, select_strategy, TagTimeline};
use crate::window::{humanize_age, FreshnessWindow};

/// When tags are consulted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TagFallback {
    /// Whenever the newest published release is missing or stale.
    #[default]
    WhenNoFreshRelease,
    /// Only for repositories without any published release.
    WhenNoRelease,
}

/// What a failed metadata call does to the run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    #[default]
    Abort,
    /// Log it and treat the repository as having nothing new.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    pub clone_threshold: usize,
    pub tag_fallback: TagFallback,
    pub on_fetch_error: FetchPolicy,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            clone_threshold: 100,
            tag_fallback: TagFallback::default(),
            on_fetch_error: FetchPolicy::default(),
        }
    }
}

/// Outcome of one lookup step.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Transient(FetchError),
}

pub struct FreshnessResolver {
    api: Arc<dyn GithubService>,
    local: Arc<dyn LocalTagSource>,
    window: FreshnessWindow,
    options: ResolverOptions,
}

impl FreshnessResolver {
    pub fn new(
        api: Arc<dyn GithubService>,
        local: Arc<dyn LocalTagSource>,
        window: FreshnessWindow,
        options: ResolverOptions,
    ) -> Self {
        Self {
            api,
            local,
            window,
            options,
        }
    }

    /// At most one event per call; a fresh release always wins over tags.
    #[instrument(skip_all, fields(repo = %repo.full_name))]
    pub async fn resolve(&self, repo: &RepositoryRef) -> Result<Option<FreshEvent>, ScanError> {
        let had_release = match self.latest_release(repo).await {
            Lookup::Found(release) => {
                if self.release_is_fresh(repo, &release) {
                    return Ok(Some(FreshEvent::Release(release)));
                }
                true
            }
            Lookup::NotFound => {
                info!("{} has no release", repo.full_name);
                false
            }
            Lookup::Transient(err) => return self.on_transient(repo, err),
        };

        if had_release && self.options.tag_fallback == TagFallback::WhenNoRelease {
            return Ok(None);
        }

        match self.latest_tag(repo).await? {
            Lookup::Found(tag) => {
                let age = self.window.age(tag.timestamp);
                info!(
                    sha = %tag.sha,
                    "{}'s latest tag: {} {}, {}",
                    repo.full_name,
                    tag.name,
                    tag.timestamp.to_rfc3339(),
                    humanize_age(age)
                );
                if self.window.contains(tag.timestamp) {
                    Ok(Some(FreshEvent::Tag(tag)))
                } else {
                    Ok(None)
                }
            }
            Lookup::NotFound => {
                info!("{} has no tag", repo.full_name);
                Ok(None)
            }
            Lookup::Transient(err) => self.on_transient(repo, err),
        }
    }

    /// Newest non-draft release, prereleases included.
    async fn latest_release(&self, repo: &RepositoryRef) -> Lookup<ReleaseCandidate> {
        match self.api.list_releases(repo).await {
            Ok(releases) => match releases.into_iter().find(|r| !r.draft) {
                Some(r) => Lookup::Found(r),
                None => Lookup::NotFound,
            },
            Err(err) => Lookup::Transient(err),
        }
    }

    fn release_is_fresh(&self, repo: &RepositoryRef, release: &ReleaseCandidate) -> bool {
        let Some(published_at) = release.published_at else {
            warn!(release_id = release.id, "{} release {} has no publish time", repo.full_name, release.tag_name);
            return false;
        };
        info!(
            release_id = release.id,
            "{}'s latest release: {} {} {}, {}",
            repo.full_name,
            release.tag_name,
            release.title.as_deref().unwrap_or(""),
            published_at.to_rfc3339(),
            humanize_age(self.window.age(published_at))
        );
        if self.window.contains(published_at) {
            true
        } else {
            info!(release_id = release.id, "ignore {} because it is too old", release.tag_name);
            false
        }
    }

    async fn latest_tag(&self, repo: &RepositoryRef) -> Result<Lookup<TagCandidate>, ScanError> {
        let tags = match self.api.list_tags(repo).await {
            Ok(tags) => tags,
            Err(err) => return Ok(Lookup::Transient(err)),
        };
        info!("{} has {} tags", repo.full_name, tags.len());
        if tags.is_empty() {
            return Ok(Lookup::NotFound);
        }

        let strategy = select_strategy(tags.len(), self.options.clone_threshold);
        let timeline = TagTimeline::for_strategy(strategy, self.api.as_ref(), self.local.as_ref());
        match timeline.tag_timestamps(repo, &tags).await {
            Ok(candidates) => Ok(newest(candidates).map_or(Lookup::NotFound, Lookup::Found)),
            Err(ScanError::Fetch { source, .. }) => Ok(Lookup::Transient(source)),
            Err(err) => Err(err),
        }
    }

    fn on_transient(
        &self,
        repo: &RepositoryRef,
        err: FetchError,
    ) -> Result<Option<FreshEvent>, ScanError> {
        match self.options.on_fetch_error {
            FetchPolicy::Abort => Err(ScanError::fetch(&repo.full_name, err)),
            FetchPolicy::Skip => {
                warn!(error = %err, timed_out = err.timed_out, "skipping {} after fetch failure", repo.full_name);
                Ok(None)
            }
        }
    }
}
