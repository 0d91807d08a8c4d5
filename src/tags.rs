//! Tag timestamp lookup with two interchangeable strategies.
//!
//! Small tag sets are resolved object by object through the API. Large ones
//! are read from a local mirror so a repository with thousands of tags costs
//! one clone instead of thousands of metadata calls.
use tracing::{debug, info};

use crate::clone::LocalTagSource;
use crate::error::ScanError;
use crate::github::{GithubService, TagRef};
use crate::model::{ObjectKind, RepositoryRef, TagCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStrategy {
    Remote,
    LocalClone,
}

/// Clone only when the tag count is strictly above `threshold`.
pub fn select_strategy(tag_count: usize, threshold: usize) -> TagStrategy {
    if tag_count > threshold {
        TagStrategy::LocalClone
    } else {
        TagStrategy::Remote
    }
}

pub enum TagTimeline<'a> {
    Remote(&'a dyn GithubService),
    LocalClone(&'a dyn LocalTagSource),
}

impl<'a> TagTimeline<'a> {
    pub fn for_strategy(
        strategy: TagStrategy,
        api: &'a dyn GithubService,
        local: &'a dyn LocalTagSource,
    ) -> Self {
        match strategy {
            TagStrategy::Remote => TagTimeline::Remote(api),
            TagStrategy::LocalClone => TagTimeline::LocalClone(local),
        }
    }

    /// Timestamps for every tag of `repo`.
    pub async fn tag_timestamps(
        &self,
        repo: &RepositoryRef,
        tags: &[TagRef],
    ) -> Result<Vec<TagCandidate>, ScanError> {
        match self {
            TagTimeline::Remote(api) => remote_timestamps(*api, repo, tags).await,
            TagTimeline::LocalClone(local) => local_timestamps(*local, repo).await,
        }
    }
}

async fn remote_timestamps(
    api: &dyn GithubService,
    repo: &RepositoryRef,
    tags: &[TagRef],
) -> Result<Vec<TagCandidate>, ScanError> {
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        let object = api
            .resolve_tag_ref(repo, &tag.name)
            .await
            .map_err(|e| ScanError::fetch(&repo.full_name, e))?;
        let kind = ObjectKind::parse(&object.typ).ok_or_else(|| ScanError::DataIntegrity {
            repo: repo.full_name.clone(),
            tag: tag.name.clone(),
            kind: object.typ.clone(),
            url: object.url.clone(),
        })?;
        let timestamp = match kind {
            ObjectKind::Commit => api.commit_time(repo, &object.sha).await,
            ObjectKind::AnnotatedTag => api.annotated_tag_time(repo, &object.sha).await,
        }
        .map_err(|e| ScanError::fetch(&repo.full_name, e))?;
        debug!(repo = %repo.full_name, tag = %tag.name, sha = %object.sha, kind = kind.as_str(), %timestamp, "resolved tag");

        out.push(TagCandidate {
            url: TagCandidate::tag_url(&repo.html_url, &tag.name),
            name: tag.name.clone(),
            sha: object.sha,
            kind,
            timestamp,
        });
    }
    Ok(out)
}

async fn local_timestamps(
    local: &dyn LocalTagSource,
    repo: &RepositoryRef,
) -> Result<Vec<TagCandidate>, ScanError> {
    let tags = local
        .local_tags(repo)
        .await
        .map_err(|source| ScanError::Clone {
            repo: repo.full_name.clone(),
            source,
        })?;
    info!(repo = %repo.full_name, count = tags.len(), "read tags from local clone");

    tags.into_iter()
        .map(|t| match (t.kind, t.commit_sha, t.committed_at) {
            (Some(kind), Some(sha), Some(timestamp)) => Ok(TagCandidate {
                url: TagCandidate::tag_url(&repo.html_url, &t.name),
                name: t.name,
                sha,
                kind,
                timestamp,
            }),
            _ => Err(ScanError::DataIntegrity {
                repo: repo.full_name.clone(),
                url: TagCandidate::tag_url(&repo.html_url, &t.name),
                tag: t.name,
                kind: t.target_type,
            }),
        })
        .collect()
}

/// The tag with the greatest timestamp; the earliest listed wins ties.
pub fn newest(tags: Vec<TagCandidate>) -> Option<TagCandidate> {
    tags.into_iter()
        .reduce(|best, t| if t.timestamp > best.timestamp { t } else { best })
}
