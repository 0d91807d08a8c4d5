use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument};

use crate::error::{FetchError, ScanError};
use crate::github::GithubService;
use crate::model::RepositoryRef;

const MAX_FORK_HOPS: usize = 8;

/// Starred repositories plus every listed organization's repositories, keyed
/// by id with forks replaced by their source. Any listing failure aborts.
#[instrument(skip_all)]
pub async fn collect(
    api: &dyn GithubService,
    orgs: &[String],
) -> Result<BTreeMap<u64, RepositoryRef>, ScanError> {
    let mut repos = BTreeMap::new();
    let mut seen_forks = HashSet::new();

    info!("start searching repos");
    let starred = api
        .list_starred()
        .await
        .map_err(|e| ScanError::fetch("starred repositories", e))?;
    info!(count = starred.len(), "listed starred repositories");
    insert_all(api, &mut repos, &mut seen_forks, starred).await?;

    for org in orgs {
        let listed = api
            .list_org_repos(org)
            .await
            .map_err(|e| ScanError::fetch(format!("organization {}", org), e))?;
        info!(org = %org, count = listed.len(), "listed organization repositories");
        insert_all(api, &mut repos, &mut seen_forks, listed).await?;
    }

    info!("find total {} repos", repos.len());
    Ok(repos)
}

async fn insert_all(
    api: &dyn GithubService,
    repos: &mut BTreeMap<u64, RepositoryRef>,
    seen_forks: &mut HashSet<u64>,
    listed: Vec<RepositoryRef>,
) -> Result<(), ScanError> {
    for repo in listed {
        if repo.is_fork && !seen_forks.insert(repo.id) {
            continue;
        }
        let resolved = to_upstream(api, repo).await?;
        repos.insert(resolved.id, resolved);
    }
    Ok(())
}

async fn to_upstream(
    api: &dyn GithubService,
    mut repo: RepositoryRef,
) -> Result<RepositoryRef, ScanError> {
    for _ in 0..MAX_FORK_HOPS {
        if !repo.is_fork {
            return Ok(repo);
        }
        let source = api
            .upstream_of(&repo)
            .await
            .map_err(|e| ScanError::fetch(&repo.full_name, e))?;
        debug!(fork = %repo.full_name, source = %source.full_name, "replaced fork with its source");
        repo = source;
    }
    Err(ScanError::fetch(
        &repo.full_name,
        FetchError::new("resolve fork source", "fork chain too deep"),
    ))
}
