use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::model::{ReleaseCandidate, RepositoryRef};

pub mod model;

use model::{
    GitCommitResp, GitTagResp, RateLimitResp, RefObject, RefResp, ReleaseResp, RepoResp, TagResp,
};

const GITHUB_API_BASE: &str = "https://api.github.com/";
const PER_PAGE: u32 = 100;

static NEXT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<([^>]+)>;\s*rel="next""#).expect("valid next-link regex"));

/// A tag as listed by the host, before its object is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: DateTime<Utc>,
}

/// Repository listing and release/tag metadata.
#[async_trait]
pub trait GithubService: Send + Sync {
    async fn list_starred(&self) -> Result<Vec<RepositoryRef>, FetchError>;

    async fn list_org_repos(&self, org: &str) -> Result<Vec<RepositoryRef>, FetchError>;

    /// The repository a fork was created from.
    async fn upstream_of(&self, fork: &RepositoryRef) -> Result<RepositoryRef, FetchError>;

    /// Newest first, drafts and prereleases included.
    async fn list_releases(&self, repo: &RepositoryRef) -> Result<Vec<ReleaseCandidate>, FetchError>;

    async fn list_tags(&self, repo: &RepositoryRef) -> Result<Vec<TagRef>, FetchError>;

    async fn resolve_tag_ref(&self, repo: &RepositoryRef, tag: &str) -> Result<RefObject, FetchError>;

    async fn commit_time(&self, repo: &RepositoryRef, sha: &str) -> Result<DateTime<Utc>, FetchError>;

    async fn annotated_tag_time(
        &self,
        repo: &RepositoryRef,
        sha: &str,
    ) -> Result<DateTime<Utc>, FetchError>;

    /// Diagnostic only.
    async fn rate_limit(&self) -> Result<RateLimit, FetchError>;
}

#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GithubClient {
    pub fn new(token: String, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = Url::parse(GITHUB_API_BASE).expect("valid default GitHub URL");
        Self::with_base_url(token, base_url, timeout)
    }

    pub fn with_base_url(token: String, base_url: Url, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent("release-watchbot/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::from_reqwest("build http client", e))?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn from_config(cfg: &crate::config::Config) -> Result<Self, FetchError> {
        let base_url = Url::parse(&cfg.github.api_base)
            .map_err(|e| FetchError::new("parse github.api_base", e.to_string()))?;
        Self::with_base_url(
            cfg.github.token.clone(),
            base_url,
            Duration::from_secs(cfg.github.timeout_seconds),
        )
    }

    /// Repository detail by `owner/name`.
    pub async fn get_repository(&self, full_name: &str) -> Result<RepositoryRef, FetchError> {
        let op = format!("get repository {}", full_name);
        let detail: RepoResp = self.get_json(&op, &format!("repos/{}", full_name)).await?;
        Ok(RepositoryRef::from(detail))
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::new(format!("build url {}", path), e.to_string()))
    }

    pub fn build_request(&self, url: Url) -> Result<reqwest::Request, FetchError> {
        self.http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .build()
            .map_err(|e| FetchError::from_reqwest("build request", e))
    }

    async fn send(&self, op: &str, url: Url) -> Result<reqwest::Response, FetchError> {
        let request = self.build_request(url)?;
        debug!(url = %request.url(), op, "github request");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| FetchError::from_reqwest(op, e))?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!(op, "rate limited by GitHub: {}", body);
            return Err(FetchError::new(op, body).with_status(status.as_u16()));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::new(op, body).with_status(status.as_u16()));
        }
        Ok(res)
    }

    async fn get_json<T: DeserializeOwned>(&self, op: &str, path: &str) -> Result<T, FetchError> {
        let url = self.endpoint(path)?;
        let res = self.send(op, url).await?;
        res.json::<T>()
            .await
            .map_err(|e| FetchError::from_reqwest(op, e))
    }

    /// Follows `rel="next"` links until exhausted or `stop` sees what it needs.
    async fn get_paginated<T, F>(&self, op: &str, path: &str, stop: F) -> Result<Vec<T>, FetchError>
    where
        T: DeserializeOwned,
        F: Fn(&[T]) -> bool,
    {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string());

        let mut items = Vec::new();
        loop {
            let res = self.send(op, url).await?;
            let next = next_page(res.headers());
            let mut page: Vec<T> = res.json().await.map_err(|e| FetchError::from_reqwest(op, e))?;
            let done = stop(&page);
            items.append(&mut page);
            match next {
                Some(next) if !done => {
                    url = Url::parse(&next)
                        .map_err(|e| FetchError::new(op, format!("bad next link {}: {}", next, e)))?;
                }
                _ => break,
            }
        }
        Ok(items)
    }
}

/// Extracts the `rel="next"` target from a `Link` header.
pub fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    NEXT_LINK
        .captures(link)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Release paging stops at the first page holding a non-draft release.
fn has_published_release(page: &[ReleaseResp]) -> bool {
    page.iter().any(|r| !r.draft)
}

/// Git ref names may contain characters that are meaningful in URLs.
fn encode_ref(name: &str) -> String {
    name.replace('%', "%25").replace('#', "%23").replace('?', "%3F")
}

#[async_trait]
impl GithubService for GithubClient {
    async fn list_starred(&self) -> Result<Vec<RepositoryRef>, FetchError> {
        let repos: Vec<RepoResp> = self
            .get_paginated("list starred repositories", "user/starred", |_| false)
            .await?;
        Ok(repos.into_iter().map(RepositoryRef::from).collect())
    }

    async fn list_org_repos(&self, org: &str) -> Result<Vec<RepositoryRef>, FetchError> {
        let op = format!("list repositories of {}", org);
        let repos: Vec<RepoResp> = self
            .get_paginated(&op, &format!("orgs/{}/repos", org), |_| false)
            .await?;
        Ok(repos.into_iter().map(RepositoryRef::from).collect())
    }

    async fn upstream_of(&self, fork: &RepositoryRef) -> Result<RepositoryRef, FetchError> {
        let op = format!("get source of {}", fork.full_name);
        let detail: RepoResp = self
            .get_json(&op, &format!("repos/{}", fork.full_name))
            .await?;
        let source = detail
            .source
            .or(detail.parent)
            .ok_or_else(|| FetchError::new(&op, "fork has no source repository"))?;
        Ok(RepositoryRef::from(*source))
    }

    async fn list_releases(&self, repo: &RepositoryRef) -> Result<Vec<ReleaseCandidate>, FetchError> {
        let op = format!("list releases of {}", repo.full_name);
        // Only the newest published release matters.
        let releases: Vec<ReleaseResp> = self
            .get_paginated(
                &op,
                &format!("repos/{}/releases", repo.full_name),
                has_published_release,
            )
            .await?;
        Ok(releases.into_iter().map(ReleaseCandidate::from).collect())
    }

    async fn list_tags(&self, repo: &RepositoryRef) -> Result<Vec<TagRef>, FetchError> {
        let op = format!("list tags of {}", repo.full_name);
        let tags: Vec<TagResp> = self
            .get_paginated(&op, &format!("repos/{}/tags", repo.full_name), |_| false)
            .await?;
        Ok(tags
            .into_iter()
            .map(|t| TagRef { name: t.name })
            .collect())
    }

    async fn resolve_tag_ref(&self, repo: &RepositoryRef, tag: &str) -> Result<RefObject, FetchError> {
        let op = format!("resolve ref tags/{} of {}", tag, repo.full_name);
        let r: RefResp = self
            .get_json(
                &op,
                &format!("repos/{}/git/ref/tags/{}", repo.full_name, encode_ref(tag)),
            )
            .await?;
        Ok(r.object)
    }

    async fn commit_time(&self, repo: &RepositoryRef, sha: &str) -> Result<DateTime<Utc>, FetchError> {
        let op = format!("get commit {} of {}", sha, repo.full_name);
        let c: GitCommitResp = self
            .get_json(&op, &format!("repos/{}/git/commits/{}", repo.full_name, sha))
            .await?;
        Ok(c.committer.date)
    }

    async fn annotated_tag_time(
        &self,
        repo: &RepositoryRef,
        sha: &str,
    ) -> Result<DateTime<Utc>, FetchError> {
        let op = format!("get tag object {} of {}", sha, repo.full_name);
        let t: GitTagResp = self
            .get_json(&op, &format!("repos/{}/git/tags/{}", repo.full_name, sha))
            .await?;
        Ok(t.tagger.date)
    }

    async fn rate_limit(&self) -> Result<RateLimit, FetchError> {
        let r: RateLimitResp = self.get_json("get rate limit", "rate_limit").await?;
        let reset = Utc
            .timestamp_opt(r.rate.reset, 0)
            .single()
            .ok_or_else(|| FetchError::new("get rate limit", "reset out of range"))?;
        Ok(RateLimit {
            limit: r.rate.limit,
            remaining: r.rate.remaining,
            reset,
        })
    }
}
