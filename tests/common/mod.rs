#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use release_watchbot::clone::{LocalTag, LocalTagSource};
use release_watchbot::dispatch::{Email, MailTransport};
use release_watchbot::error::{CloneError, FetchError, TransportError};
use release_watchbot::github::model::RefObject;
use release_watchbot::github::{GithubService, RateLimit, TagRef};
use release_watchbot::model::{ReleaseCandidate, RepositoryRef};
use release_watchbot::window::FreshnessWindow;

pub fn reference() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn hours_ago(h: i64) -> DateTime<Utc> {
    reference() - Duration::hours(h)
}

pub fn day_window() -> FreshnessWindow {
    FreshnessWindow::new(Duration::hours(24), reference())
}

pub fn repo(id: u64, full_name: &str) -> RepositoryRef {
    RepositoryRef {
        id,
        full_name: full_name.to_string(),
        html_url: format!("https://github.com/{}", full_name),
        clone_url: format!("https://github.com/{}.git", full_name),
        is_fork: false,
        upstream_id: None,
    }
}

pub fn fork(id: u64, full_name: &str, upstream: u64) -> RepositoryRef {
    RepositoryRef {
        is_fork: true,
        upstream_id: Some(upstream),
        ..repo(id, full_name)
    }
}

pub fn release(id: u64, tag: &str, published_at: DateTime<Utc>) -> ReleaseCandidate {
    ReleaseCandidate {
        id,
        tag_name: tag.to_string(),
        title: None,
        body: None,
        published_at: Some(published_at),
        url: format!("https://github.com/org/x/releases/tag/{}", tag),
        draft: false,
        prerelease: false,
    }
}

/// A tag and the object its ref points at.
#[derive(Debug, Clone)]
pub struct FakeTag {
    pub name: String,
    pub typ: String,
    pub sha: String,
    pub at: DateTime<Utc>,
}

pub fn lightweight(name: &str, sha: &str, at: DateTime<Utc>) -> FakeTag {
    FakeTag {
        name: name.into(),
        typ: "commit".into(),
        sha: sha.into(),
        at,
    }
}

pub fn annotated(name: &str, sha: &str, at: DateTime<Utc>) -> FakeTag {
    FakeTag {
        typ: "tag".into(),
        ..lightweight(name, sha, at)
    }
}

/// In-memory GitHub that records every call as `"<method> <arg>"`.
#[derive(Clone, Default)]
pub struct RecordingGithub {
    pub starred: Vec<RepositoryRef>,
    pub orgs: HashMap<String, Vec<RepositoryRef>>,
    pub upstreams: HashMap<u64, RepositoryRef>,
    pub releases: HashMap<String, Vec<ReleaseCandidate>>,
    pub tags: HashMap<String, Vec<FakeTag>>,
    pub failing: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingGithub {
    pub fn with_starred(mut self, repos: Vec<RepositoryRef>) -> Self {
        self.starred = repos;
        self
    }

    pub fn with_org(mut self, org: &str, repos: Vec<RepositoryRef>) -> Self {
        self.orgs.insert(org.to_string(), repos);
        self
    }

    pub fn with_upstream(mut self, fork_id: u64, source: RepositoryRef) -> Self {
        self.upstreams.insert(fork_id, source);
        self
    }

    pub fn with_releases(mut self, repo: &str, releases: Vec<ReleaseCandidate>) -> Self {
        self.releases.insert(repo.to_string(), releases);
        self
    }

    pub fn with_tags(mut self, repo: &str, tags: Vec<FakeTag>) -> Self {
        self.tags.insert(repo.to_string(), tags);
        self
    }

    /// Every metadata call for `repo` fails with a 502.
    pub fn failing_for(mut self, repo: &str) -> Self {
        self.failing.insert(repo.to_string());
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn record(&self, call: String) {
        self.calls.lock().await.push(call);
    }

    fn check(&self, op: &str, repo: &RepositoryRef) -> Result<(), FetchError> {
        if self.failing.contains(&repo.full_name) {
            return Err(FetchError::new(op, "bad gateway").with_status(502));
        }
        Ok(())
    }

    fn find_object(&self, repo: &RepositoryRef, sha: &str) -> Result<&FakeTag, FetchError> {
        self.tags
            .get(&repo.full_name)
            .and_then(|tags| tags.iter().find(|t| t.sha == sha))
            .ok_or_else(|| FetchError::new(format!("get object {}", sha), "Not Found").with_status(404))
    }
}

#[async_trait]
impl GithubService for RecordingGithub {
    async fn list_starred(&self) -> Result<Vec<RepositoryRef>, FetchError> {
        self.record("list_starred".into()).await;
        Ok(self.starred.clone())
    }

    async fn list_org_repos(&self, org: &str) -> Result<Vec<RepositoryRef>, FetchError> {
        self.record(format!("list_org_repos {}", org)).await;
        self.orgs
            .get(org)
            .cloned()
            .ok_or_else(|| FetchError::new(format!("list repositories of {}", org), "Not Found").with_status(404))
    }

    async fn upstream_of(&self, fork: &RepositoryRef) -> Result<RepositoryRef, FetchError> {
        self.record(format!("upstream_of {}", fork.full_name)).await;
        self.upstreams
            .get(&fork.id)
            .cloned()
            .ok_or_else(|| FetchError::new("get source", "fork has no source repository"))
    }

    async fn list_releases(&self, repo: &RepositoryRef) -> Result<Vec<ReleaseCandidate>, FetchError> {
        self.record(format!("list_releases {}", repo.full_name)).await;
        self.check("list releases", repo)?;
        Ok(self.releases.get(&repo.full_name).cloned().unwrap_or_default())
    }

    async fn list_tags(&self, repo: &RepositoryRef) -> Result<Vec<TagRef>, FetchError> {
        self.record(format!("list_tags {}", repo.full_name)).await;
        self.check("list tags", repo)?;
        Ok(self
            .tags
            .get(&repo.full_name)
            .map(|tags| {
                tags.iter()
                    .map(|t| TagRef { name: t.name.clone() })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn resolve_tag_ref(&self, repo: &RepositoryRef, tag: &str) -> Result<RefObject, FetchError> {
        self.record(format!("resolve_tag_ref {} {}", repo.full_name, tag)).await;
        let found = self
            .tags
            .get(&repo.full_name)
            .and_then(|tags| tags.iter().find(|t| t.name == tag))
            .ok_or_else(|| FetchError::new("resolve ref", "Not Found").with_status(404))?;
        Ok(RefObject {
            typ: found.typ.clone(),
            sha: found.sha.clone(),
            url: format!(
                "https://api.github.com/repos/{}/git/{}s/{}",
                repo.full_name, found.typ, found.sha
            ),
        })
    }

    async fn commit_time(&self, repo: &RepositoryRef, sha: &str) -> Result<DateTime<Utc>, FetchError> {
        self.record(format!("commit_time {} {}", repo.full_name, sha)).await;
        self.find_object(repo, sha).map(|t| t.at)
    }

    async fn annotated_tag_time(
        &self,
        repo: &RepositoryRef,
        sha: &str,
    ) -> Result<DateTime<Utc>, FetchError> {
        self.record(format!("annotated_tag_time {} {}", repo.full_name, sha)).await;
        self.find_object(repo, sha).map(|t| t.at)
    }

    async fn rate_limit(&self) -> Result<RateLimit, FetchError> {
        self.record("rate_limit".into()).await;
        Ok(RateLimit {
            limit: 5000,
            remaining: 4990,
            reset: reference() + Duration::hours(1),
        })
    }
}

/// Stands in for a local mirror; records which repositories were cloned.
#[derive(Clone, Default)]
pub struct FakeLocal {
    pub tags: HashMap<String, Vec<LocalTag>>,
    cloned: Arc<Mutex<Vec<String>>>,
}

impl FakeLocal {
    pub fn with_tags(mut self, repo: &str, tags: Vec<LocalTag>) -> Self {
        self.tags.insert(repo.to_string(), tags);
        self
    }

    pub async fn cloned(&self) -> Vec<String> {
        self.cloned.lock().await.clone()
    }
}

#[async_trait]
impl LocalTagSource for FakeLocal {
    async fn local_tags(&self, repo: &RepositoryRef) -> Result<Vec<LocalTag>, CloneError> {
        self.cloned.lock().await.push(repo.full_name.clone());
        self.tags.get(&repo.full_name).cloned().ok_or_else(|| CloneError::Git {
            command: "clone",
            status: "exit status: 128".into(),
            stderr: "repository not found".into(),
        })
    }
}

pub fn local_commit_tag(name: &str, sha: &str, at: DateTime<Utc>) -> LocalTag {
    LocalTag {
        name: name.into(),
        target_type: "commit".into(),
        kind: Some(release_watchbot::model::ObjectKind::Commit),
        commit_sha: Some(sha.into()),
        committed_at: Some(at),
    }
}

/// Replays scripted send outcomes, then succeeds.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<(), TransportError>>>>,
    attempts: Arc<Mutex<usize>>,
    delivered: Arc<Mutex<Vec<Email>>>,
    always_fail: Option<bool>,
}

impl ScriptedTransport {
    pub fn with_outcomes(outcomes: Vec<Result<(), TransportError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(outcomes))),
            ..Default::default()
        }
    }

    /// Fails every attempt; `transient` picks the error class.
    pub fn always_failing(transient: bool) -> Self {
        Self {
            always_fail: Some(transient),
            ..Default::default()
        }
    }

    pub async fn attempts(&self) -> usize {
        *self.attempts.lock().await
    }

    pub async fn delivered(&self) -> Vec<Email> {
        self.delivered.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn send(&self, email: &Email) -> Result<(), TransportError> {
        *self.attempts.lock().await += 1;
        if let Some(transient) = self.always_fail {
            return Err(if transient {
                TransportError::transient("421 service not available")
            } else {
                TransportError::permanent("550 mailbox unavailable")
            });
        }
        let outcome = self.script.lock().await.pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            self.delivered.lock().await.push(email.clone());
        }
        outcome
    }
}
