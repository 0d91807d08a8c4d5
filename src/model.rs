use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository to be scanned. Keyed by `id` in the working set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryRef {
    pub id: u64,
    pub full_name: String,
    pub html_url: String,
    pub clone_url: String,
    pub is_fork: bool,
    /// Id of the source repository. Only forks carry one, and listings may omit it.
    pub upstream_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseCandidate {
    pub id: u64,
    pub tag_name: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
    pub draft: bool,
    pub prerelease: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ObjectKind {
    Commit,
    AnnotatedTag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::AnnotatedTag => "tag",
        }
    }

    /// Maps a git object type name. Anything else is not a valid tag target.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "commit" => Some(ObjectKind::Commit),
            "tag" => Some(ObjectKind::AnnotatedTag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCandidate {
    pub name: String,
    pub sha: String,
    pub kind: ObjectKind,
    pub timestamp: DateTime<Utc>,
    pub url: String,
}

impl TagCandidate {
    pub fn tag_url(repo_html_url: &str, name: &str) -> String {
        format!("{}/releases/tag/{}", repo_html_url.trim_end_matches('/'), name)
    }
}

/// The single event a repository can produce in one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FreshEvent {
    Release(ReleaseCandidate),
    Tag(TagCandidate),
}

impl FreshEvent {
    /// Release id or the tag's object sha.
    pub fn payload_id(&self) -> String {
        match self {
            FreshEvent::Release(r) => r.id.to_string(),
            FreshEvent::Tag(t) => t.sha.clone(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FreshEvent::Release(r) => &r.tag_name,
            FreshEvent::Tag(t) => &t.name,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FreshEvent::Release(r) => &r.url,
            FreshEvent::Tag(t) => &t.url,
        }
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        match self {
            FreshEvent::Release(r) => r.published_at,
            FreshEvent::Tag(t) => Some(t.timestamp),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationJob {
    pub repo: RepositoryRef,
    pub event: FreshEvent,
    pub idempotency_key: String,
}

impl NotificationJob {
    pub fn new(repo: RepositoryRef, event: FreshEvent) -> Self {
        let idempotency_key = format!("{}:{}", repo.id, event.payload_id());
        Self {
            repo,
            event,
            idempotency_key,
        }
    }
}
