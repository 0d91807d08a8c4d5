use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{ReleaseCandidate, RepositoryRef};

#[derive(Deserialize, Debug, Clone)]
pub struct RepoResp {
    pub id: u64,
    pub full_name: String,
    pub html_url: String,
    pub clone_url: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub source: Option<Box<RepoResp>>,
    #[serde(default)]
    pub parent: Option<Box<RepoResp>>,
}

impl From<RepoResp> for RepositoryRef {
    fn from(r: RepoResp) -> Self {
        let upstream_id = if r.fork {
            r.source.as_ref().or(r.parent.as_ref()).map(|s| s.id)
        } else {
            None
        };
        RepositoryRef {
            id: r.id,
            full_name: r.full_name,
            html_url: r.html_url,
            clone_url: r.clone_url,
            is_fork: r.fork,
            upstream_id,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct ReleaseResp {
    pub id: u64,
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub html_url: String,
}

impl From<ReleaseResp> for ReleaseCandidate {
    fn from(r: ReleaseResp) -> Self {
        ReleaseCandidate {
            id: r.id,
            tag_name: r.tag_name,
            title: r.name.filter(|n| !n.trim().is_empty()),
            body: r.body.filter(|b| !b.trim().is_empty()),
            published_at: r.published_at,
            url: r.html_url,
            draft: r.draft,
            prerelease: r.prerelease,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct TagResp {
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct RefResp {
    pub object: RefObject,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RefObject {
    #[serde(rename = "type")]
    pub typ: String,
    pub sha: String,
    pub url: String,
}

#[derive(Deserialize, Debug)]
pub struct GitCommitResp {
    pub committer: Signature,
}

#[derive(Deserialize, Debug)]
pub struct GitTagResp {
    pub tagger: Signature,
}

#[derive(Deserialize, Debug)]
pub struct Signature {
    pub date: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
pub struct RateLimitResp {
    pub rate: RateResp,
}

#[derive(Deserialize, Debug)]
pub struct RateResp {
    pub limit: u64,
    pub remaining: u64,
    pub reset: i64,
}
