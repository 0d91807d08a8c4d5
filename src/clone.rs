use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::error::CloneError;
use crate::model::{ObjectKind, RepositoryRef};

const FOR_EACH_REF_FORMAT: &str = "%(refname:strip=2)%09%(objecttype)%09%(objectname)%09%(committerdate:iso-strict)%09%(*objecttype)%09%(*objectname)%09%(*committerdate:iso-strict)";

/// A tag read from a local mirror, peeled to the commit it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTag {
    pub name: String,
    /// Type of the object the tag ultimately points at.
    pub target_type: String,
    pub kind: Option<ObjectKind>,
    pub commit_sha: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
}

/// Clone a repository to scratch storage and list its tags with commit times.
#[async_trait]
pub trait LocalTagSource: Send + Sync {
    async fn local_tags(&self, repo: &RepositoryRef) -> Result<Vec<LocalTag>, CloneError>;
}

/// Shells out to the `git` binary on PATH.
#[derive(Debug, Clone)]
pub struct GitCli {
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn git(&self, command: &'static str, cmd: &mut Command) -> Result<Output, CloneError> {
        let output = tokio::time::timeout(self.timeout, cmd.kill_on_drop(true).output())
            .await
            .map_err(|_| CloneError::Timeout(command))??;
        if !output.status.success() {
            return Err(CloneError::Git {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl LocalTagSource for GitCli {
    #[instrument(skip_all, fields(repo = %repo.full_name))]
    async fn local_tags(&self, repo: &RepositoryRef) -> Result<Vec<LocalTag>, CloneError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let prefix = format!("{}-", repo.full_name.replace('/', "__"));
        // Removed when dropped at the end of this call.
        let scratch = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.scratch_dir)?;
        let dest = scratch.path().join("mirror.git");

        info!("start clone {} to {}", repo.full_name, dest.display());
        self.git(
            "clone",
            Command::new("git")
                .arg("clone")
                .arg("--bare")
                .arg("--quiet")
                .arg("--filter=blob:none")
                .arg(&repo.clone_url)
                .arg(dest.as_os_str()),
        )
        .await?;
        info!("finish clone {}", repo.full_name);

        let output = self.git("for-each-ref", &mut for_each_ref(&dest)).await?;
        let mut tags = parse_for_each_ref(&String::from_utf8_lossy(&output.stdout))?;
        for tag in tags.iter_mut().filter(|t| t.target_type == "tag") {
            self.peel_nested(&dest, tag).await?;
        }
        Ok(tags)
    }
}

impl GitCli {
    /// `for-each-ref` dereferences one level only; a tag of a tag needs `^{}`.
    async fn peel_nested(&self, git_dir: &Path, tag: &mut LocalTag) -> Result<(), CloneError> {
        let target = format!("refs/tags/{}^{{}}", tag.name);
        let output = self
            .git("cat-file", git_cmd(git_dir).arg("cat-file").arg("-t").arg(&target))
            .await?;
        let final_type = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if final_type != "commit" {
            tag.target_type = final_type;
            return Ok(());
        }

        let output = self
            .git(
                "log",
                git_cmd(git_dir)
                    .arg("log")
                    .arg("-1")
                    .arg("--format=%H%x09%cI")
                    .arg(&target),
            )
            .await?;
        let (sha, committed_at) = parse_peeled_commit(&String::from_utf8_lossy(&output.stdout))?;
        debug!(tag = %tag.name, sha = %sha, "peeled nested tag");
        tag.target_type = final_type;
        tag.commit_sha = Some(sha);
        tag.committed_at = Some(committed_at);
        Ok(())
    }
}

fn git_cmd(git_dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("--git-dir").arg(git_dir.as_os_str());
    cmd
}

/// Parses `<sha>\t<iso-strict committer date>` from `git log --format=%H%x09%cI`.
pub fn parse_peeled_commit(stdout: &str) -> Result<(String, DateTime<Utc>), CloneError> {
    let line = stdout.trim();
    let Some((sha, date)) = line.split_once('\t') else {
        return Err(CloneError::Parse(line.to_string()));
    };
    let committed_at = DateTime::parse_from_rfc3339(date)
        .map_err(|_| CloneError::Parse(line.to_string()))?
        .with_timezone(&Utc);
    Ok((sha.to_string(), committed_at))
}

fn for_each_ref(git_dir: &Path) -> Command {
    let mut cmd = git_cmd(git_dir);
    cmd.arg("for-each-ref")
        .arg(format!("--format={}", FOR_EACH_REF_FORMAT))
        .arg("refs/tags");
    cmd
}

/// Parses `for-each-ref` output produced with [`FOR_EACH_REF_FORMAT`].
pub fn parse_for_each_ref(stdout: &str) -> Result<Vec<LocalTag>, CloneError> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<LocalTag, CloneError> {
    let fields: Vec<&str> = line.split('\t').collect();
    let &[name, obj_type, obj_sha, obj_date, peeled_type, peeled_sha, peeled_date] =
        fields.as_slice()
    else {
        return Err(CloneError::Parse(line.to_string()));
    };

    let date = |raw: &str| -> Result<Option<DateTime<Utc>>, CloneError> {
        if raw.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|_| CloneError::Parse(line.to_string()))
    };

    let tag = match (obj_type, peeled_type) {
        ("commit", _) => LocalTag {
            name: name.to_string(),
            target_type: "commit".into(),
            kind: Some(ObjectKind::Commit),
            commit_sha: Some(obj_sha.to_string()),
            committed_at: date(obj_date)?,
        },
        ("tag", "commit") => LocalTag {
            name: name.to_string(),
            target_type: "commit".into(),
            kind: Some(ObjectKind::AnnotatedTag),
            commit_sha: Some(peeled_sha.to_string()),
            committed_at: date(peeled_date)?,
        },
        ("tag", other) => LocalTag {
            name: name.to_string(),
            target_type: other.to_string(),
            kind: Some(ObjectKind::AnnotatedTag),
            commit_sha: None,
            committed_at: None,
        },
        (other, _) => LocalTag {
            name: name.to_string(),
            target_type: other.to_string(),
            kind: None,
            commit_sha: None,
            committed_at: None,
        },
    };
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_lightweight_and_annotated_tags() {
        let out = "v1.0\tcommit\taaa\t2024-04-20T10:00:00+08:00\t\t\t\n\
                   v1.1\ttag\tbbb\t\tcommit\tccc\t2024-05-01T01:00:00Z\n";
        let tags = parse_for_each_ref(out).unwrap();
        assert_eq!(tags.len(), 2);

        assert_eq!(tags[0].name, "v1.0");
        assert_eq!(tags[0].kind, Some(ObjectKind::Commit));
        assert_eq!(tags[0].commit_sha.as_deref(), Some("aaa"));
        assert_eq!(
            tags[0].committed_at,
            Some(Utc.with_ymd_and_hms(2024, 4, 20, 2, 0, 0).unwrap())
        );

        assert_eq!(tags[1].kind, Some(ObjectKind::AnnotatedTag));
        assert_eq!(tags[1].commit_sha.as_deref(), Some("ccc"));
        assert_eq!(
            tags[1].committed_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap())
        );
    }

    #[test]
    fn non_commit_targets_are_flagged() {
        let out = "tree-tag\ttree\tddd\t\t\t\t\nblob-tag\ttag\teee\t\tblob\tfff\t\n";
        let tags = parse_for_each_ref(out).unwrap();
        assert_eq!(tags[0].target_type, "tree");
        assert_eq!(tags[0].kind, None);
        assert!(tags[0].committed_at.is_none());
        assert_eq!(tags[1].target_type, "blob");
        assert!(tags[1].commit_sha.is_none());
    }

    #[test]
    fn malformed_lines_error() {
        assert!(matches!(
            parse_for_each_ref("just-a-name\n"),
            Err(CloneError::Parse(_))
        ));
        assert!(matches!(
            parse_for_each_ref("v1\tcommit\taaa\tyesterday\t\t\t\n"),
            Err(CloneError::Parse(_))
        ));
    }

    #[test]
    fn empty_output_has_no_tags() {
        assert!(parse_for_each_ref("\n").unwrap().is_empty());
    }

    #[test]
    fn nested_tag_is_left_for_peeling() {
        let tags = parse_for_each_ref("outer\ttag\tabc\t\ttag\tdef\t\n").unwrap();
        assert_eq!(tags[0].target_type, "tag");
        assert!(tags[0].commit_sha.is_none());

        let (sha, at) = parse_peeled_commit("66b4e1\t2024-04-30T18:30:00+02:00\n").unwrap();
        assert_eq!(sha, "66b4e1");
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 4, 30, 16, 30, 0).unwrap());
        assert!(matches!(parse_peeled_commit("66b4e1"), Err(CloneError::Parse(_))));
    }
}
