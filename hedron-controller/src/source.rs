//! Source resolution
//!
//! Turns a Project's repository URL and reference into the content hash of
//! the commit the reference currently points at. Each resolution works in a
//! throwaway bare repository under the scratch directory; the workspace is
//! removed on every exit path, successful or not.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{Cred, CredentialType, Direction, ErrorCode, FetchOptions, RemoteCallbacks, Repository};
use hedron_core::domain::naming::ContentHash;
use tempfile::TempDir;
use thiserror::Error;

use crate::error::ErrorClass;

/// Local ref the resolved commit is fetched into
const RESOLVED_REF: &str = "refs/hedron/resolved";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("repository {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("reference {reference:?} does not exist in {url}")]
    RefNotFound { url: String, reference: String },

    #[error("authentication against {url} failed: {reason}")]
    AuthFailed { url: String, reason: String },

    #[error("invalid repository spec: {0}")]
    InvalidSpec(String),

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

impl ResolveError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ResolveError::Unreachable { .. } | ResolveError::Workspace(_) => ErrorClass::Transient,
            ResolveError::RefNotFound { .. }
            | ResolveError::AuthFailed { .. }
            | ResolveError::InvalidSpec(_) => ErrorClass::Permanent,
        }
    }
}

/// Resolves a repository reference to a content hash
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, url: &str, reference: &str) -> Result<ContentHash, ResolveError>;
}

/// [`SourceResolver`] backed by libgit2
#[derive(Debug, Clone, Default)]
pub struct GitResolver {
    scratch_dir: Option<PathBuf>,
}

impl GitResolver {
    pub fn new(scratch_dir: Option<PathBuf>) -> Self {
        Self { scratch_dir }
    }
}

#[async_trait]
impl SourceResolver for GitResolver {
    async fn resolve(&self, url: &str, reference: &str) -> Result<ContentHash, ResolveError> {
        if url.trim().is_empty() {
            return Err(ResolveError::InvalidSpec(
                "repository url is empty".to_string(),
            ));
        }

        let url = url.trim().to_string();
        let reference = reference.trim().to_string();
        let scratch_dir = self.scratch_dir.clone();

        tokio::task::spawn_blocking(move || resolve_blocking(&url, &reference, scratch_dir.as_deref()))
            .await
            .map_err(|err| ResolveError::Workspace(std::io::Error::other(err)))?
    }
}

fn resolve_blocking(
    url: &str,
    reference: &str,
    scratch_dir: Option<&Path>,
) -> Result<ContentHash, ResolveError> {
    let workspace = workspace(scratch_dir)?;
    tracing::debug!(
        "Resolving {} @ {:?} in {}",
        url,
        reference,
        workspace.path().display()
    );

    let repo = Repository::init_bare(workspace.path()).map_err(|err| remote_error(url, err))?;
    let mut remote = repo
        .remote_anonymous(url)
        .map_err(|err| remote_error(url, err))?;

    // Ask the remote what it advertises before fetching anything
    let advertised: Vec<String> = {
        let connection = remote
            .connect_auth(Direction::Fetch, Some(callbacks(&repo)), None)
            .map_err(|err| remote_error(url, err))?;
        connection
            .list()
            .map_err(|err| remote_error(url, err))?
            .iter()
            .map(|head| head.name().to_string())
            .collect()
    };

    let target = select_ref(&advertised, reference).ok_or_else(|| ResolveError::RefNotFound {
        url: url.to_string(),
        reference: reference.to_string(),
    })?;

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks(&repo));
    let refspec = format!("+{}:{}", target, RESOLVED_REF);
    remote
        .fetch(&[refspec.as_str()], Some(&mut options), None)
        .map_err(|err| remote_error(url, err))?;

    let commit = repo
        .find_reference(RESOLVED_REF)
        .and_then(|resolved| resolved.peel_to_commit())
        .map_err(|err| match err.code() {
            // Tags can point at trees or blobs; there is nothing to build then
            ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Peel => {
                ResolveError::RefNotFound {
                    url: url.to_string(),
                    reference: reference.to_string(),
                }
            }
            _ => remote_error(url, err),
        })?;

    ContentHash::parse(&commit.id().to_string())
        .map_err(|err| ResolveError::InvalidSpec(err.to_string()))
}

fn workspace(scratch_dir: Option<&Path>) -> Result<TempDir, ResolveError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("hedron-");
    let dir = match scratch_dir {
        Some(parent) => builder.tempdir_in(parent)?,
        None => builder.tempdir()?,
    };
    Ok(dir)
}

/// Picks the advertised ref a user-supplied reference names
///
/// An empty reference or `HEAD` follows the remote's default branch. A
/// reference starting with `refs/` must match exactly. Anything else is tried
/// as a branch first and then as a tag.
fn select_ref(advertised: &[String], reference: &str) -> Option<String> {
    let candidates = if reference.is_empty() || reference == "HEAD" {
        vec!["HEAD".to_string()]
    } else if reference.starts_with("refs/") {
        vec![reference.to_string()]
    } else {
        vec![
            format!("refs/heads/{}", reference),
            format!("refs/tags/{}", reference),
        ]
    };

    candidates
        .into_iter()
        .find(|candidate| advertised.iter().any(|name| name == candidate))
}

fn callbacks(repo: &Repository) -> RemoteCallbacks<'static> {
    let cfg = repo.config().ok();
    let mut attempts = CredentialAttempts::default();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        credentials(&mut attempts, cfg.as_ref(), url, username_from_url, allowed)
    });
    callbacks
}

/// Ways of authenticating against a remote, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialMethod {
    SshAgent,
    CredentialHelper,
    Default,
}

/// Methods already offered during one connection
///
/// libgit2 asks again for as long as the remote rejects what it was given,
/// so every method is offered at most once.
#[derive(Debug, Default)]
struct CredentialAttempts {
    tried: Vec<CredentialMethod>,
}

impl CredentialAttempts {
    fn next(&mut self, allowed: CredentialType, has_username: bool) -> Option<CredentialMethod> {
        let candidates = [
            (CredentialMethod::SshAgent, allowed.is_ssh_key() && has_username),
            (CredentialMethod::CredentialHelper, allowed.is_user_pass_plaintext()),
            (CredentialMethod::Default, allowed.is_default()),
        ];

        let method = candidates
            .into_iter()
            .find(|(method, usable)| *usable && !self.tried.contains(method))
            .map(|(method, _)| method)?;
        self.tried.push(method);
        Some(method)
    }
}

fn credentials(
    attempts: &mut CredentialAttempts,
    cfg: Option<&git2::Config>,
    url: &str,
    username_from_url: Option<&str>,
    allowed: CredentialType,
) -> Result<Cred, git2::Error> {
    while let Some(method) = attempts.next(allowed, username_from_url.is_some()) {
        let cred = match (method, username_from_url, cfg) {
            (CredentialMethod::SshAgent, Some(user), _) => Cred::ssh_key_from_agent(user),
            (CredentialMethod::CredentialHelper, _, Some(cfg)) => {
                Cred::credential_helper(cfg, url, username_from_url)
            }
            (CredentialMethod::Default, _, _) => Cred::default(),
            _ => continue,
        };

        match cred {
            Ok(cred) => return Ok(cred),
            Err(err) => tracing::debug!("{:?} credentials unavailable for {}: {}", method, url, err),
        }
    }

    Err(git2::Error::new(
        ErrorCode::Auth,
        git2::ErrorClass::Net,
        format!("no accepted credentials for {}", url),
    ))
}

fn remote_error(url: &str, err: git2::Error) -> ResolveError {
    match err.code() {
        ErrorCode::Auth | ErrorCode::Certificate => ResolveError::AuthFailed {
            url: url.to_string(),
            reason: err.message().to_string(),
        },
        _ => ResolveError::Unreachable {
            url: url.to_string(),
            reason: err.message().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Commit, Oid, Signature};

    struct Fixture {
        _dir: TempDir,
        url: String,
        main: Oid,
        develop: Oid,
    }

    fn commit(repo: &Repository, refname: &str, message: &str) -> Oid {
        let sig = Signature::now("hedron", "hedron@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parent = repo
            .refname_to_id(refname)
            .ok()
            .and_then(|id| repo.find_commit(id).ok());
        let parents: Vec<&Commit> = parent.iter().collect();
        repo.commit(Some(refname), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        commit(&repo, "refs/heads/main", "initial");
        let main = commit(&repo, "refs/heads/main", "second");
        let develop = commit(&repo, "refs/heads/develop", "unrelated");
        repo.set_head("refs/heads/main").unwrap();

        let sig = Signature::now("hedron", "hedron@example.com").unwrap();
        let develop_obj = repo.find_object(develop, None).unwrap();
        repo.tag_lightweight("light", &develop_obj, false).unwrap();
        repo.tag("v1.0.0", &develop_obj, &sig, "release", false)
            .unwrap();

        Fixture {
            url: dir.path().to_str().unwrap().to_string(),
            _dir: dir,
            main,
            develop,
        }
    }

    #[tokio::test]
    async fn test_resolves_branch_to_commit() {
        let fixture = fixture();
        let resolver = GitResolver::default();

        let hash = resolver.resolve(&fixture.url, "main").await.unwrap();
        assert_eq!(hash.as_str(), fixture.main.to_string());

        let hash = resolver
            .resolve(&fixture.url, "refs/heads/develop")
            .await
            .unwrap();
        assert_eq!(hash.as_str(), fixture.develop.to_string());
    }

    #[tokio::test]
    async fn test_empty_reference_follows_head() {
        let fixture = fixture();
        let resolver = GitResolver::default();

        let hash = resolver.resolve(&fixture.url, "").await.unwrap();
        assert_eq!(hash.as_str(), fixture.main.to_string());
    }

    #[tokio::test]
    async fn test_tags_are_peeled_to_commits() {
        let fixture = fixture();
        let resolver = GitResolver::default();

        let light = resolver.resolve(&fixture.url, "light").await.unwrap();
        assert_eq!(light.as_str(), fixture.develop.to_string());

        let annotated = resolver.resolve(&fixture.url, "v1.0.0").await.unwrap();
        assert_eq!(annotated.as_str(), fixture.develop.to_string());
    }

    #[tokio::test]
    async fn test_missing_reference_is_permanent() {
        let fixture = fixture();
        let resolver = GitResolver::default();

        let err = resolver.resolve(&fixture.url, "ghost").await.unwrap_err();
        assert!(matches!(err, ResolveError::RefNotFound { .. }));
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn test_missing_repository_is_transient() {
        let dir = TempDir::new().unwrap();
        let url = dir.path().join("nowhere").to_str().unwrap().to_string();

        let err = GitResolver::default().resolve(&url, "main").await.unwrap_err();
        assert!(matches!(err, ResolveError::Unreachable { .. }));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_empty_url_is_invalid() {
        let err = GitResolver::default().resolve("  ", "main").await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidSpec(_)));
    }

    #[tokio::test]
    async fn test_workspace_is_removed_on_every_path() {
        let fixture = fixture();
        let scratch = TempDir::new().unwrap();
        let resolver = GitResolver::new(Some(scratch.path().to_path_buf()));

        resolver.resolve(&fixture.url, "main").await.unwrap();
        resolver.resolve(&fixture.url, "ghost").await.unwrap_err();

        let leftovers = std::fs::read_dir(scratch.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_select_ref_prefers_branches() {
        let advertised = vec![
            "HEAD".to_string(),
            "refs/heads/main".to_string(),
            "refs/heads/release".to_string(),
            "refs/tags/release".to_string(),
            "refs/tags/v1".to_string(),
        ];

        assert_eq!(select_ref(&advertised, ""), Some("HEAD".to_string()));
        assert_eq!(
            select_ref(&advertised, "release"),
            Some("refs/heads/release".to_string())
        );
        assert_eq!(select_ref(&advertised, "v1"), Some("refs/tags/v1".to_string()));
        assert_eq!(
            select_ref(&advertised, "refs/tags/release"),
            Some("refs/tags/release".to_string())
        );
        assert_eq!(select_ref(&advertised, "refs/heads/ghost"), None);
    }

    #[test]
    fn test_each_credential_method_is_offered_once() {
        let mut attempts = CredentialAttempts::default();
        let allowed = CredentialType::SSH_KEY | CredentialType::USER_PASS_PLAINTEXT;

        assert_eq!(attempts.next(allowed, true), Some(CredentialMethod::SshAgent));
        assert_eq!(
            attempts.next(allowed, true),
            Some(CredentialMethod::CredentialHelper)
        );
        assert_eq!(attempts.next(allowed, true), None);
        assert_eq!(attempts.next(allowed, true), None);
    }

    #[test]
    fn test_ssh_agent_needs_a_username() {
        let mut attempts = CredentialAttempts::default();
        assert_eq!(attempts.next(CredentialType::SSH_KEY, false), None);
    }

    #[test]
    fn test_rejected_credentials_end_in_auth_failure() {
        let url = "https://git.example.com/private.git";
        let mut attempts = CredentialAttempts::default();

        // The remote rejected the first answer and asks again
        assert!(credentials(&mut attempts, None, url, None, CredentialType::DEFAULT).is_ok());
        let Err(err) = credentials(&mut attempts, None, url, None, CredentialType::DEFAULT) else {
            panic!("credentials were offered twice");
        };
        assert_eq!(err.code(), ErrorCode::Auth);

        let resolved = remote_error(url, err);
        assert!(matches!(resolved, ResolveError::AuthFailed { .. }));
        assert_eq!(resolved.class(), ErrorClass::Permanent);
    }
}
