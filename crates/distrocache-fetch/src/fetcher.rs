use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::{
    api, archive,
    error::{FetchError, Result},
    git,
    host::GitHost,
    reference::{select_ref, RefKind, RefQuery, ResolvedRef},
};

/// Resolves references and retrieves single versions of repositories.
///
/// All methods block; callers on an async runtime should run them on a
/// blocking thread. Failures are never retried internally.
pub trait Fetcher: Send + Sync {
    /// Maps `reference` to a commit. Full hashes are returned unchanged
    /// without touching the network.
    fn resolve_ref(&self, kind: &str, url: &str, reference: &str) -> Result<ResolvedRef>;

    /// Downloads `version` and extracts it to a scoped temporary directory.
    fn fetch(&self, kind: &str, url: &str, version: &str) -> Result<ExtractedTree>;

    /// Reads a single file at `version` without fetching the whole tree.
    fn get_file(&self, kind: &str, url: &str, version: &str, path: &str) -> Result<Vec<u8>>;
}

/// An extracted repository tree. The directory is removed when dropped.
#[derive(Debug)]
pub struct ExtractedTree {
    _dir: TempDir,
    root: PathBuf,
}

impl ExtractedTree {
    pub fn new(dir: TempDir, root: PathBuf) -> Self {
        Self { _dir: dir, root }
    }

    /// Wraps an already populated directory, using it as the root.
    pub fn from_dir(dir: TempDir) -> Self {
        let root = dir.path().to_path_buf();
        Self { _dir: dir, root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

/// [`Fetcher`] for git repositories, using host archive endpoints where
/// available and the `git` command line otherwise.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    work_dir: PathBuf,
    use_host_api: bool,
}

impl GitFetcher {
    pub fn new<P: Into<PathBuf>>(work_dir: P) -> Self {
        Self {
            work_dir: work_dir.into(),
            use_host_api: true,
        }
    }

    pub fn with_host_api(mut self, enabled: bool) -> Self {
        self.use_host_api = enabled;
        self
    }

    fn host(kind: &str, url: &str) -> Result<GitHost> {
        if kind != "git" {
            return Err(FetchError::UnsupportedType(kind.to_string()));
        }
        GitHost::parse(url).ok_or_else(|| FetchError::InvalidUrl { url: url.to_string() })
    }

    fn tempdir(&self, host: &GitHost) -> Result<TempDir> {
        std::fs::create_dir_all(&self.work_dir)?;
        Ok(tempfile::Builder::new()
            .prefix(&format!("distrocache--{}--", host.slug()))
            .tempdir_in(&self.work_dir)?)
    }

    fn remote_location(host: &GitHost, url: &str) -> String {
        match host {
            GitHost::Local { path } => path.to_string_lossy().into_owned(),
            _ => url.to_string(),
        }
    }
}

impl Fetcher for GitFetcher {
    fn resolve_ref(&self, kind: &str, url: &str, reference: &str) -> Result<ResolvedRef> {
        let host = Self::host(kind, url)?;
        if RefKind::classify(reference) == RefKind::Immutable {
            return Ok(ResolvedRef::commit(reference));
        }

        let query = RefQuery::from_reference(reference);
        let not_found = || {
            FetchError::RefNotFound {
                url: url.to_string(),
                reference: reference.to_string(),
            }
        };

        if self.use_host_api && api::has_api(&host) {
            match api::resolve(&host, &query) {
                Ok(Some(resolved)) => return Ok(resolved),
                Ok(None) => return Err(not_found()),
                Err(err) => {
                    warn!(url, reference, error = %err, "host API lookup failed, using git ls-remote");
                }
            }
        }

        let refs = git::ls_remote(&Self::remote_location(&host, url), query.name())?;
        let resolved = select_ref(&refs, &query).ok_or_else(not_found)?;
        debug!(url, reference, version = %resolved.version, "resolved reference");
        Ok(resolved)
    }

    fn fetch(&self, kind: &str, url: &str, version: &str) -> Result<ExtractedTree> {
        let host = Self::host(kind, url)?;
        let dir = self.tempdir(&host)?;

        let root = match &host {
            GitHost::Local { path } => {
                let archive_path = dir.path().join("archive.tar.gz");
                git::archive_local(path, version, &archive_path)?;
                archive::unpack(&archive_path, &dir.path().join("tree"), url)?
            }
            GitHost::Other { .. } => {
                let tree = dir.path().join("tree");
                std::fs::create_dir_all(&tree)?;
                git::shallow_checkout(url, version, &tree)?;
                tree
            }
            _ => {
                let archive_url = host
                    .archive_url(version)
                    .ok_or_else(|| FetchError::InvalidUrl { url: url.to_string() })?;
                let archive_path = dir.path().join("archive.tar.gz");
                let auth = match host {
                    GitHost::GitLab { .. } => host.auth_header(),
                    _ => None,
                };
                archive::download(&archive_url, auth.as_ref(), &archive_path)?;
                archive::unpack(&archive_path, &dir.path().join("tree"), &archive_url)?
            }
        };

        debug!(url, version, root = %root.display(), "extracted repository");
        Ok(ExtractedTree::new(dir, root))
    }

    fn get_file(&self, kind: &str, url: &str, version: &str, path: &str) -> Result<Vec<u8>> {
        let host = Self::host(kind, url)?;

        match &host {
            GitHost::Local { path: repo } => git::show_file(repo, version, path),
            GitHost::Other { .. } => {
                let tree = self.fetch(kind, url, version)?;
                let file = tree.path().join(path);
                std::fs::read(&file).map_err(|err| {
                    match err.kind() {
                        std::io::ErrorKind::NotFound => {
                            FetchError::NotFound {
                                url: format!("{url}#{version}:{path}"),
                            }
                        }
                        _ => FetchError::Io(err),
                    }
                })
            }
            _ => {
                let file_url = host
                    .file_url(version, path)
                    .ok_or_else(|| FetchError::InvalidUrl { url: url.to_string() })?;
                archive::download_bytes(&file_url, host.auth_header().as_ref())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_git_types() {
        let fetcher = GitFetcher::new(std::env::temp_dir());
        let err = fetcher
            .resolve_ref("hg", "https://example.com/repo", "default")
            .unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedType(kind) if kind == "hg"));

        let err = fetcher
            .fetch("svn", "https://example.com/repo", "1")
            .unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedType(_)));
    }

    #[test]
    fn test_commit_hash_resolves_without_network() {
        let fetcher = GitFetcher::new(std::env::temp_dir());
        let sha = "0123456789ABCDEF0123456789ABCDEF01234567";
        let resolved = fetcher
            .resolve_ref("git", "https://unreachable.invalid/x/y.git", sha)
            .unwrap();
        assert_eq!(resolved.version, sha.to_ascii_lowercase());
        assert!(!resolved.is_floating());
    }

    #[test]
    fn test_invalid_url() {
        let fetcher = GitFetcher::new(std::env::temp_dir());
        let err = fetcher.fetch("git", "nonsense", "abc").unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[test]
    fn test_extracted_tree_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("file"), "x").unwrap();

        let tree = ExtractedTree::from_dir(dir);
        assert_eq!(tree.path(), path);
        drop(tree);
        assert!(!path.exists());
    }
}
