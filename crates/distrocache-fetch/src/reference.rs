//! Classification and resolution of branch, tag and commit references.

use serde::{Deserialize, Serialize};

/// How much a reference string says about itself before asking the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// A full commit hash; usable as a version as-is.
    Immutable,
    /// Explicitly a branch (`refs/heads/...` or `heads/...`).
    Floating,
    /// A bare name or tag that must be looked up on the remote.
    Ambiguous,
}

impl RefKind {
    pub fn classify(reference: &str) -> Self {
        if is_commit_hash(reference) {
            RefKind::Immutable
        } else if reference.starts_with("refs/heads/") || reference.starts_with("heads/") {
            RefKind::Floating
        } else {
            RefKind::Ambiguous
        }
    }
}

/// A full SHA-1 or SHA-256 object name.
pub fn is_commit_hash(reference: &str) -> bool {
    matches!(reference.len(), 40 | 64) && reference.bytes().all(|b| b.is_ascii_hexdigit())
}

/// What a resolved reference turned out to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefTarget {
    Commit,
    Branch,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    /// Commit hash the reference points at.
    pub version: String,
    pub target: RefTarget,
}

impl ResolvedRef {
    pub fn commit(version: &str) -> Self {
        Self {
            version: version.to_ascii_lowercase(),
            target: RefTarget::Commit,
        }
    }

    /// Branches move; tags and commits are treated as frozen.
    pub fn is_floating(&self) -> bool {
        self.target == RefTarget::Branch
    }
}

/// What to look up on the remote for a non-hash reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefQuery {
    Branch(String),
    Tag(String),
    /// Tag first, then branch, matching git's own precedence.
    Either(String),
}

impl RefQuery {
    pub fn from_reference(reference: &str) -> Self {
        let reference = reference.trim();
        if let Some(name) = reference
            .strip_prefix("refs/heads/")
            .or_else(|| reference.strip_prefix("heads/"))
        {
            return RefQuery::Branch(name.to_string());
        }
        if let Some(name) = reference
            .strip_prefix("refs/tags/")
            .or_else(|| reference.strip_prefix("tags/"))
        {
            return RefQuery::Tag(name.to_string());
        }
        RefQuery::Either(reference.to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            RefQuery::Branch(name) | RefQuery::Tag(name) | RefQuery::Either(name) => name,
        }
    }

    pub fn wants_tag(&self) -> bool {
        matches!(self, RefQuery::Tag(_) | RefQuery::Either(_))
    }

    pub fn wants_branch(&self) -> bool {
        matches!(self, RefQuery::Branch(_) | RefQuery::Either(_))
    }
}

/// One line of `git ls-remote` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub sha: String,
    pub name: String,
}

pub fn parse_ls_remote(output: &str) -> Vec<RemoteRef> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let sha = parts.next()?;
            let name = parts.next()?;
            is_commit_hash(sha).then(|| {
                RemoteRef {
                    sha: sha.to_ascii_lowercase(),
                    name: name.to_string(),
                }
            })
        })
        .collect()
}

/// Picks the commit a query names from a remote's advertised refs.
///
/// Annotated tags are peeled to the commit they point at.
pub fn select_ref(refs: &[RemoteRef], query: &RefQuery) -> Option<ResolvedRef> {
    let name = query.name();
    let find = |full: String| refs.iter().find(|r| r.name == full).map(|r| r.sha.clone());

    if query.wants_tag() {
        let tag = find(format!("refs/tags/{name}^{{}}")).or_else(|| find(format!("refs/tags/{name}")));
        if let Some(version) = tag {
            return Some(ResolvedRef {
                version,
                target: RefTarget::Tag,
            });
        }
    }

    if query.wants_branch() {
        if let Some(version) = find(format!("refs/heads/{name}")) {
            return Some(ResolvedRef {
                version,
                target: RefTarget::Branch,
            });
        }
    }

    None
}
