//! Native ref lookups for hosts with a REST API.

use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{FetchError, Result},
    host::{encode, GitHost},
    http_client,
    reference::{RefQuery, RefTarget, ResolvedRef},
};

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct GithubRef {
    object: GithubObject,
}

#[derive(Debug, Deserialize)]
struct GithubObject {
    sha: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct GithubTag {
    object: GithubObject,
}

#[derive(Debug, Deserialize)]
struct GitlabRef {
    commit: GitlabCommit,
}

#[derive(Debug, Deserialize)]
struct GitlabCommit {
    id: String,
}

fn get_json<T: serde::de::DeserializeOwned>(host: &GitHost, url: &str) -> Result<Option<T>> {
    match http_client::get(url, host.auth_header().as_ref()).call() {
        Ok(mut resp) => {
            resp.body_mut()
                .read_json()
                .map(Some)
                .map_err(|_| FetchError::InvalidResponse { url: url.to_string() })
        }
        Err(ureq::Error::StatusCode(404)) => Ok(None),
        Err(e) => Err(FetchError::from_request(e, url)),
    }
}

/// Whether [`resolve`] can answer for this host.
pub fn has_api(host: &GitHost) -> bool {
    matches!(host, GitHost::GitHub { .. } | GitHost::GitLab { .. })
}

/// Looks a reference up through the host's API. `Ok(None)` means the API
/// answered that no such tag or branch exists.
pub fn resolve(host: &GitHost, query: &RefQuery) -> Result<Option<ResolvedRef>> {
    match host {
        GitHost::GitHub { repo_path } => github_resolve(host, repo_path, query),
        GitHost::GitLab { server, repo_path } => gitlab_resolve(host, server, repo_path, query),
        _ => Ok(None),
    }
}

fn github_resolve(
    host: &GitHost,
    repo_path: &str,
    query: &RefQuery,
) -> Result<Option<ResolvedRef>> {
    let name = query.name();

    if query.wants_tag() {
        let url = format!("{GITHUB_API}/repos/{repo_path}/git/ref/tags/{name}");
        if let Some(found) = get_json::<GithubRef>(host, &url)? {
            let mut object = found.object;
            // Annotated tags point at a tag object; follow it to the commit.
            while object.kind == "tag" {
                let url = format!("{GITHUB_API}/repos/{repo_path}/git/tags/{}", object.sha);
                object = get_json::<GithubTag>(host, &url)?
                    .ok_or(FetchError::NotFound { url })?
                    .object;
            }
            debug!(repo_path, name, sha = %object.sha, "resolved tag via GitHub API");
            return Ok(Some(ResolvedRef {
                version: object.sha.to_ascii_lowercase(),
                target: RefTarget::Tag,
            }));
        }
    }

    if query.wants_branch() {
        let url = format!("{GITHUB_API}/repos/{repo_path}/git/ref/heads/{name}");
        if let Some(found) = get_json::<GithubRef>(host, &url)? {
            debug!(repo_path, name, sha = %found.object.sha, "resolved branch via GitHub API");
            return Ok(Some(ResolvedRef {
                version: found.object.sha.to_ascii_lowercase(),
                target: RefTarget::Branch,
            }));
        }
    }

    Ok(None)
}

fn gitlab_resolve(
    host: &GitHost,
    server: &str,
    repo_path: &str,
    query: &RefQuery,
) -> Result<Option<ResolvedRef>> {
    let project = format!("https://{server}/api/v4/projects/{}", encode(repo_path));
    let name = encode(query.name());

    if query.wants_tag() {
        let url = format!("{project}/repository/tags/{name}");
        if let Some(found) = get_json::<GitlabRef>(host, &url)? {
            return Ok(Some(ResolvedRef {
                version: found.commit.id.to_ascii_lowercase(),
                target: RefTarget::Tag,
            }));
        }
    }

    if query.wants_branch() {
        let url = format!("{project}/repository/branches/{name}");
        if let Some(found) = get_json::<GitlabRef>(host, &url)? {
            return Ok(Some(ResolvedRef {
                version: found.commit.id.to_ascii_lowercase(),
                target: RefTarget::Branch,
            }));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_ref_payload() {
        let payload = r#"{
            "ref": "refs/tags/v1.0.0",
            "node_id": "MDM6UmVm",
            "url": "https://api.github.com/repos/o/r/git/refs/tags/v1.0.0",
            "object": {
                "sha": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                "type": "tag",
                "url": "https://api.github.com/repos/o/r/git/tags/aaaa"
            }
        }"#;
        let parsed: GithubRef = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.object.kind, "tag");
        assert_eq!(parsed.object.sha.len(), 40);
    }

    #[test]
    fn test_gitlab_ref_payload() {
        let payload = r#"{
            "name": "main",
            "commit": { "id": "0123456789abcdef0123456789abcdef01234567", "short_id": "0123456" },
            "protected": true
        }"#;
        let parsed: GitlabRef = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.commit.id, "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn test_has_api() {
        assert!(has_api(&GitHost::parse("https://github.com/o/r").unwrap()));
        assert!(has_api(&GitHost::parse("https://gitlab.com/o/r").unwrap()));
        assert!(!has_api(&GitHost::parse("https://bitbucket.org/o/r").unwrap()));
        assert!(!has_api(&GitHost::parse("https://git.example.com/repo.git").unwrap()));
    }
}
