//! Recognising where a repository lives and how to reach its archives.

use std::{env, path::PathBuf, sync::LazyLock};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

/// Everything except unreserved characters, as GitLab expects for project
/// paths and file paths embedded in API URLs.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\w+://(?:[^@/]+@)?|git@)(?P<server>[\w.-]+)[:/](?P<repo_path>[\w/.-]*?)(?:\.git)?/?$")
        .expect("unable to compile repository url regex")
});

pub const GITHUB_TOKEN_ENV: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];
pub const GITLAB_TOKEN_ENV: [&str; 2] = ["GITLAB_PRIVATE_TOKEN", "GITLAB_TOKEN"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHost {
    GitHub { repo_path: String },
    GitLab { server: String, repo_path: String },
    Bitbucket { repo_path: String },
    Local { path: PathBuf },
    Other { server: String, repo_path: String },
}

impl GitHost {
    /// Classifies a repository URL. Returns `None` when the URL has no
    /// recognisable server and path.
    pub fn parse(url: &str) -> Option<Self> {
        if let Some(path) = url.strip_prefix("file://") {
            return Some(Self::Local {
                path: PathBuf::from(path),
            });
        }
        if url.starts_with('/') {
            return Some(Self::Local {
                path: PathBuf::from(url),
            });
        }

        let caps = URL_RE.captures(url)?;
        let server = caps.name("server")?.as_str().to_lowercase();
        let repo_path = caps.name("repo_path")?.as_str().trim_matches('/').to_string();
        if repo_path.is_empty() {
            return None;
        }

        Some(match server.as_str() {
            "github.com" | "www.github.com" => Self::GitHub { repo_path },
            "bitbucket.org" => Self::Bitbucket { repo_path },
            s if s == "gitlab.com" || s.starts_with("gitlab.") => {
                Self::GitLab { server, repo_path }
            }
            _ => Self::Other { server, repo_path },
        })
    }

    /// Path component used to name temporary directories for this repository.
    pub fn slug(&self) -> String {
        match self {
            Self::GitHub { repo_path }
            | Self::GitLab { repo_path, .. }
            | Self::Bitbucket { repo_path }
            | Self::Other { repo_path, .. } => repo_path.replace('/', "-"),
            Self::Local { path } => {
                path.file_name()
                    .map(|name| name.to_string_lossy().trim_end_matches(".git").to_string())
                    .unwrap_or_else(|| "local".to_string())
            }
        }
    }

    /// Single-version archive download URL, for hosts that serve one.
    pub fn archive_url(&self, version: &str) -> Option<String> {
        match self {
            Self::GitHub { repo_path } => {
                Some(format!(
                    "https://github.com/{repo_path}/archive/{version}.tar.gz"
                ))
            }
            Self::GitLab { server, repo_path } => {
                Some(format!(
                    "https://{server}/api/v4/projects/{}/repository/archive.tar.gz?sha={}",
                    encode(repo_path),
                    encode(version)
                ))
            }
            Self::Bitbucket { repo_path } => {
                Some(format!(
                    "https://bitbucket.org/{repo_path}/get/{version}.tar.gz"
                ))
            }
            Self::Local { .. } | Self::Other { .. } => None,
        }
    }

    /// Raw single-file URL at `version`, for hosts that serve one.
    pub fn file_url(&self, version: &str, path: &str) -> Option<String> {
        let path = path.trim_start_matches('/');
        match self {
            Self::GitHub { repo_path } => {
                Some(format!("https://github.com/{repo_path}/raw/{version}/{path}"))
            }
            Self::GitLab { server, repo_path } => {
                Some(format!(
                    "https://{server}/api/v4/projects/{}/repository/files/{}/raw?ref={}",
                    encode(repo_path),
                    encode(path),
                    encode(version)
                ))
            }
            Self::Bitbucket { repo_path } => {
                Some(format!(
                    "https://bitbucket.org/{repo_path}/raw/{version}/{path}"
                ))
            }
            Self::Local { .. } | Self::Other { .. } => None,
        }
    }

    /// Authentication header for this host's API and archive endpoints,
    /// taken from the first token variable that is set.
    pub fn auth_header(&self) -> Option<(&'static str, String)> {
        match self {
            Self::GitHub { .. } => {
                first_env(&GITHUB_TOKEN_ENV).map(|t| ("Authorization", format!("Bearer {t}")))
            }
            Self::GitLab { .. } => first_env(&GITLAB_TOKEN_ENV).map(|t| ("PRIVATE-TOKEN", t)),
            _ => None,
        }
    }
}

pub(crate) fn encode(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

fn first_env(vars: &[&str]) -> Option<String> {
    vars.iter()
        .filter_map(|var| env::var(var).ok())
        .find(|value| !value.is_empty())
}
