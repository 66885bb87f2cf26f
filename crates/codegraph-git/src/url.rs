use crate::errors::{GitError, GitErrorCode, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

const SUPPORTED_FORMATS: &str =
    "https://github.com/owner/repo, git@github.com:owner/repo, git://github.com/owner/repo";

static HTTPS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?)://(?:[^@/]+@)?([^/]+)/([^/]+)/([^/]+?)(?:\.git)?(/.*)?$")
        .expect("valid https url regex")
});
static SCP_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w.-]+@([^:/]+):([^/]+)/([^/]+?)(?:\.git)?/?$").expect("valid scp url regex")
});
static SSH_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ssh://(?:[\w.-]+@)?([^/:]+)(?::(\d+))?/([^/]+)/([^/]+?)(?:\.git)?/?$")
        .expect("valid ssh url regex")
});
static GIT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^git://([^/]+)/([^/]+)/([^/]+?)(?:\.git)?/?$").expect("valid git url regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProtocol {
    Https,
    /// Plain `http://`, kept as-is for internal mirrors without TLS.
    Http,
    Ssh,
    Git,
    /// Local `file://` remotes, used for mirrors and tests.
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    GitHub,
    GitLab,
    Bitbucket,
    Custom,
}

impl GitProvider {
    pub fn from_host(host: &str) -> Self {
        match host.to_ascii_lowercase().as_str() {
            "github.com" => GitProvider::GitHub,
            "gitlab.com" => GitProvider::GitLab,
            "bitbucket.org" => GitProvider::Bitbucket,
            _ => GitProvider::Custom,
        }
    }
}

impl fmt::Display for GitProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GitProvider::GitHub => "github",
            GitProvider::GitLab => "gitlab",
            GitProvider::Bitbucket => "bitbucket",
            GitProvider::Custom => "custom",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedGitUrl {
    pub protocol: GitProtocol,
    pub provider: GitProvider,
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
    pub port: Option<u16>,
    pub original_url: String,
}

impl ParsedGitUrl {
    /// Parses any supported remote form.
    ///
    /// A `#branch` fragment or a `/tree/<branch>` path selects a branch.
    pub fn parse(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(GitError::invalid_url(
                url,
                "Invalid URL: URL must be a non-empty string",
            ));
        }

        let (body, fragment) = match trimmed.split_once('#') {
            Some((body, frag)) if !frag.is_empty() => (body, Some(frag.to_string())),
            Some((body, _)) => (body, None),
            None => (trimmed, None),
        };

        let mut parsed = if let Some(caps) = HTTPS_URL.captures(body) {
            let branch = caps
                .get(5)
                .and_then(|rest| rest.as_str().strip_prefix("/tree/"))
                .map(|b| b.trim_end_matches('/').to_string())
                .filter(|b| !b.is_empty());
            let protocol = if &caps[1] == "http" {
                GitProtocol::Http
            } else {
                GitProtocol::Https
            };
            Self::from_parts(protocol, &caps[2], &caps[3], &caps[4], None, branch, trimmed)
        } else if let Some(caps) = SCP_URL.captures(body) {
            Self::from_parts(GitProtocol::Ssh, &caps[1], &caps[2], &caps[3], None, None, trimmed)
        } else if let Some(caps) = SSH_URL.captures(body) {
            let port = caps.get(2).and_then(|p| p.as_str().parse().ok());
            Self::from_parts(GitProtocol::Ssh, &caps[1], &caps[3], &caps[4], port, None, trimmed)
        } else if let Some(caps) = GIT_URL.captures(body) {
            Self::from_parts(GitProtocol::Git, &caps[1], &caps[2], &caps[3], None, None, trimmed)
        } else if let Some(path) = body.strip_prefix("file://") {
            Self::parse_file_url(path, trimmed)?
        } else if ["http://", "https://", "ssh://", "git://"]
            .iter()
            .any(|scheme| body.starts_with(scheme))
            || body.starts_with("git@")
        {
            return Err(GitError::invalid_url(
                trimmed,
                "Invalid URL: missing owner or repository segment",
            ));
        } else {
            return Err(GitError::new(
                GitErrorCode::UnsupportedUrlFormat,
                format!(
                    "Unsupported git URL format: {}. Supported formats: {}",
                    trimmed, SUPPORTED_FORMATS
                ),
            )
            .with_url(trimmed));
        };

        if fragment.is_some() {
            parsed.branch = fragment;
        }
        Ok(parsed)
    }

    fn from_parts(
        protocol: GitProtocol,
        host: &str,
        owner: &str,
        repo: &str,
        port: Option<u16>,
        branch: Option<String>,
        original: &str,
    ) -> Self {
        Self {
            protocol,
            provider: GitProvider::from_host(host),
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.trim_end_matches(".git").to_string(),
            branch,
            port,
            original_url: original.to_string(),
        }
    }

    fn parse_file_url(path: &str, original: &str) -> Result<Self> {
        let segments: Vec<&str> = path
            .trim_end_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            return Err(GitError::invalid_url(
                original,
                "Invalid URL: missing owner or repository segment",
            ));
        }
        let repo = segments[segments.len() - 1];
        let owner = segments[segments.len() - 2];
        Ok(Self::from_parts(GitProtocol::File, "localhost", owner, repo, None, None, original))
    }

    /// `owner/repo`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Canonical `scheme://host/owner/repo` form. Only plain http keeps its
    /// scheme; ssh and git remotes normalize to https.
    pub fn normalize_url(&self) -> String {
        format!("{}://{}/{}/{}", self.web_scheme(), self.host, self.owner, self.repo)
    }

    pub(crate) fn web_scheme(&self) -> &'static str {
        match self.protocol {
            GitProtocol::Http => "http",
            _ => "https",
        }
    }

    /// Remote URL without credentials.
    pub fn public_clone_url(&self) -> String {
        match self.protocol {
            GitProtocol::File => self.file_remote(),
            GitProtocol::Ssh => self.ssh_remote(),
            _ => format!(
                "{}://{}/{}/{}.git",
                self.web_scheme(),
                self.host,
                self.owner,
                self.repo
            ),
        }
    }

    pub fn is_ssh(&self) -> bool {
        self.protocol == GitProtocol::Ssh
    }

    fn ssh_remote(&self) -> String {
        match self.port {
            Some(port) => format!(
                "ssh://git@{}:{}/{}/{}.git",
                self.host, port, self.owner, self.repo
            ),
            None => format!("git@{}:{}/{}.git", self.host, self.owner, self.repo),
        }
    }

    fn file_remote(&self) -> String {
        self.original_url
            .split('#')
            .next()
            .unwrap_or(&self.original_url)
            .to_string()
    }
}

/// Builds the clone URL, embedding `token` the way the provider expects.
///
/// SSH remotes never carry a token; GitLab uses `oauth2:<token>@`, everyone
/// else takes the bare token as the user part.
pub fn build_clone_url(parsed: &ParsedGitUrl, token: Option<&str>) -> String {
    match (parsed.protocol, token) {
        (GitProtocol::Ssh, _) | (GitProtocol::File, _) | (_, None) => parsed.public_clone_url(),
        (_, Some(token)) => {
            let userinfo = match parsed.provider {
                GitProvider::GitLab => format!("oauth2:{}", token),
                _ => token.to_string(),
            };
            format!(
                "{}://{}@{}/{}/{}.git",
                parsed.web_scheme(),
                userinfo,
                parsed.host,
                parsed.owner,
                parsed.repo
            )
        }
    }
}

pub fn is_git_url(url: &str) -> bool {
    ParsedGitUrl::parse(url).is_ok()
}

/// Like [`ParsedGitUrl::parse`] but returns the error message instead.
pub fn validate_url(url: &str) -> std::result::Result<(), String> {
    ParsedGitUrl::parse(url).map(|_| ()).map_err(|e| e.to_string())
}
