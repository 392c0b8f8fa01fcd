// repo_url.rs — Derive a repository identifier from a clone or browser URL.
//
// Accepted forms:
//   https://github.com/acme/widgets(.git)
//   git@github.com:acme/widgets.git
//   ssh://git@gitlab.example.com/group/sub/project.git
//   https://gitlab.com/group/project/-/tree/main   (GitLab "/-/" suffix dropped)

use reqwest::Url;

use crate::error::SubmitError;

/// Host plus repository path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    pub host: String,
    pub segments: Vec<String>,
}

impl RepoUrl {
    pub fn parse(raw: &str) -> Result<Self, SubmitError> {
        let raw = raw.trim();
        let (host, path) = split_host_and_path(raw)
            .ok_or_else(|| invalid(raw, "expected https://host/owner/repo or git@host:owner/repo"))?;

        let mut segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .take_while(|s| *s != "-")
            .map(str::to_string)
            .collect();
        if let Some(last) = segments.last_mut() {
            if let Some(stripped) = last.strip_suffix(".git") {
                *last = stripped.to_string();
            }
        }
        segments.retain(|s| !s.is_empty());

        if host.is_empty() {
            return Err(invalid(raw, "missing host"));
        }
        if segments.len() < 2 {
            return Err(invalid(raw, "missing owner or repository name"));
        }
        Ok(Self {
            host: host.to_lowercase(),
            segments,
        })
    }

    /// `(owner, repo)` for providers that address repositories by exactly two segments.
    pub fn owner_and_name(&self) -> Result<(String, String), SubmitError> {
        match self.segments.as_slice() {
            [owner, name] => Ok((owner.clone(), name.clone())),
            _ => Err(SubmitError::SetupFailed(format!(
                "repository path '{}' on {} must be exactly owner/name",
                self.full_path(),
                self.host
            ))),
        }
    }

    /// Full namespace path, e.g. `group/sub/project`.
    pub fn full_path(&self) -> String {
        self.segments.join("/")
    }
}

fn split_host_and_path(raw: &str) -> Option<(String, String)> {
    if raw.contains("://") {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?.to_string();
        return Some((host, url.path().to_string()));
    }
    // scp-like: [user@]host:path
    let (left, path) = raw.split_once(':')?;
    let host = left.rsplit('@').next()?.to_string();
    Some((host, path.to_string()))
}

fn invalid(raw: &str, why: &str) -> SubmitError {
    SubmitError::SetupFailed(format!("unparseable repository URL '{}': {}", raw, why))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_url() {
        let repo = RepoUrl::parse("https://github.com/acme/widgets").unwrap();
        assert_eq!(repo.host, "github.com");
        assert_eq!(
            repo.owner_and_name().unwrap(),
            ("acme".to_string(), "widgets".to_string())
        );
    }

    #[test]
    fn strips_git_suffix_and_trailing_slash() {
        let repo = RepoUrl::parse("https://github.com/acme/widgets.git/").unwrap();
        assert_eq!(repo.full_path(), "acme/widgets");
    }

    #[test]
    fn parses_scp_like_ssh() {
        let repo = RepoUrl::parse("git@bitbucket.org:team/service.git").unwrap();
        assert_eq!(repo.host, "bitbucket.org");
        assert_eq!(repo.full_path(), "team/service");
    }

    #[test]
    fn parses_ssh_scheme_with_nested_groups() {
        let repo = RepoUrl::parse("ssh://git@gitlab.example.com/group/sub/project.git").unwrap();
        assert_eq!(repo.host, "gitlab.example.com");
        assert_eq!(repo.full_path(), "group/sub/project");
        assert!(repo.owner_and_name().is_err());
    }

    #[test]
    fn drops_gitlab_browser_suffix() {
        let repo = RepoUrl::parse("https://gitlab.com/group/project/-/tree/main").unwrap();
        assert_eq!(repo.full_path(), "group/project");
    }

    #[test]
    fn rejects_unparseable_urls() {
        for raw in ["", "github.com", "https://github.com/acme", "https:///acme/widgets"] {
            let err = RepoUrl::parse(raw).unwrap_err();
            assert!(matches!(err, SubmitError::SetupFailed(_)), "{}", raw);
        }
    }
}
