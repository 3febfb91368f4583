//! GitHub repository URL parsing.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use url::Url;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex is valid"));

const GITHUB_HOSTS: &[&str] = &["github.com", "www.github.com"];

/// Owner and name of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryReference {
    owner: String,
    name: String,
}

impl RepositoryReference {
    /// Parses a GitHub repository URL.
    ///
    /// Accepted shapes:
    /// - `https://github.com/owner/repo`
    /// - `https://github.com/owner/repo.git`
    /// - `github.com/owner/repo/` (scheme optional)
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] for anything else, including deep links
    /// such as `/owner/repo/tree/main`.
    ///
    /// # Examples
    ///
    /// ```
    /// use repo_archdoc::RepositoryReference;
    ///
    /// let repo = RepositoryReference::parse("https://github.com/acme/widget.git").unwrap();
    /// assert_eq!(repo.full_name(), "acme/widget");
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_url(input, "URL is empty"));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let url = Url::parse(&with_scheme).map_err(|e| Error::invalid_url(input, e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_url(
                input,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if !GITHUB_HOSTS.contains(&host.as_str()) {
            return Err(Error::invalid_url(input, format!("'{host}' is not github.com")));
        }

        if url.query().is_some() || url.fragment().is_some() {
            return Err(Error::invalid_url(input, "query strings and fragments are not allowed"));
        }

        let segments: Vec<&str> = url
            .path()
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let [owner, repo] = segments.as_slice() else {
            return Err(Error::invalid_url(
                input,
                "expected exactly https://github.com/<owner>/<repo>",
            ));
        };

        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        for part in [*owner, repo] {
            if part.is_empty() || part == "." || part == ".." || !NAME_PATTERN.is_match(part) {
                return Err(Error::invalid_url(
                    input,
                    format!("'{part}' is not a valid owner or repository name"),
                ));
            }
        }

        Ok(Self {
            owner: (*owner).to_string(),
            name: repo.to_string(),
        })
    }

    /// Repository owner (user or organisation).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name without `.git`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
