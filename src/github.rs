//! Repository fetching through the GitHub REST API.

use crate::error::{Error, Result};
use crate::file::{self, FileEntry};
use crate::filter::FileFilter;
use crate::reference::RepositoryReference;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Duration;

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_MESSAGE: usize = 200;

/// Repository metadata from `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// `owner/name` as GitHub spells it
    pub full_name: String,
    /// Short description
    #[serde(default)]
    pub description: Option<String>,
    /// Primary language detected by GitHub
    #[serde(default)]
    pub language: Option<String>,
    /// Star count
    #[serde(default, rename = "stargazers_count")]
    pub stars: u64,
    /// Fork count
    #[serde(default, rename = "forks_count")]
    pub forks: u64,
    /// Default branch name
    #[serde(default)]
    pub default_branch: String,
    /// Web URL
    #[serde(default)]
    pub html_url: String,
}

/// Kind of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Dir,
    /// Symbolic link
    Symlink,
    /// Git submodule
    Submodule,
    /// Anything newer than this client
    #[serde(other)]
    Other,
}

/// One entry of a `contents` listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteEntry {
    /// Final path component
    pub name: String,
    /// Repository-relative path
    pub path: String,
    /// Entry kind
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    #[serde(default)]
    pub size: u64,
    /// Raw content URL, absent for directories
    #[serde(default)]
    pub download_url: Option<String>,
}

/// A single-object or array `contents` response.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Many(Vec<RemoteEntry>),
    One(RemoteEntry),
}

/// Read access to a hosted repository.
#[cfg_attr(test, mockall::automock)]
pub trait RepositorySource {
    /// Fetches repository metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RepositoryNotFound`], [`Error::RateLimit`] or a
    /// transport error.
    fn repository_info(&self, reference: &RepositoryReference) -> Result<RepositoryInfo>;

    /// Lists one directory (`""` is the root).
    ///
    /// # Errors
    ///
    /// Same as [`RepositorySource::repository_info`].
    fn list_directory(&self, reference: &RepositoryReference, path: &str)
    -> Result<Vec<RemoteEntry>>;

    /// Downloads the raw bytes of a file entry.
    ///
    /// # Errors
    ///
    /// Same as [`RepositorySource::repository_info`].
    fn download(&self, entry: &RemoteEntry) -> Result<Vec<u8>>;
}

/// Blocking GitHub REST client.
pub struct GitHubClient {
    http: Client,
    api_base: String,
    token: Option<String>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.api_base)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Creates a client for the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(api_base: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn repo_url(&self, reference: &RepositoryReference) -> String {
        format!("{}/repos/{}/{}", self.api_base, reference.owner(), reference.name())
    }

    /// Builds the `contents` URL, percent-encoding each path segment.
    fn contents_url(&self, reference: &RepositoryReference, path: &str) -> Result<String> {
        let mut url = url::Url::parse(&self.repo_url(reference))
            .map_err(|e| Error::config(format!("Invalid GitHub API base: {e}")))?;

        url.path_segments_mut()
            .map_err(|()| Error::config("GitHub API base cannot have path segments"))?
            .push("contents")
            .extend(path.split('/').filter(|s| !s.is_empty()));

        Ok(url.into())
    }

    fn get(&self, url: &str, repository: &str) -> Result<Response> {
        let mut request = self.http.get(url);
        if let Some(ref token) = self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        tracing::trace!("GET {url}");
        let response = request.send().map_err(|e| Error::http(url, &e))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().unwrap_or_default();
        Err(classify_status(status, &headers, &body, repository))
    }
}

impl RepositorySource for GitHubClient {
    fn repository_info(&self, reference: &RepositoryReference) -> Result<RepositoryInfo> {
        let url = self.repo_url(reference);
        let response = self.get(&url, &reference.full_name())?;
        let bytes = response.bytes().map_err(|e| Error::http(&url, &e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn list_directory(
        &self,
        reference: &RepositoryReference,
        path: &str,
    ) -> Result<Vec<RemoteEntry>> {
        let url = self.contents_url(reference, path)?;
        let response = self.get(&url, &reference.full_name())?;
        let bytes = response.bytes().map_err(|e| Error::http(&url, &e))?;

        Ok(match serde_json::from_slice(&bytes)? {
            Listing::Many(entries) => entries,
            Listing::One(entry) => vec![entry],
        })
    }

    fn download(&self, entry: &RemoteEntry) -> Result<Vec<u8>> {
        let url = entry
            .download_url
            .as_deref()
            .ok_or_else(|| Error::GitHub {
                status: 0,
                message: format!("'{}' has no download URL", entry.path),
            })?;

        let response = self.get(url, &entry.path)?;
        let bytes = response.bytes().map_err(|e| Error::http(url, &e))?;
        Ok(bytes.to_vec())
    }
}

/// Maps an unsuccessful GitHub response to an error.
///
/// - `404` is [`Error::RepositoryNotFound`]
/// - `429`, or `403` with an exhausted quota, is [`Error::RateLimit`]
/// - anything else is [`Error::GitHub`]
#[must_use]
pub fn classify_status(status: u16, headers: &HeaderMap, body: &str, repository: &str) -> Error {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let quota_exhausted = header("x-ratelimit-remaining").is_some_and(|v| v.trim() == "0");

    match status {
        404 => Error::not_found(repository),
        429 => Error::RateLimit {
            reset: header("x-ratelimit-reset").and_then(format_reset),
        },
        403 if quota_exhausted => Error::RateLimit {
            reset: header("x-ratelimit-reset").and_then(format_reset),
        },
        _ => Error::GitHub {
            status,
            message: error_message(body),
        },
    }
}

fn format_reset(epoch: &str) -> Option<String> {
    let secs: i64 = epoch.trim().parse().ok()?;
    let reset = chrono::DateTime::from_timestamp(secs, 0)?;
    Some(reset.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    if let Ok(err) = serde_json::from_str::<ApiError>(body) {
        return err.message;
    }

    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_MESSAGE) {
        Some((i, _)) => format!("{}...", &trimmed[..i]),
        None => trimmed.to_string(),
    }
}

/// Repository-wide counters gathered while fetching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Files seen in visited directories
    pub total_files: usize,
    /// Files with a recognised code extension
    pub code_files: usize,
    /// Files whose content was downloaded
    pub fetched_files: usize,
    /// Files seen but not downloaded
    pub skipped_files: usize,
    /// Directories pruned by exclusion rules
    pub skipped_directories: usize,
    /// Code file count per extension
    pub languages: BTreeMap<String, usize>,
}

impl FetchStats {
    /// Most common code extension in upper case, or `"Unknown"`.
    #[must_use]
    pub fn main_language(&self) -> String {
        self.languages
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map_or_else(|| "Unknown".to_string(), |(ext, _)| ext.to_ascii_uppercase())
    }
}

/// Everything fetched for one repository.
#[derive(Debug, Clone)]
pub struct FetchedRepository {
    /// Parsed reference the run started from
    pub reference: RepositoryReference,
    /// Metadata from the API
    pub info: RepositoryInfo,
    /// Downloaded text files in traversal order
    pub files: Vec<FileEntry>,
    /// Visited directories in traversal order
    pub directories: Vec<String>,
    /// Counters
    pub stats: FetchStats,
}

/// Download limits for a [`Fetcher`].
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    /// Largest file downloaded, in bytes
    pub max_file_size: u64,
    /// Maximum number of downloaded files
    pub max_fetch_files: usize,
}

/// Breadth-first repository walker.
pub struct Fetcher<'a, S: RepositorySource + ?Sized> {
    source: &'a S,
    filter: &'a FileFilter,
    limits: FetchLimits,
}

impl<'a, S: RepositorySource + ?Sized> Fetcher<'a, S> {
    /// Creates a fetcher over `source`, pruning with `filter`.
    pub const fn new(source: &'a S, filter: &'a FileFilter, limits: FetchLimits) -> Self {
        Self {
            source,
            filter,
            limits,
        }
    }

    /// Fetches metadata and every relevant text file.
    ///
    /// # Errors
    ///
    /// Metadata errors and rate limits abort the fetch. A failing root
    /// listing aborts unless it is a 404 (empty repository). Failures below
    /// the root are logged and skipped.
    pub fn fetch(&self, reference: &RepositoryReference) -> Result<FetchedRepository> {
        let info = self.source.repository_info(reference)?;
        tracing::info!("Fetching {}", info.full_name);

        let mut stats = FetchStats::default();
        let mut files = Vec::new();
        let mut directories = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([String::new()]);

        while let Some(dir) = queue.pop_front() {
            if !visited.insert(dir.clone()) {
                continue;
            }

            let entries = match self.source.list_directory(reference, &dir) {
                Ok(entries) => entries,
                Err(e) if e.is_rate_limit() => return Err(e),
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Listing for '{dir}' not found, treating as empty");
                    Vec::new()
                }
                Err(e) if dir.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping directory '{dir}': {e}");
                    continue;
                }
            };

            for entry in entries {
                match entry.kind {
                    EntryKind::Dir => {
                        if self.filter.is_excluded_dir(&entry.path) {
                            tracing::trace!(path = %entry.path, "directory excluded");
                            stats.skipped_directories += 1;
                        } else if !visited.contains(&entry.path) {
                            directories.push(entry.path.clone());
                            queue.push_back(entry.path);
                        }
                    }
                    EntryKind::File => {
                        if let Some(file) = self.visit_file(&entry, &mut stats)? {
                            files.push(file);
                        }
                    }
                    EntryKind::Symlink | EntryKind::Submodule | EntryKind::Other => {}
                }
            }
        }

        tracing::info!(
            "Fetched {} of {} files ({} skipped)",
            stats.fetched_files,
            stats.total_files,
            stats.skipped_files
        );

        Ok(FetchedRepository {
            reference: reference.clone(),
            info,
            files,
            directories,
            stats,
        })
    }

    fn visit_file(&self, entry: &RemoteEntry, stats: &mut FetchStats) -> Result<Option<FileEntry>> {
        stats.total_files += 1;

        if file::is_code_file(&entry.path) {
            stats.code_files += 1;
            if let Some(ext) = file::extension(&entry.path) {
                *stats.languages.entry(ext).or_default() += 1;
            }
        }

        let reason = if self.filter.is_excluded(&entry.path) {
            Some("excluded")
        } else if entry.size > self.limits.max_file_size {
            Some("too large")
        } else if stats.fetched_files >= self.limits.max_fetch_files {
            Some("download cap reached")
        } else {
            None
        };

        if let Some(reason) = reason {
            tracing::trace!(path = %entry.path, reason, "skipped");
            stats.skipped_files += 1;
            return Ok(None);
        }

        let bytes = match self.source.download(entry) {
            Ok(bytes) => bytes,
            Err(e) if e.is_rate_limit() => return Err(e),
            Err(e) => {
                tracing::warn!("Could not fetch {}: {e}", entry.path);
                stats.skipped_files += 1;
                return Ok(None);
            }
        };

        if file::is_binary_content(&bytes) {
            tracing::debug!(path = %entry.path, "binary content, skipped");
            stats.skipped_files += 1;
            return Ok(None);
        }

        match String::from_utf8(bytes) {
            Ok(content) => {
                stats.fetched_files += 1;
                tracing::debug!(path = %entry.path, size = entry.size, "fetched");
                Ok(Some(FileEntry::new(entry.path.clone(), content, entry.size)))
            }
            Err(_) => {
                tracing::debug!(path = %entry.path, "not UTF-8, skipped");
                stats.skipped_files += 1;
                Ok(None)
            }
        }
    }
}
