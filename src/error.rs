use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the repo-archdoc library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The input is not a GitHub repository URL.
    #[error("Invalid GitHub repository URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected input
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The repository does not exist or is not visible with the given token.
    #[error("Repository '{repository}' not found or not accessible")]
    RepositoryNotFound {
        /// `owner/name` of the repository
        repository: String,
    },

    /// The GitHub API rate limit is exhausted.
    #[error("GitHub API rate limit exceeded{}", reset_suffix(.reset))]
    RateLimit {
        /// When the quota resets, if GitHub told us
        reset: Option<String>,
    },

    /// Any other unsuccessful GitHub API response.
    #[error("GitHub API returned {status}: {message}")]
    GitHub {
        /// HTTP status code
        status: u16,
        /// Message from the response body, if any
        message: String,
    },

    /// Transport-level HTTP failure (DNS, TLS, timeout, ...).
    #[error("HTTP request to '{url}' failed: {message}")]
    Http {
        /// Requested URL
        url: String,
        /// Error message
        message: String,
    },

    /// The AI service was unreachable, rejected the request or returned unusable output.
    #[error("AI service error: {message}")]
    AiService {
        /// Error message
        message: String,
    },

    /// A document could not be rendered.
    #[error("Failed to render {format} document: {message}")]
    Render {
        /// Target format (`pdf`, `docx`, or `document` before encoding)
        format: String,
        /// Error message
        message: String,
    },

    /// Prompt template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an invalid URL error.
    #[must_use]
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a repository-not-found error.
    #[must_use]
    pub fn not_found(repository: impl Into<String>) -> Self {
        Self::RepositoryNotFound {
            repository: repository.into(),
        }
    }

    /// Creates an HTTP transport error.
    #[must_use]
    pub fn http(url: impl Into<String>, source: &reqwest::Error) -> Self {
        Self::Http {
            url: url.into(),
            message: source.to_string(),
        }
    }

    /// Creates an AI service error.
    #[must_use]
    pub fn ai_service(message: impl Into<String>) -> Self {
        Self::AiService {
            message: message.into(),
        }
    }

    /// Creates a render error for the given format.
    #[must_use]
    pub fn render(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        // tera hides the interesting part in the source chain
        let mut message = source.to_string();
        let mut cause = std::error::Error::source(&source);
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }
        Self::Template {
            template: template.into(),
            message,
        }
    }

    /// Creates a template error for a template rejected before rendering.
    #[must_use]
    pub fn template_validation(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Returns true if the GitHub rate limit was hit.
    #[must_use]
    pub const fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }

    /// Returns true if the repository could not be found.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RepositoryNotFound { .. })
    }

    /// Returns true if this is a URL validation error.
    #[must_use]
    pub const fn is_invalid_url(&self) -> bool {
        matches!(self, Self::InvalidUrl { .. })
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

fn reset_suffix(reset: &Option<String>) -> String {
    reset
        .as_ref()
        .map(|r| format!(" (resets at {r})"))
        .unwrap_or_default()
}

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        Self::template("unknown", e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
