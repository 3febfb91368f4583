//! # repo-archdoc
//!
//! Generates architecture documentation for public GitHub repositories.
//!
//! ## Features
//!
//! - Repository walking through the GitHub REST API with rate-limit handling
//! - Prioritised, budget-capped file selection (manifests and READMEs first)
//! - Single-call architecture analysis with Google Gemini
//! - PDF and DOCX output with statistics and Mermaid diagram sources
//! - Atomic file operations with automatic backups
//!
//! ## Quick Start
//!
//! ```no_run
//! use repo_archdoc::{Config, Credentials, DocumentFormat};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .output_dir("./docs")
//!     .formats(vec![DocumentFormat::Pdf])
//!     .build()?;
//! let credentials = Credentials::new(std::env::var("GEMINI_API_KEY")?, None);
//!
//! repo_archdoc::run(config, &credentials, "https://github.com/rust-lang/log")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Reference**: Parses and validates the repository URL
//! 2. **Fetcher**: Walks the repository tree breadth-first
//! 3. **Filter**: Categorises, ranks and caps the files
//! 4. **Analyzer**: Renders the prompt under a token budget and calls the model
//! 5. **Renderer**: Builds the document model and encodes PDF/DOCX
//! 6. **Writer**: Persists the documents

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod file;
mod filter;
mod pipeline;
mod prompt;
mod reference;
mod template_validator;
mod token;
mod writer;

pub mod analysis;
pub mod document;
pub mod github;

pub use analysis::{AnalysisClient, AnalysisResult, GeminiClient};
pub use config::{
    AnalysisOptions, Config, ConfigBuilder, Credentials, DEFAULT_AI_API_BASE,
    DEFAULT_GITHUB_API_BASE, DEFAULT_MAX_FETCH_FILES, DEFAULT_MAX_FILE_CHARS,
    DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_INPUT_TOKENS, DEFAULT_MAX_OUTPUT_TOKENS,
    DEFAULT_MAX_SELECTED_FILES, DEFAULT_MODEL, DEFAULT_TEMPERATURE, DocumentFormat,
};
pub use document::{DocumentModel, DocumentRenderer, GeneratedDocument, Section};
pub use error::{Error, Result};
pub use file::{FileCategory, FileEntry};
pub use filter::{FileFilter, FileFilterConfig};
pub use github::{GitHubClient, RepositorySource};
pub use pipeline::{Pipeline, PipelineOutput, PipelineStats, RunState, Stage};
pub use prompt::{Prompt, PromptBuilder, PromptStats};
pub use reference::RepositoryReference;
pub use token::{TokenEstimator, TokenizerKind};
pub use writer::{Writer, sanitize_filename};

/// Generates and saves the documents for one repository.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid or the API key is empty
/// - The URL is not a GitHub repository URL
/// - The repository cannot be fetched
/// - The analysis request fails
/// - Rendering or writing the documents fails
pub fn run(config: Config, credentials: &Credentials, url: &str) -> Result<PipelineStats> {
    let writer = Writer::new(&config);
    let output = Pipeline::from_credentials(config, credentials)?.run(url)?;
    writer.write(&output)?;
    Ok(output.stats)
}
