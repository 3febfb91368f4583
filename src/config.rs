use crate::error::{Error, Result};
use crate::filter::FileFilterConfig;
use crate::token::TokenizerKind;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
/// Default GitHub REST API base URL.
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
/// Default Gemini REST API base URL.
pub const DEFAULT_AI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Largest file (in bytes) whose content is downloaded.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100_000;
/// Maximum number of file bodies downloaded per run.
pub const DEFAULT_MAX_FETCH_FILES: usize = 300;
/// Maximum number of files forwarded to the model.
pub const DEFAULT_MAX_SELECTED_FILES: usize = 25;
/// Per-file character cap inside the prompt.
pub const DEFAULT_MAX_FILE_CHARS: usize = 15_000;
/// Token budget for the whole prompt.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 250_000;
/// Sampling temperature sent to the model.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
/// Output token cap sent to the model.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

const DEFAULT_GITHUB_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_AI_TIMEOUT: Duration = Duration::from_secs(300);

/// Output document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    /// Portable Document Format
    Pdf,
    /// Office Open XML word processing document
    Docx,
}

impl DocumentFormat {
    /// Every supported format, in output order.
    pub const ALL: [Self; 2] = [Self::Pdf, Self::Docx];

    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// Returns the MIME type for this format.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DocumentFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" | "word" => Ok(Self::Docx),
            other => Err(Error::config(format!("Unknown document format: {other}"))),
        }
    }
}

/// Which aspects the model is asked to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct AnalysisOptions {
    /// Ask for Mermaid diagrams
    pub include_diagrams: bool,
    /// Ask for design pattern identification
    pub include_patterns: bool,
    /// Ask for module dependency analysis
    pub include_dependencies: bool,
    /// Ask for a data flow description
    pub include_data_flow: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_diagrams: true,
            include_patterns: true,
            include_dependencies: true,
            include_data_flow: true,
        }
    }
}

impl AnalysisOptions {
    /// Requirement lines rendered into the prompt.
    #[must_use]
    pub fn requirements(&self) -> Vec<&'static str> {
        let mut lines = Vec::with_capacity(4);
        if self.include_diagrams {
            lines.push("Generate Mermaid diagrams showing component relationships");
        }
        if self.include_patterns {
            lines.push("Identify and explain design patterns used");
        }
        if self.include_dependencies {
            lines.push("Analyze module dependencies and relationships");
        }
        if self.include_data_flow {
            lines.push("Describe data flow from input to output");
        }
        lines
    }
}

/// API credentials. Never printed.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Gemini API key
    pub api_key: String,
    /// Optional GitHub token for higher rate limits and private repositories
    pub github_token: Option<String>,
}

impl Credentials {
    /// Creates credentials from an API key and optional GitHub token.
    #[must_use]
    pub fn new(api_key: impl Into<String>, github_token: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            github_token: github_token.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Configuration for the documentation pipeline.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Output directory for generated documents
    pub output_dir: PathBuf,

    /// Formats to produce
    pub formats: Vec<DocumentFormat>,

    /// Gemini model name
    pub model: String,

    /// GitHub REST API base URL
    pub github_api_base: String,

    /// Gemini REST API base URL
    pub ai_api_base: String,

    /// Timeout for each GitHub request
    pub github_timeout: Duration,

    /// Timeout for the analysis request
    pub ai_timeout: Duration,

    /// Sampling temperature
    pub temperature: f32,

    /// Output token cap for the model
    pub max_output_tokens: u32,

    /// Largest file whose content is downloaded, in bytes
    pub max_file_size: u64,

    /// Maximum number of downloaded files
    pub max_fetch_files: usize,

    /// Maximum number of files sent to the model
    pub max_selected_files: usize,

    /// Per-file character cap in the prompt
    pub max_file_chars: usize,

    /// Token budget for the whole prompt
    pub max_input_tokens: usize,

    /// Tokenizer used for budget estimation
    pub tokenizer: TokenizerKind,

    /// Path to an external prompt template
    pub template_path: Option<PathBuf>,

    /// Aspects to request from the model
    pub analysis: AnalysisOptions,

    /// Extra exclusion globs
    pub file_filter_config: FileFilterConfig,

    /// Create backups of existing output files
    pub backup_existing: bool,

    /// Where to write the raw diagram source, if anywhere
    pub diagram_out: Option<PathBuf>,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use repo_archdoc::{Config, DocumentFormat};
    ///
    /// let config = Config::builder()
    ///     .output_dir("docs")
    ///     .formats(vec![DocumentFormat::Pdf])
    ///     .build()
    ///     .expect("valid configuration");
    /// assert_eq!(config.formats, vec![DocumentFormat::Pdf]);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No output format is selected
    /// - A budget or limit is zero
    /// - The per-file cap cannot fit in the token budget
    /// - The temperature is outside `0.0..=2.0`
    /// - An API base URL does not parse
    /// - The template file is missing or invalid
    pub fn validate(&self) -> Result<()> {
        if self.formats.is_empty() {
            return Err(Error::config("at least one output format is required"));
        }

        if self.model.trim().is_empty() {
            return Err(Error::config("model name must not be empty"));
        }

        for (name, value) in [
            ("max_fetch_files", self.max_fetch_files),
            ("max_selected_files", self.max_selected_files),
            ("max_file_chars", self.max_file_chars),
            ("max_input_tokens", self.max_input_tokens),
        ] {
            if value == 0 {
                return Err(Error::config(format!("{name} must be greater than 0")));
            }
        }

        if self.max_file_size == 0 {
            return Err(Error::config("max_file_size must be greater than 0"));
        }

        if self.max_output_tokens == 0 {
            return Err(Error::config("max_output_tokens must be greater than 0"));
        }

        if self.max_file_chars > self.max_input_tokens.saturating_mul(4) {
            return Err(Error::config(format!(
                "max_file_chars ({}) cannot fit in max_input_tokens ({})",
                self.max_file_chars, self.max_input_tokens
            )));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        for (name, base) in [
            ("github_api_base", &self.github_api_base),
            ("ai_api_base", &self.ai_api_base),
        ] {
            url::Url::parse(base)
                .map_err(|e| Error::config(format!("{name} '{base}' is not a valid URL: {e}")))?;
        }

        if let Some(ref template_path) = self.template_path {
            if !template_path.is_file() {
                return Err(Error::config(format!(
                    "Template file does not exist: {}",
                    template_path.display()
                )));
            }

            crate::template_validator::TemplateValidator::validate_template(template_path)?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            formats: DocumentFormat::ALL.to_vec(),
            model: DEFAULT_MODEL.to_string(),
            github_api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            ai_api_base: DEFAULT_AI_API_BASE.to_string(),
            github_timeout: DEFAULT_GITHUB_TIMEOUT,
            ai_timeout: DEFAULT_AI_TIMEOUT,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_fetch_files: DEFAULT_MAX_FETCH_FILES,
            max_selected_files: DEFAULT_MAX_SELECTED_FILES,
            max_file_chars: DEFAULT_MAX_FILE_CHARS,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            tokenizer: TokenizerKind::Simple,
            template_path: None,
            analysis: AnalysisOptions::default(),
            file_filter_config: FileFilterConfig::default(),
            backup_existing: true,
            diagram_out: None,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Option<Config>,
}

impl ConfigBuilder {
    fn map(mut self, f: impl FnOnce(&mut Config)) -> Self {
        let mut config = self.config.take().unwrap_or_default();
        f(&mut config);
        self.config = Some(config);
        self
    }

    /// Sets the output directory for generated files.
    #[must_use]
    pub fn output_dir(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.map(|c| c.output_dir = path)
    }

    /// Sets the output formats.
    #[must_use]
    pub fn formats(self, formats: Vec<DocumentFormat>) -> Self {
        self.map(|c| {
            let mut unique = Vec::with_capacity(formats.len());
            for format in formats {
                if !unique.contains(&format) {
                    unique.push(format);
                }
            }
            c.formats = unique;
        })
    }

    /// Sets the Gemini model name.
    #[must_use]
    pub fn model(self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.map(|c| c.model = model)
    }

    /// Overrides the GitHub API base URL.
    #[must_use]
    pub fn github_api_base(self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.map(|c| c.github_api_base = base)
    }

    /// Overrides the Gemini API base URL.
    #[must_use]
    pub fn ai_api_base(self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.map(|c| c.ai_api_base = base)
    }

    /// Sets the timeout for GitHub requests.
    #[must_use]
    pub fn github_timeout(self, timeout: Duration) -> Self {
        self.map(|c| c.github_timeout = timeout)
    }

    /// Sets the timeout for the analysis request.
    #[must_use]
    pub fn ai_timeout(self, timeout: Duration) -> Self {
        self.map(|c| c.ai_timeout = timeout)
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn temperature(self, temperature: f32) -> Self {
        self.map(|c| c.temperature = temperature)
    }

    /// Sets the output token cap.
    #[must_use]
    pub fn max_output_tokens(self, tokens: u32) -> Self {
        self.map(|c| c.max_output_tokens = tokens)
    }

    /// Sets the largest downloadable file size in bytes.
    #[must_use]
    pub fn max_file_size(self, bytes: u64) -> Self {
        self.map(|c| c.max_file_size = bytes)
    }

    /// Sets the maximum number of downloaded files.
    #[must_use]
    pub fn max_fetch_files(self, count: usize) -> Self {
        self.map(|c| c.max_fetch_files = count)
    }

    /// Sets the maximum number of files sent to the model.
    #[must_use]
    pub fn max_selected_files(self, count: usize) -> Self {
        self.map(|c| c.max_selected_files = count)
    }

    /// Sets the per-file character cap.
    #[must_use]
    pub fn max_file_chars(self, chars: usize) -> Self {
        self.map(|c| c.max_file_chars = chars)
    }

    /// Sets the prompt token budget.
    #[must_use]
    pub fn max_input_tokens(self, tokens: usize) -> Self {
        self.map(|c| c.max_input_tokens = tokens)
    }

    /// Sets the tokenizer implementation.
    #[must_use]
    pub fn tokenizer(self, kind: TokenizerKind) -> Self {
        self.map(|c| c.tokenizer = kind)
    }

    /// Sets the path to an external prompt template.
    ///
    /// The template must exist, contain valid Tera syntax and reference
    /// both `files` and `requirements`.
    #[must_use]
    pub fn template_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.map(|c| c.template_path = Some(path))
    }

    /// Sets the analysis options.
    #[must_use]
    pub fn analysis(self, options: AnalysisOptions) -> Self {
        self.map(|c| c.analysis = options)
    }

    /// Sets extra file and directory exclusions.
    #[must_use]
    pub fn file_filter_config(self, config: FileFilterConfig) -> Self {
        self.map(|c| c.file_filter_config = config)
    }

    /// Enables or disables backup creation.
    #[must_use]
    pub fn backup_existing(self, enabled: bool) -> Self {
        self.map(|c| c.backup_existing = enabled)
    }

    /// Writes the raw diagram source to this path after a run.
    #[must_use]
    pub fn diagram_out(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.map(|c| c.diagram_out = Some(path))
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }
}
