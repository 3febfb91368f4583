use crate::{
    config::{AnalysisOptions, Config},
    error::{Error, Result},
    file::FileEntry,
    github::{FetchedRepository, RepositoryInfo},
    token::TokenEstimator,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tera::{Context, Tera, Value};

const TEMPLATE_NAME: &str = "analysis";
const MAX_DIRECTORIES: usize = 20;
const MAX_FIT_ATTEMPTS: usize = 4;

#[derive(Serialize)]
struct PromptContext<'a> {
    repository: &'a RepositoryInfo,
    stats: StatsView,
    directories: &'a [String],
    files: Vec<FileView<'a>>,
    requirements: Vec<&'static str>,
    include_diagrams: bool,
}

#[derive(Serialize)]
struct StatsView {
    total_files: usize,
    code_files: usize,
    fetched_files: usize,
    skipped_files: usize,
    main_language: String,
}

#[derive(Serialize, Clone)]
struct FileView<'a> {
    path: &'a str,
    language: &'static str,
    category: String,
    content: &'a str,
    truncated: bool,
}

/// Rendered analysis prompt.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Prompt text sent to the model
    pub text: String,
    /// Budget accounting
    pub stats: PromptStats,
}

/// How the selected files fared against the input budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptStats {
    /// Files present in the prompt (whole or cut)
    pub files_included: usize,
    /// Files cut by the per-file cap or the overall budget
    pub files_truncated: usize,
    /// Files left out because the budget ran out
    pub files_dropped: usize,
    /// Estimated prompt size in tokens
    pub estimated_tokens: usize,
}

/// Renders the analysis prompt under a token budget.
pub struct PromptBuilder {
    tera: Tera,
    estimator: Arc<dyn TokenEstimator>,
    max_file_chars: usize,
    max_input_tokens: usize,
    options: AnalysisOptions,
}

impl std::fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptBuilder")
            .field("max_file_chars", &self.max_file_chars)
            .field("max_input_tokens", &self.max_input_tokens)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PromptBuilder {
    /// Creates a prompt builder from configuration.
    ///
    /// Uses the built-in template unless `config.template_path` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be read or compiled.
    pub fn new(config: &Config) -> Result<Self> {
        let mut tera = Tera::default();

        match config.template_path {
            Some(ref path) => {
                crate::template_validator::TemplateValidator::validate_template(path)?;
                let source = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                tera.add_raw_template(TEMPLATE_NAME, &source)
                    .map_err(|e| Error::template(path.display().to_string(), e))?;
                tracing::debug!("Using prompt template {}", path.display());
            }
            None => {
                tera.add_raw_template(
                    TEMPLATE_NAME,
                    include_str!("../templates/analysis_prompt.tera"),
                )
                .map_err(|e| Error::template(TEMPLATE_NAME, e))?;
            }
        }

        tera.register_filter("fence_language", fence_language_filter);

        Ok(Self {
            tera,
            estimator: config.tokenizer.create(),
            max_file_chars: config.max_file_chars,
            max_input_tokens: config.max_input_tokens,
            options: config.analysis,
        })
    }

    /// Renders the prompt for the selected files.
    ///
    /// Files are taken in order. Each one is capped at `max_file_chars`; the
    /// first file that would push the prompt over `max_input_tokens` is cut
    /// to fit and every file after it is dropped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the template alone exceeds the
    /// budget, or a template error if rendering fails.
    pub fn build(&self, repository: &FetchedRepository, files: &[FileEntry]) -> Result<Prompt> {
        let capped: Vec<FileView<'_>> = files
            .iter()
            .map(|f| {
                let content = truncate_chars(&f.content, self.max_file_chars);
                FileView {
                    path: &f.path,
                    language: f.language(),
                    category: f.category.to_string(),
                    content,
                    truncated: content.len() < f.content.len(),
                }
            })
            .collect();

        let mut accepted: Vec<FileView<'_>> = Vec::with_capacity(capped.len());
        let mut text = self.render(repository, &accepted)?;
        let mut tokens = self.estimator.estimate(&text);

        if tokens > self.max_input_tokens {
            return Err(Error::config(format!(
                "max_input_tokens ({}) is too small for the prompt template ({tokens} tokens)",
                self.max_input_tokens
            )));
        }

        let mut dropped = 0;
        for (index, view) in capped.iter().enumerate() {
            accepted.push(view.clone());
            let candidate = self.render(repository, &accepted)?;
            let candidate_tokens = self.estimator.estimate(&candidate);

            if candidate_tokens <= self.max_input_tokens {
                text = candidate;
                tokens = candidate_tokens;
                continue;
            }

            accepted.pop();
            if let Some((cut, rendered, rendered_tokens)) = self.fit_file(repository, &mut accepted, view)? {
                tracing::debug!(path = cut, "File cut to fit the input budget");
                text = rendered;
                tokens = rendered_tokens;
                dropped = capped.len() - index - 1;
            } else {
                dropped = capped.len() - index;
            }
            break;
        }

        let stats = PromptStats {
            files_included: accepted.len(),
            files_truncated: accepted.iter().filter(|f| f.truncated).count(),
            files_dropped: dropped,
            estimated_tokens: tokens,
        };

        if stats.files_dropped > 0 {
            tracing::warn!(
                "Input budget of {} tokens reached, {} file(s) left out",
                self.max_input_tokens,
                stats.files_dropped
            );
        }

        Ok(Prompt { text, stats })
    }

    /// Cuts `view` until the prompt with it appended fits the budget.
    ///
    /// On success the cut file is pushed onto `accepted`.
    fn fit_file<'a>(
        &self,
        repository: &FetchedRepository,
        accepted: &mut Vec<FileView<'a>>,
        view: &FileView<'a>,
    ) -> Result<Option<(&'a str, String, usize)>> {
        let mut empty = view.clone();
        empty.content = "";
        empty.truncated = true;

        accepted.push(empty);
        let skeleton = self.render(repository, accepted)?;
        accepted.pop();

        let mut available = self
            .max_input_tokens
            .saturating_sub(self.estimator.estimate(&skeleton));

        for _ in 0..MAX_FIT_ATTEMPTS {
            let content = self.estimator.fit_prefix(view.content, available);
            if content.trim().is_empty() {
                return Ok(None);
            }

            let mut cut = view.clone();
            cut.content = content;
            cut.truncated = true;
            accepted.push(cut);

            let rendered = self.render(repository, accepted)?;
            let rendered_tokens = self.estimator.estimate(&rendered);
            if rendered_tokens <= self.max_input_tokens {
                return Ok(Some((view.path, rendered, rendered_tokens)));
            }

            accepted.pop();
            available = available.saturating_sub(rendered_tokens - self.max_input_tokens + 1);
        }

        Ok(None)
    }

    fn render(&self, repository: &FetchedRepository, files: &[FileView<'_>]) -> Result<String> {
        let directories = &repository.directories
            [..repository.directories.len().min(MAX_DIRECTORIES)];

        let context = PromptContext {
            repository: &repository.info,
            stats: StatsView {
                total_files: repository.stats.total_files,
                code_files: repository.stats.code_files,
                fetched_files: repository.stats.fetched_files,
                skipped_files: repository.stats.skipped_files,
                main_language: repository.stats.main_language(),
            },
            directories,
            files: files.to_vec(),
            requirements: self.options.requirements(),
            include_diagrams: self.options.include_diagrams,
        };

        let context = Context::from_serialize(&context)
            .map_err(|e| Error::template(TEMPLATE_NAME, e))?;

        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| Error::template(TEMPLATE_NAME, e))
    }
}

/// Returns the longest prefix of at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Maps a file path to a markdown fence language.
fn fence_language_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let Some(path) = value.as_str() else {
        return Ok(Value::String(String::new()));
    };

    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    let ext = name.rsplit_once('.').map_or(name.as_str(), |(_, ext)| ext);

    let language = match ext {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "scala" => "scala",
        "sh" | "bash" => "bash",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "vue" => "vue",
        "xml" => "xml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "ini" | "cfg" => "ini",
        "md" => "markdown",
        "sql" => "sql",
        "proto" => "protobuf",
        "dockerfile" => "dockerfile",
        "makefile" => "makefile",
        _ => "",
    };

    Ok(Value::String(language.to_string()))
}
