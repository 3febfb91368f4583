use crate::{
    analysis::{AnalysisClient, AnalysisResult, Analyzer, GeminiClient},
    config::{Config, Credentials},
    document::{DocumentModel, DocumentRenderer, GeneratedDocument},
    error::Result,
    filter::FileFilter,
    github::{FetchLimits, Fetcher, GitHubClient, RepositoryInfo, RepositorySource},
    prompt::{PromptBuilder, PromptStats},
    reference::RepositoryReference,
};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Pipeline stage currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Parsing the repository URL
    Parsing,
    /// Walking the repository through the API
    Fetching,
    /// Categorising and ranking files
    Filtering,
    /// Waiting for the model
    Analyzing,
    /// Encoding documents
    Rendering,
}

impl Stage {
    const COUNT: usize = 5;

    const fn number(self) -> usize {
        match self {
            Self::Parsing => 1,
            Self::Fetching => 2,
            Self::Filtering => 3,
            Self::Analyzing => 4,
            Self::Rendering => 5,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Parsing => "Parsing URL",
            Self::Fetching => "Fetching repository",
            Self::Filtering => "Selecting files",
            Self::Analyzing => "Analysing architecture",
            Self::Rendering => "Rendering documents",
        };
        f.write_str(label)
    }
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Nothing started yet
    #[default]
    Idle,
    /// A stage is executing
    Running(Stage),
    /// Documents were produced
    Done,
    /// The run ended with an error
    Failed,
}

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Files seen in the repository tree
    pub total_files: usize,

    /// Files with a recognised code extension
    pub code_files: usize,

    /// Files whose content was downloaded
    pub fetched_files: usize,

    /// Files seen but not downloaded
    pub skipped_files: usize,

    /// Directories pruned by exclusion rules
    pub skipped_directories: usize,

    /// Files selected for analysis
    pub selected_files: usize,

    /// Budget accounting of the prompt
    #[serde(skip)]
    pub prompt: PromptStats,

    /// Most common code language
    pub main_language: String,

    /// Number of documents rendered
    pub documents: usize,

    /// Time spent talking to GitHub
    pub fetch_duration: Duration,

    /// Time spent waiting for the model
    pub analysis_duration: Duration,

    /// Time spent encoding documents
    pub render_duration: Duration,

    /// Total execution time
    pub duration: Duration,
}

impl PipelineStats {
    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║          Architecture Documentation Summary           ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Files Seen:           {:>8}                        ║",
            self.total_files
        );
        println!(
            "║   - Code files:       {:>8}                        ║",
            self.code_files
        );
        println!(
            "║   - Downloaded:       {:>8}                        ║",
            self.fetched_files
        );
        println!(
            "║   - Skipped:          {:>8}                        ║",
            self.skipped_files
        );
        println!(
            "║ Main Language:        {:>8}                        ║",
            self.main_language
        );
        println!("║                                                       ║");
        println!(
            "║ Files Analysed:       {:>8}                        ║",
            self.prompt.files_included
        );
        println!(
            "║   - Truncated:        {:>8}                        ║",
            self.prompt.files_truncated
        );
        println!(
            "║   - Dropped:          {:>8}                        ║",
            self.prompt.files_dropped
        );
        println!(
            "║ Prompt Tokens (est.): {:>8}                        ║",
            self.prompt.estimated_tokens
        );
        println!(
            "║ Documents:            {:>8}                        ║",
            self.documents
        );
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Fetching:         {:>8.2}s                     ║",
            self.fetch_duration.as_secs_f64()
        );
        println!(
            "║   - Analysis:         {:>8.2}s                     ║",
            self.analysis_duration.as_secs_f64()
        );
        println!(
            "║   - Rendering:        {:>8.2}s                     ║",
            self.render_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Everything one successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Parsed repository reference
    pub reference: RepositoryReference,
    /// Repository metadata
    pub info: RepositoryInfo,
    /// Model output
    pub analysis: AnalysisResult,
    /// Format-neutral document content
    pub model: DocumentModel,
    /// Encoded documents, one per configured format
    pub documents: Vec<GeneratedDocument>,
    /// Run statistics
    pub stats: PipelineStats,
}

type ProgressFn = Box<dyn FnMut(RunState)>;

/// Runs URL parsing, fetching, selection, analysis and rendering.
pub struct Pipeline {
    config: Config,
    source: Box<dyn RepositorySource>,
    client: Box<dyn AnalysisClient>,
    filter: FileFilter,
    prompts: PromptBuilder,
    state: RunState,
    progress: Option<ProgressFn>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline talking to GitHub and Gemini.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The API key is empty
    /// - An HTTP client cannot be built
    pub fn from_credentials(config: Config, credentials: &Credentials) -> Result<Self> {
        let source = GitHubClient::new(
            config.github_api_base.clone(),
            credentials.github_token.clone(),
            config.github_timeout,
        )?;
        let client = GeminiClient::from_config(&config, credentials.api_key.clone())?;

        Self::with_clients(config, Box::new(source), Box::new(client))
    }

    /// Creates a pipeline over the given repository source and model client.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails or the prompt
    /// template cannot be loaded.
    pub fn with_clients(
        config: Config,
        source: Box<dyn RepositorySource>,
        client: Box<dyn AnalysisClient>,
    ) -> Result<Self> {
        config.validate()?;

        let filter = FileFilter::new(
            config
                .file_filter_config
                .clone()
                .max_selected_files(config.max_selected_files),
        )?;
        let prompts = PromptBuilder::new(&config)?;

        Ok(Self {
            config,
            source,
            client,
            filter,
            prompts,
            state: RunState::Idle,
            progress: None,
        })
    }

    /// Registers a callback invoked on every state change.
    #[must_use]
    pub fn on_progress(mut self, callback: impl FnMut(RunState) + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Current run state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Produces the architecture documents for `url`.
    ///
    /// # Process
    ///
    /// 1. **Parse**: Validates the URL, before any network call
    /// 2. **Fetch**: Walks the repository through the API
    /// 3. **Select**: Ranks files and caps the selection
    /// 4. **Analyse**: Sends one prompt to the model
    /// 5. **Render**: Encodes the configured document formats
    ///
    /// # Errors
    ///
    /// Returns the first stage error; no documents are produced then.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use repo_archdoc::{Config, Credentials, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let credentials = Credentials::new("api-key", None);
    /// let mut pipeline = Pipeline::from_credentials(Config::builder().build()?, &credentials)?;
    ///
    /// let output = pipeline.run("https://github.com/rust-lang/log")?;
    /// output.stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self))]
    pub fn run(&mut self, url: &str) -> Result<PipelineOutput> {
        let result = self.execute(url);

        match result {
            Ok(_) => self.transition(RunState::Done),
            Err(ref e) => {
                warn!("Run failed: {e}");
                self.transition(RunState::Failed);
            }
        }

        result
    }

    fn execute(&mut self, url: &str) -> Result<PipelineOutput> {
        let start_time = Instant::now();

        self.enter(Stage::Parsing);
        let reference = RepositoryReference::parse(url)?;
        info!("✓ Repository {reference}");

        self.enter(Stage::Fetching);
        let fetch_start = Instant::now();
        let limits = FetchLimits {
            max_file_size: self.config.max_file_size,
            max_fetch_files: self.config.max_fetch_files,
        };
        let mut repository = Fetcher::new(&*self.source, &self.filter, limits).fetch(&reference)?;
        let fetch_duration = fetch_start.elapsed();
        info!(
            "✓ Fetched {} files ({} skipped) in {:.2}s",
            repository.stats.fetched_files,
            repository.stats.skipped_files,
            fetch_duration.as_secs_f64()
        );

        self.enter(Stage::Filtering);
        let selected = self.filter.apply(std::mem::take(&mut repository.files));
        if selected.is_empty() {
            warn!("No analysable files selected; the analysis will rely on metadata only");
        }
        info!("✓ Selected {} files for analysis", selected.len());

        self.enter(Stage::Analyzing);
        let analysis_start = Instant::now();
        let (analysis, prompt_stats) =
            Analyzer::new(&*self.client, &self.prompts).analyze(&repository, &selected)?;
        let analysis_duration = analysis_start.elapsed();
        info!(
            "✓ Analysis received in {:.2}s",
            analysis_duration.as_secs_f64()
        );

        self.enter(Stage::Rendering);
        let render_start = Instant::now();
        let generated_on = chrono::Local::now().date_naive();
        let model = DocumentModel::build(&repository, &analysis, generated_on)?;
        let documents = DocumentRenderer.render(&model, &self.config.formats)?;
        let render_duration = render_start.elapsed();
        info!(
            "✓ Rendered {} document(s) in {:.2}s",
            documents.len(),
            render_duration.as_secs_f64()
        );

        let stats = PipelineStats {
            total_files: repository.stats.total_files,
            code_files: repository.stats.code_files,
            fetched_files: repository.stats.fetched_files,
            skipped_files: repository.stats.skipped_files,
            skipped_directories: repository.stats.skipped_directories,
            selected_files: selected.len(),
            prompt: prompt_stats,
            main_language: model.language.clone(),
            documents: documents.len(),
            fetch_duration,
            analysis_duration,
            render_duration,
            duration: start_time.elapsed(),
        };

        Ok(PipelineOutput {
            reference,
            info: repository.info,
            analysis,
            model,
            documents,
            stats,
        })
    }

    fn enter(&mut self, stage: Stage) {
        info!("Stage {}/{}: {stage}...", stage.number(), Stage::COUNT);
        self.transition(RunState::Running(stage));
    }

    fn transition(&mut self, state: RunState) {
        self.state = state;
        if let Some(ref mut callback) = self.progress {
            callback(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MockAnalysisClient;
    use crate::config::DocumentFormat;
    use crate::github::{EntryKind, MockRepositorySource, RemoteEntry};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn file_entry(path: &str, size: u64) -> RemoteEntry {
        RemoteEntry {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            kind: EntryKind::File,
            size,
            download_url: Some(format!("https://raw.example/{path}")),
        }
    }

    fn widget_source() -> MockRepositorySource {
        let mut source = MockRepositorySource::new();
        source.expect_repository_info().returning(|_| {
            Ok(RepositoryInfo {
                full_name: "acme/widget".to_string(),
                description: Some("Widgets".to_string()),
                language: Some("JavaScript".to_string()),
                ..RepositoryInfo::default()
            })
        });
        source
            .expect_list_directory()
            .returning(|_, _| Ok(vec![file_entry("README.md", 20), file_entry("package.json", 30)]));
        source.expect_download().returning(|entry| match entry.path.as_str() {
            "README.md" => Ok(b"# Widget\nA widget store.".to_vec()),
            _ => Ok(br#"{"name": "widget", "dependencies": {"express": "^4"}}"#.to_vec()),
        });
        source
    }

    fn crud_client() -> MockAnalysisClient {
        let mut client = MockAnalysisClient::new();
        client
            .expect_generate()
            .withf(|prompt: &str| prompt.contains("package.json") && prompt.contains("README.md"))
            .times(1)
            .returning(|_| Ok("## Architecture\nSimple CRUD app.".to_string()));
        client
    }

    #[test]
    fn test_end_to_end_with_stubs() {
        let config = Config::builder().build().unwrap();
        let mut pipeline =
            Pipeline::with_clients(config, Box::new(widget_source()), Box::new(crud_client()))
                .unwrap();

        let output = pipeline.run("https://github.com/acme/widget").unwrap();

        assert_eq!(output.reference.full_name(), "acme/widget");
        assert_eq!(output.model.sections.len(), 1);
        assert_eq!(output.model.sections[0].title, "Architecture");
        assert_eq!(output.model.sections[0].body, "Simple CRUD app.");
        assert_eq!(output.documents.len(), 2);
        assert_eq!(output.documents[0].format, DocumentFormat::Pdf);
        assert!(output.documents[0].bytes.starts_with(b"%PDF"));
        assert!(output.documents[1].bytes.starts_with(b"PK"));
        assert_eq!(output.stats.fetched_files, 2);
        assert_eq!(output.stats.selected_files, 2);
        assert_eq!(output.stats.prompt.files_included, 2);
        assert_eq!(pipeline.state(), RunState::Done);
    }

    #[test]
    fn test_invalid_url_makes_no_calls() {
        let mut source = MockRepositorySource::new();
        source.expect_repository_info().never();
        source.expect_list_directory().never();
        let mut client = MockAnalysisClient::new();
        client.expect_generate().never();

        let config = Config::builder().build().unwrap();
        let mut pipeline =
            Pipeline::with_clients(config, Box::new(source), Box::new(client)).unwrap();

        let err = pipeline.run("https://gitlab.com/acme/widget").unwrap_err();
        assert!(err.is_invalid_url());
        assert_eq!(pipeline.state(), RunState::Failed);
    }

    #[test]
    fn test_progress_reports_every_stage() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);

        let config = Config::builder()
            .formats(vec![DocumentFormat::Docx])
            .build()
            .unwrap();
        let mut pipeline =
            Pipeline::with_clients(config, Box::new(widget_source()), Box::new(crud_client()))
                .unwrap()
                .on_progress(move |state| log.borrow_mut().push(state));

        let output = pipeline.run("github.com/acme/widget").unwrap();
        assert_eq!(output.documents.len(), 1);

        assert_eq!(
            *seen.borrow(),
            vec![
                RunState::Running(Stage::Parsing),
                RunState::Running(Stage::Fetching),
                RunState::Running(Stage::Filtering),
                RunState::Running(Stage::Analyzing),
                RunState::Running(Stage::Rendering),
                RunState::Done,
            ]
        );
    }

    #[test]
    fn test_service_error_fails_run() {
        let mut client = MockAnalysisClient::new();
        client
            .expect_generate()
            .returning(|_| Err(crate::Error::ai_service("quota exceeded")));

        let config = Config::builder().build().unwrap();
        let mut pipeline =
            Pipeline::with_clients(config, Box::new(widget_source()), Box::new(client)).unwrap();

        let err = pipeline.run("https://github.com/acme/widget").unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(pipeline.state(), RunState::Failed);
    }

    #[test]
    fn test_missing_repository_fails_before_analysis() {
        let mut source = MockRepositorySource::new();
        source
            .expect_repository_info()
            .returning(|r| Err(crate::Error::not_found(r.full_name())));
        let mut client = MockAnalysisClient::new();
        client.expect_generate().never();

        let config = Config::builder().build().unwrap();
        let mut pipeline =
            Pipeline::with_clients(config, Box::new(source), Box::new(client)).unwrap();

        assert!(pipeline.run("https://github.com/acme/ghost").unwrap_err().is_not_found());
    }
}
