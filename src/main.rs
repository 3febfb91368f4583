use anyhow::{Context, bail};
use clap::Parser;
use repo_archdoc::{
    AnalysisOptions, Config, Credentials, DEFAULT_MAX_FILE_CHARS, DEFAULT_MAX_INPUT_TOKENS,
    DEFAULT_MAX_SELECTED_FILES, DEFAULT_MODEL, DocumentFormat, FileFilterConfig, Pipeline,
    TokenizerKind, Writer,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "repo-archdoc",
    version,
    author,
    about = "Generate architecture documentation for a GitHub repository",
    long_about = "Generate architecture documentation for a GitHub repository.\n\n\
    The repository is read through the GitHub API, the most relevant files are \
    sent to Google Gemini for an architecture analysis, and the result is saved \
    as PDF and/or DOCX.\n\n\
    USAGE EXAMPLES:\n  \
      # Both formats into the current directory\n  \
      repo-archdoc https://github.com/rust-lang/log\n\n  \
      # PDF only, into ./docs\n  \
      repo-archdoc github.com/tokio-rs/mini-redis --format pdf --out ./docs\n\n  \
      # Skip diagrams and keep the raw diagram source of a run\n  \
      repo-archdoc https://github.com/acme/widget --diagram-out widget.mmd"
)]
struct Cli {
    /// GitHub repository URL (https://github.com/OWNER/REPO)
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// Output directory for generated documents
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    out: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "both")]
    format: CliFormat,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// GitHub token for higher rate limits
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Max files sent for analysis
    #[arg(long, default_value_t = DEFAULT_MAX_SELECTED_FILES)]
    max_files: usize,

    /// Token budget for the analysis prompt
    #[arg(long, default_value_t = DEFAULT_MAX_INPUT_TOKENS)]
    max_input_tokens: usize,

    /// Character cap per file in the prompt
    #[arg(long, default_value_t = DEFAULT_MAX_FILE_CHARS)]
    max_file_chars: usize,

    /// Tokenizer used for the prompt budget
    #[arg(long, value_enum, default_value = "simple")]
    tokenizer: CliTokenizer,

    /// Path to custom Tera prompt template
    ///
    /// The template must use the `files` and `requirements` variables.
    #[arg(long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Extra file glob to exclude (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Extra directory glob to exclude (repeatable)
    #[arg(long = "exclude-dir", value_name = "GLOB")]
    exclude_dir: Vec<String>,

    /// Do not ask for Mermaid diagrams
    #[arg(long)]
    no_diagrams: bool,

    /// Do not ask for design patterns
    #[arg(long)]
    no_patterns: bool,

    /// Do not ask for dependency analysis
    #[arg(long)]
    no_dependencies: bool,

    /// Do not ask for data flow
    #[arg(long)]
    no_data_flow: bool,

    /// Also write the raw diagram source to this file
    #[arg(long, value_name = "FILE")]
    diagram_out: Option<PathBuf>,

    /// Overwrite existing documents without a backup
    #[arg(long)]
    no_backup: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliFormat {
    Pdf,
    Docx,
    Both,
}

impl From<CliFormat> for Vec<DocumentFormat> {
    fn from(f: CliFormat) -> Self {
        match f {
            CliFormat::Pdf => vec![DocumentFormat::Pdf],
            CliFormat::Docx => vec![DocumentFormat::Docx],
            CliFormat::Both => DocumentFormat::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliTokenizer {
    Simple,
    Enhanced,
}

impl From<CliTokenizer> for TokenizerKind {
    fn from(t: CliTokenizer) -> Self {
        match t {
            CliTokenizer::Simple => Self::Simple,
            CliTokenizer::Enhanced => Self::Enhanced,
        }
    }
}

fn main() -> ExitCode {
    // .env must be loaded before clap reads the environment
    let dotenv_error = dotenv_failure(dotenvy::dotenv());
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(cli.verbose) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    if let Some(e) = dotenv_error {
        tracing::warn!("Could not load .env: {e}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(url) = cli.url.filter(|u| !u.trim().is_empty()) else {
        bail!("a repository URL is required (https://github.com/OWNER/REPO)");
    };
    let Some(api_key) = cli.api_key.filter(|k| !k.trim().is_empty()) else {
        bail!("no Gemini API key; pass --api-key or set GEMINI_API_KEY");
    };
    let credentials = Credentials::new(api_key, cli.github_token);

    let mut builder = Config::builder()
        .output_dir(cli.out)
        .formats(cli.format.into())
        .model(cli.model)
        .max_selected_files(cli.max_files)
        .max_input_tokens(cli.max_input_tokens)
        .max_file_chars(cli.max_file_chars)
        .tokenizer(cli.tokenizer.into())
        .backup_existing(!cli.no_backup)
        .analysis(AnalysisOptions {
            include_diagrams: !cli.no_diagrams,
            include_patterns: !cli.no_patterns,
            include_dependencies: !cli.no_dependencies,
            include_data_flow: !cli.no_data_flow,
        })
        .file_filter_config(
            FileFilterConfig::new()
                .exclude_files(cli.exclude)
                .exclude_directories(cli.exclude_dir),
        );

    if let Some(template_path) = cli.template {
        builder = builder.template_path(template_path);
    }

    if let Some(diagram_out) = cli.diagram_out {
        builder = builder.diagram_out(diagram_out);
    }

    let config = builder.build().context("invalid configuration")?;
    let writer = Writer::new(&config);

    let output = Pipeline::from_credentials(config, &credentials)
        .context("failed to set up the pipeline")?
        .run(&url)?;

    let paths = writer.write(&output).context("failed to save documents")?;

    output.stats.print_summary();
    for path in paths {
        println!("  {}", path.display());
    }

    Ok(())
}

/// A missing `.env` is fine; anything else is worth reporting.
fn dotenv_failure<T>(result: dotenvy::Result<T>) -> Option<dotenvy::Error> {
    result.err().filter(|e| !e.not_found())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("repo_archdoc=info"),
        1 => EnvFilter::new("repo_archdoc=debug"),
        _ => EnvFilter::new("repo_archdoc=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("failed to install the log subscriber")?;

    Ok(())
}
