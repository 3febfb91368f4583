//! Architecture analysis through a hosted LLM.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::file::FileEntry;
use crate::github::FetchedRepository;
use crate::prompt::{PromptBuilder, PromptStats};
use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Raw model output plus the first diagram found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Markdown narrative returned by the model
    pub narrative_text: String,
    /// First Mermaid diagram in the narrative, verbatim
    pub diagram_source: Option<String>,
}

impl AnalysisResult {
    /// Wraps model output, extracting the diagram.
    #[must_use]
    pub fn from_narrative(narrative_text: String) -> Self {
        let diagram_source = extract_diagram(&narrative_text);
        Self {
            narrative_text,
            diagram_source,
        }
    }
}

/// Text generation backend.
#[cfg_attr(test, mockall::automock)]
pub trait AnalysisClient {
    /// Sends one prompt and returns the generated text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AiService`] when the service cannot be reached,
    /// rejects the request or returns no text.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Blocking client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiClient {
    /// Creates a client for `model` at `api_base`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty key or if the HTTP client
    /// cannot be built.
    pub fn new(
        api_base: &str,
        model: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("Gemini API key is empty"));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/models/{}:generateContent",
                api_base.trim_end_matches('/'),
                model
            ),
            api_key,
            temperature: crate::config::DEFAULT_TEMPERATURE,
            max_output_tokens: crate::config::DEFAULT_MAX_OUTPUT_TOKENS,
        })
    }

    /// Creates a client from the configured model, base URL, timeout and
    /// generation settings.
    ///
    /// # Errors
    ///
    /// See [`GeminiClient::new`].
    pub fn from_config(config: &Config, api_key: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(&config.ai_api_base, &config.model, api_key, config.ai_timeout)?;
        client.temperature = config.temperature;
        client.max_output_tokens = config.max_output_tokens;
        Ok(client)
    }

    fn request_body<'a>(&self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

impl AnalysisClient for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        tracing::debug!("POST {} ({} chars)", self.endpoint, prompt.len());

        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .map_err(|e| Error::ai_service(format!("Request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        let body = response.text().map_err(|e| {
            Error::ai_service(format!("Reading response from {} failed: {e}", self.endpoint))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map_or_else(|_| body.trim().to_string(), |b| b.error.message);
            return Err(Error::ai_service(format!(
                "Gemini returned {}: {message}",
                status.as_u16()
            )));
        }

        parse_response(&body)
    }
}

/// Extracts the generated text from a `generateContent` response body.
fn parse_response(body: &str) -> Result<String> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| Error::ai_service(format!("Unreadable response: {e}")))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(Error::ai_service(format!("Prompt was blocked: {reason}")));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(Error::ai_service("Response contained no candidates"));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(Error::ai_service(format!(
            "Response contained no text (finish reason: {reason})"
        )));
    }

    Ok(text)
}

/// Returns the first Mermaid block in `markdown`.
///
/// A fence tagged `mermaid` wins; otherwise the first untagged fence whose
/// body starts with `graph` or `flowchart` is used.
#[must_use]
pub fn extract_diagram(markdown: &str) -> Option<String> {
    let mut fallback = None;
    let mut current: Option<(bool, String)> = None;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let language = info.split_whitespace().next().unwrap_or("");
                if language.eq_ignore_ascii_case("mermaid") {
                    current = Some((true, String::new()));
                } else if language.is_empty() {
                    current = Some((false, String::new()));
                }
            }
            Event::Text(text) => {
                if let Some((_, ref mut body)) = current {
                    body.push_str(&text);
                }
            }
            Event::End(Tag::CodeBlock(_)) => match current.take() {
                Some((true, body)) if !body.trim().is_empty() => {
                    return Some(body.trim_end().to_string());
                }
                Some((false, body)) if fallback.is_none() && is_bare_diagram(&body) => {
                    fallback = Some(body.trim_end().to_string());
                }
                _ => {}
            },
            _ => {}
        }
    }

    fallback
}

pub(crate) fn is_bare_diagram(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with("graph") || head.starts_with("flowchart")
}

/// Runs one analysis: prompt rendering plus a single model call.
pub struct Analyzer<'a, C: AnalysisClient + ?Sized> {
    client: &'a C,
    prompts: &'a PromptBuilder,
}

impl<'a, C: AnalysisClient + ?Sized> Analyzer<'a, C> {
    /// Creates an analyzer.
    pub const fn new(client: &'a C, prompts: &'a PromptBuilder) -> Self {
        Self { client, prompts }
    }

    /// Analyses the selected files of `repository`.
    ///
    /// # Errors
    ///
    /// Propagates prompt and client errors; an empty reply is an
    /// [`Error::AiService`].
    pub fn analyze(
        &self,
        repository: &FetchedRepository,
        files: &[FileEntry],
    ) -> Result<(AnalysisResult, PromptStats)> {
        let prompt = self.prompts.build(repository, files)?;
        tracing::info!(
            "Requesting analysis ({} files, ~{} tokens)",
            prompt.stats.files_included,
            prompt.stats.estimated_tokens
        );

        let narrative = self.client.generate(&prompt.text)?;
        if narrative.trim().is_empty() {
            return Err(Error::ai_service("Model returned an empty analysis"));
        }

        let result = AnalysisResult::from_narrative(narrative);
        tracing::debug!(
            chars = result.narrative_text.len(),
            diagram = result.diagram_source.is_some(),
            "Analysis received"
        );

        Ok((result, prompt.stats))
    }
}
