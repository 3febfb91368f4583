//! Document model and the PDF/DOCX encoders built on it.
//!
//! The model is format-neutral: [`DocumentModel::build`] turns fetched
//! metadata and the model's narrative into titled sections, and each
//! encoder lays those sections out in its own format.

mod docx;
mod pdf;
pub mod sections;

use crate::analysis::AnalysisResult;
use crate::config::DocumentFormat;
use crate::error::Result;
use crate::github::FetchedRepository;
use chrono::NaiveDate;

pub use sections::{Block, Narrative, Section, split_narrative, split_sections};

/// Document title.
pub const DOCUMENT_TITLE: &str = "Architecture Documentation";

/// Title of the section that carries a diagram missing from the narrative.
pub const DIAGRAM_SECTION_TITLE: &str = "Diagram Source";

/// Label printed above every diagram block.
pub const DIAGRAM_LABEL: &str = "Mermaid Diagram Code:";

/// Format-neutral content of an architecture document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentModel {
    /// Document title
    pub title: String,
    /// `owner/name`
    pub repository: String,
    /// Repository description, if any
    pub description: Option<String>,
    /// Main language
    pub language: String,
    /// Generation date, already formatted
    pub generated_on: String,
    /// Metric/value rows of the statistics table
    pub statistics: Vec<(String, String)>,
    /// Narrative text before the first section
    pub preface: Option<String>,
    /// Sections in order
    pub sections: Vec<Section>,
}

impl DocumentModel {
    /// Builds the model for one analysed repository.
    ///
    /// # Errors
    ///
    /// Returns a render error when the narrative is empty.
    pub fn build(
        repository: &FetchedRepository,
        analysis: &AnalysisResult,
        generated_on: NaiveDate,
    ) -> Result<Self> {
        let Narrative {
            preface,
            mut sections,
        } = split_narrative(&analysis.narrative_text)?;

        let claimed = |diagram: &String| sections.iter().any(|s| s.diagrams.contains(diagram));
        if let Some(diagram) = analysis.diagram_source.as_ref().filter(|d| !claimed(d)) {
            sections.push(Section {
                title: DIAGRAM_SECTION_TITLE.to_string(),
                body: String::new(),
                diagrams: vec![diagram.clone()],
                formatted: true,
            });
        }

        let language = repository
            .info
            .language
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| repository.stats.main_language());

        Ok(Self {
            title: DOCUMENT_TITLE.to_string(),
            repository: repository.reference.full_name(),
            description: repository
                .info
                .description
                .clone()
                .filter(|d| !d.trim().is_empty()),
            statistics: statistics(repository, &language),
            language,
            generated_on: generated_on.format("%B %d, %Y").to_string(),
            preface,
            sections,
        })
    }
}

fn statistics(repository: &FetchedRepository, language: &str) -> Vec<(String, String)> {
    let stats = &repository.stats;
    [
        ("Total Files", stats.total_files.to_string()),
        ("Code Files", stats.code_files.to_string()),
        ("Analyzed Files", stats.fetched_files.to_string()),
        ("Skipped Files", stats.skipped_files.to_string()),
        ("Main Language", language.to_string()),
        ("Modules Count", repository.directories.len().to_string()),
        ("Stars", repository.info.stars.to_string()),
        ("Forks", repository.info.forks.to_string()),
    ]
    .into_iter()
    .map(|(metric, value)| (metric.to_string(), value))
    .collect()
}

/// Encoded document bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    /// Format of `bytes`
    pub format: DocumentFormat,
    /// Encoded document
    pub bytes: Vec<u8>,
}

impl GeneratedDocument {
    /// Output file name: `{repo}_architecture.{ext}`.
    #[must_use]
    pub fn file_name(&self, repository_name: &str) -> String {
        format!("{repository_name}_architecture.{}", self.format.extension())
    }

    /// MIME type of the encoded bytes.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Encodes a [`DocumentModel`] into the requested formats.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentRenderer;

impl DocumentRenderer {
    /// Renders one document per format, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Render`] if an encoder fails.
    pub fn render(
        &self,
        model: &DocumentModel,
        formats: &[DocumentFormat],
    ) -> Result<Vec<GeneratedDocument>> {
        formats
            .iter()
            .map(|&format| {
                let bytes = match format {
                    DocumentFormat::Pdf => pdf::render(model)?,
                    DocumentFormat::Docx => docx::render(model)?,
                };
                tracing::debug!("Rendered {} ({} bytes)", format.label(), bytes.len());
                Ok(GeneratedDocument { format, bytes })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::file::FileEntry;
    use crate::github::{FetchStats, RepositoryInfo};
    use crate::reference::RepositoryReference;

    pub(crate) fn repository() -> FetchedRepository {
        let mut stats = FetchStats {
            total_files: 12,
            code_files: 7,
            fetched_files: 9,
            skipped_files: 3,
            ..FetchStats::default()
        };
        stats.languages.insert("rs".to_string(), 7);

        FetchedRepository {
            reference: RepositoryReference::parse("https://github.com/acme/widget").unwrap(),
            info: RepositoryInfo {
                full_name: "acme/widget".to_string(),
                description: Some("Widget service".to_string()),
                language: None,
                stars: 42,
                forks: 5,
                ..RepositoryInfo::default()
            },
            files: vec![FileEntry::new("README.md", "# Widget", 8)],
            directories: vec!["src".to_string(), "tests".to_string()],
            stats,
        }
    }

    pub(crate) fn model(narrative: &str) -> DocumentModel {
        let analysis = AnalysisResult::from_narrative(narrative.to_string());
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        DocumentModel::build(&repository(), &analysis, date).unwrap()
    }

    #[test]
    fn test_model_header_fields() {
        let model = model("## Architecture\nSimple CRUD app.");

        assert_eq!(model.title, DOCUMENT_TITLE);
        assert_eq!(model.repository, "acme/widget");
        assert_eq!(model.description.as_deref(), Some("Widget service"));
        assert_eq!(model.language, "RS");
        assert_eq!(model.generated_on, "March 09, 2026");
        assert_eq!(model.sections, vec![Section::new("Architecture", "Simple CRUD app.")]);
    }

    #[test]
    fn test_statistics_rows() {
        let model = model("text");
        let rows: Vec<(&str, &str)> = model
            .statistics
            .iter()
            .map(|(m, v)| (m.as_str(), v.as_str()))
            .collect();

        assert_eq!(
            rows,
            vec![
                ("Total Files", "12"),
                ("Code Files", "7"),
                ("Analyzed Files", "9"),
                ("Skipped Files", "3"),
                ("Main Language", "RS"),
                ("Modules Count", "2"),
                ("Stars", "42"),
                ("Forks", "5"),
            ]
        );
    }

    #[test]
    fn test_github_language_preferred() {
        let mut repo = repository();
        repo.info.language = Some("Rust".to_string());
        let analysis = AnalysisResult::from_narrative("x".to_string());
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let model = DocumentModel::build(&repo, &analysis, date).unwrap();
        assert_eq!(model.language, "Rust");
    }

    #[test]
    fn test_inline_diagram_not_duplicated() {
        let model = model("## Diagram\n```mermaid\ngraph TD\n  A-->B\n```");
        assert_eq!(model.sections.len(), 1);
        assert_eq!(model.sections[0].diagrams.len(), 1);
    }

    #[test]
    fn test_unformatted_narrative_diagram_adds_no_section() {
        let model = model("Plain analysis text.\n\n```mermaid\ngraph TD\n  A-->B\n```");

        assert_eq!(model.sections.len(), 1);
        assert!(!model.sections[0].formatted);
        assert_eq!(model.sections[0].diagrams, vec!["graph TD\n  A-->B".to_string()]);
    }

    #[test]
    fn test_leading_diagram_adds_no_section() {
        let model = model("```mermaid\ngraph TD\n  A-->B\n```\n\n# One\na\n\n# Two\nb\n\n# Three\nc");

        let titles: Vec<&str> = model.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
        assert_eq!(model.sections[0].diagrams.len(), 1);
        assert!(model.preface.is_none());
    }

    #[test]
    fn test_unclaimed_diagram_gets_section() {
        let analysis = AnalysisResult {
            narrative_text: "## Overview\nText.".to_string(),
            diagram_source: Some("graph LR\n  X-->Y".to_string()),
        };
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let model = DocumentModel::build(&repository(), &analysis, date).unwrap();

        let last = model.sections.last().unwrap();
        assert_eq!(last.title, DIAGRAM_SECTION_TITLE);
        assert_eq!(last.diagrams, vec!["graph LR\n  X-->Y".to_string()]);
    }

    #[test]
    fn test_empty_narrative_fails() {
        let analysis = AnalysisResult::from_narrative("   ".to_string());
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(DocumentModel::build(&repository(), &analysis, date).is_err());
    }

    #[test]
    fn test_render_both_formats() {
        let model = model("Preface.\n\n## Architecture\nSimple CRUD app.\n\n- one\n- two");
        let docs = DocumentRenderer
            .render(&model, &DocumentFormat::ALL)
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs[0].bytes.starts_with(b"%PDF"));
        assert!(docs[1].bytes.starts_with(b"PK"));
        assert_eq!(docs[0].file_name("widget"), "widget_architecture.pdf");
        assert_eq!(docs[1].file_name("widget"), "widget_architecture.docx");
        assert_eq!(docs[0].mime_type(), "application/pdf");
    }

    #[test]
    fn test_render_single_format() {
        let docs = DocumentRenderer
            .render(&model("text"), &[DocumentFormat::Docx])
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].format, DocumentFormat::Docx);
    }
}
