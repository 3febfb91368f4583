use crate::{
    config::Config,
    error::{Error, Result},
    pipeline::PipelineOutput,
};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

const MAX_FILE_STEM: usize = 100;

/// Saves generated documents with atomic operations.
#[derive(Debug, Clone)]
pub struct Writer {
    output_dir: PathBuf,
    backup_existing: bool,
    diagram_out: Option<PathBuf>,
}

impl Writer {
    /// Creates a writer from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            backup_existing: config.backup_existing,
            diagram_out: config.diagram_out.clone(),
        }
    }

    /// Writes every document of `output`, plus the diagram source when
    /// configured, and returns the written paths.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Output directory cannot be created
    /// - File write operations fail
    pub fn write(&self, output: &PipelineOutput) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let stem = sanitize_filename(output.reference.name());
        let mut written = Vec::with_capacity(output.documents.len() + 1);

        for document in &output.documents {
            let path = self.output_dir.join(document.file_name(&stem));
            self.write_file_atomic(&path, &document.bytes)?;
            info!(
                "Saved {} ({} bytes) to {}",
                document.format.label(),
                document.bytes.len(),
                path.display()
            );
            written.push(path);
        }

        if let Some(ref path) = self.diagram_out {
            match output.analysis.diagram_source {
                Some(ref diagram) => {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
                    }
                    self.write_file_atomic(path, diagram.as_bytes())?;
                    info!("Saved diagram source to {}", path.display());
                    written.push(path.clone());
                }
                None => tracing::warn!("No diagram in the analysis; {} not written", path.display()),
            }
        }

        Ok(written)
    }

    /// Writes a file atomically with optional backup.
    ///
    /// # Process
    ///
    /// 1. Creates backup if file exists and backup is enabled
    /// 2. Writes content to temporary file
    /// 3. Syncs temporary file to disk
    /// 4. Atomically renames temporary file to target path
    fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        if path.exists() && self.backup_existing {
            backup_file(path)?;
        }

        let temp_path = temp_path(path)?;
        let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .write_all(content)
            .map_err(|e| Error::io(&temp_path, e))?;
        temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::io(path, e));
        }

        Ok(())
    }
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let filename = path
        .file_name()
        .ok_or_else(|| Error::config(format!("Invalid output path: {}", path.display())))?
        .to_string_lossy();

    Ok(path.with_file_name(format!(".{filename}.tmp")))
}

/// Creates a timestamped backup of an existing file.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");

    let filename = path
        .file_name()
        .ok_or_else(|| Error::config("Invalid file path"))?
        .to_string_lossy();

    let backup_path = path.with_file_name(format!("{filename}.backup.{timestamp}"));

    fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

    debug!("Created backup: {}", backup_path.display());
    Ok(backup_path)
}

/// Makes a repository name safe to use as a file stem.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_STEM)
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "repository".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisResult;
    use crate::config::DocumentFormat;
    use crate::document::GeneratedDocument;
    use crate::document::tests::{model, repository};
    use crate::pipeline::PipelineStats;
    use crate::prompt::PromptStats;
    use assert_fs::prelude::*;
    use std::time::Duration;

    fn output(diagram: Option<&str>) -> PipelineOutput {
        let repository = repository();
        PipelineOutput {
            reference: repository.reference.clone(),
            info: repository.info,
            analysis: AnalysisResult {
                narrative_text: "## Architecture\nSimple CRUD app.".to_string(),
                diagram_source: diagram.map(str::to_string),
            },
            model: model("## Architecture\nSimple CRUD app."),
            documents: vec![
                GeneratedDocument {
                    format: DocumentFormat::Pdf,
                    bytes: b"%PDF-1.3 test".to_vec(),
                },
                GeneratedDocument {
                    format: DocumentFormat::Docx,
                    bytes: b"PK\x03\x04 test".to_vec(),
                },
            ],
            stats: PipelineStats {
                total_files: 2,
                code_files: 0,
                fetched_files: 2,
                skipped_files: 0,
                skipped_directories: 0,
                selected_files: 2,
                prompt: PromptStats::default(),
                main_language: "Unknown".to_string(),
                documents: 2,
                fetch_duration: Duration::ZERO,
                analysis_duration: Duration::ZERO,
                render_duration: Duration::ZERO,
                duration: Duration::ZERO,
            },
        }
    }

    fn writer(output_dir: &Path) -> Writer {
        Writer::new(&Config::builder().output_dir(output_dir).build().unwrap())
    }

    #[test]
    fn test_writer_creates_output_directory_and_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output_dir = temp.child("docs");

        let written = writer(output_dir.path()).write(&output(None)).unwrap();

        assert_eq!(written.len(), 2);
        let pdf = output_dir.child("widget_architecture.pdf");
        assert_eq!(fs::read(pdf.path()).unwrap(), b"%PDF-1.3 test");
        assert!(output_dir.child("widget_architecture.docx").exists());
    }

    #[test]
    fn test_writer_leaves_no_temp_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        writer(temp.path()).write(&output(None)).unwrap();

        let names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
    }

    #[test]
    fn test_writer_creates_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        let existing = temp.child("widget_architecture.pdf");
        existing.write_str("old content").unwrap();

        writer(temp.path()).write(&output(None)).unwrap();

        let backups: Vec<PathBuf> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().contains(".backup."))
            .collect();

        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "old content");
        assert_eq!(fs::read(existing.path()).unwrap(), b"%PDF-1.3 test");
    }

    #[test]
    fn test_writer_without_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("widget_architecture.pdf").write_str("old").unwrap();

        let config = Config::builder()
            .output_dir(temp.path())
            .backup_existing(false)
            .build()
            .unwrap();
        Writer::new(&config).write(&output(None)).unwrap();

        let count = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_writer_saves_diagram() {
        let temp = assert_fs::TempDir::new().unwrap();
        let diagram = temp.child("out/diagram.mmd");

        let config = Config::builder()
            .output_dir(temp.path())
            .diagram_out(diagram.path())
            .build()
            .unwrap();
        let written = Writer::new(&config)
            .write(&output(Some("graph TD\n  A-->B")))
            .unwrap();

        assert_eq!(written.len(), 3);
        assert_eq!(fs::read_to_string(diagram.path()).unwrap(), "graph TD\n  A-->B");
    }

    #[test]
    fn test_writer_skips_missing_diagram() {
        let temp = assert_fs::TempDir::new().unwrap();
        let diagram = temp.child("diagram.mmd");

        let config = Config::builder()
            .output_dir(temp.path())
            .diagram_out(diagram.path())
            .build()
            .unwrap();
        let written = Writer::new(&config).write(&output(None)).unwrap();

        assert_eq!(written.len(), 2);
        assert!(!diagram.exists());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("widget"), "widget");
        assert_eq!(sanitize_filename("my.repo-name_2"), "my.repo-name_2");
        assert_eq!(sanitize_filename("we ird/na:me"), "we_ird_na_me");
        assert_eq!(sanitize_filename(".."), "repository");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), MAX_FILE_STEM);
    }
}
