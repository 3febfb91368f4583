//! File selection for analysis.
//!
//! Decides which repository files are worth sending to the model, assigns
//! each a [`FileCategory`] and orders the survivors so manifests and
//! documentation come first.

use crate::config::DEFAULT_MAX_SELECTED_FILES;
use crate::error::{Error, Result};
use crate::file::{self, FileCategory, FileEntry};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Directories that never matter for architecture.
const EXCLUDED_DIRECTORIES: &[&str] = &[
    "test",
    "tests",
    "__tests__",
    "spec",
    "specs",
    "__pycache__",
    "node_modules",
    ".git",
    ".github",
    "dist",
    "build",
    "target",
    "coverage",
    ".pytest_cache",
    ".tox",
    "venv",
    "env",
    ".venv",
    "logs",
    "tmp",
    "temp",
    ".vscode",
    ".idea",
    "vendor",
    "public/assets",
    "static/assets",
    "assets/images",
];

/// File name patterns that never matter for architecture.
const EXCLUDED_FILES: &[&str] = &[
    "*.min.js",
    "*.min.css",
    "*.map",
    "*.lock",
    "*.test.*",
    "*.spec.*",
    "*_test.go",
    "test_*.py",
    ".DS_Store",
    // secrets
    ".env",
    ".env.*",
    "*.env",
];

static CONFIG_FILES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "package.json",
        "requirements.txt",
        "cargo.toml",
        "pom.xml",
        "build.gradle",
        "build.gradle.kts",
        "settings.gradle",
        "gemfile",
        "composer.json",
        "setup.py",
        "setup.cfg",
        "pyproject.toml",
        "pipfile",
        "go.mod",
        "dockerfile",
        "makefile",
        "cmakelists.txt",
        "docker-compose.yml",
        "docker-compose.yaml",
        "tsconfig.json",
        "mix.exs",
        "pubspec.yaml",
    ]
    .into_iter()
    .collect()
});

static README_FILES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "architecture.md",
        "design.md",
        "contributing.md",
        "changelog.md",
        "license",
        "license.md",
        "license.txt",
    ]
    .into_iter()
    .collect()
});

/// User-supplied exclusions layered on top of the built-in rules.
///
/// Patterns are globs matched case-insensitively against repository-relative
/// paths; bare file names (no `/`) match at any depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilterConfig {
    exclude_files: Vec<String>,
    exclude_directories: Vec<String>,
    max_selected_files: usize,
}

impl Default for FileFilterConfig {
    fn default() -> Self {
        Self {
            exclude_files: Vec::new(),
            exclude_directories: Vec::new(),
            max_selected_files: DEFAULT_MAX_SELECTED_FILES,
        }
    }
}

impl FileFilterConfig {
    /// Creates a configuration with only the built-in rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds file globs to exclude.
    #[must_use]
    pub fn exclude_files(mut self, patterns: Vec<String>) -> Self {
        self.exclude_files = patterns;
        self
    }

    /// Adds directory globs to exclude.
    #[must_use]
    pub fn exclude_directories(mut self, patterns: Vec<String>) -> Self {
        self.exclude_directories = patterns;
        self
    }

    /// Caps the number of files [`FileFilter::apply`] returns.
    #[must_use]
    pub const fn max_selected_files(mut self, count: usize) -> Self {
        self.max_selected_files = count;
        self
    }
}

/// Compiled file filter.
#[derive(Debug, Clone)]
pub struct FileFilter {
    exclude_files: GlobSet,
    exclude_directories: GlobSet,
    max_selected_files: usize,
}

impl FileFilter {
    /// Compiles the built-in rules plus the configured extras.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a user glob is invalid.
    pub fn new(config: FileFilterConfig) -> Result<Self> {
        let file_patterns = EXCLUDED_FILES
            .iter()
            .map(|p| (*p).to_string())
            .chain(config.exclude_files.iter().cloned())
            .map(|p| if p.contains('/') { p } else { format!("**/{p}") });

        let dir_patterns = EXCLUDED_DIRECTORIES
            .iter()
            .map(|p| (*p).to_string())
            .chain(config.exclude_directories.iter().cloned())
            .map(|p| format!("**/{}/**", p.trim_matches('/')));

        Ok(Self {
            exclude_files: Self::build_globset(file_patterns)?,
            exclude_directories: Self::build_globset(dir_patterns)?,
            max_selected_files: config.max_selected_files,
        })
    }

    fn build_globset(patterns: impl IntoIterator<Item = String>) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = GlobBuilder::new(&pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| Error::config(format!("Invalid glob pattern '{pattern}': {e}")))?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {e}")))
    }

    /// Returns true if the path lies in an excluded directory.
    ///
    /// Used by the fetcher to skip whole subtrees before listing them.
    #[must_use]
    pub fn is_excluded_dir(&self, dir: &str) -> bool {
        let probe = format!("{}/_", dir.trim_end_matches('/'));
        self.exclude_directories.is_match(&probe)
    }

    /// Returns true if the path matches an exclusion rule or is not text.
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        if self.exclude_directories.is_match(path) || self.exclude_files.is_match(path) {
            return true;
        }

        file::has_binary_extension(path) || !file::has_text_extension(path)
    }

    /// Assigns a category to one file.
    #[must_use]
    pub fn categorize(&self, path: &str, content: &str) -> FileCategory {
        if self.is_excluded(path) || file::is_binary_content(content.as_bytes()) {
            return FileCategory::Excluded;
        }

        let name = file::file_name(path).to_ascii_lowercase();
        if CONFIG_FILES.contains(name.as_str()) {
            FileCategory::Config
        } else if name.starts_with("readme") || README_FILES.contains(name.as_str()) {
            FileCategory::Readme
        } else {
            FileCategory::Source
        }
    }

    /// Categorises, drops excluded files, orders by priority then size, and
    /// truncates to the configured cap.
    #[must_use]
    pub fn apply(&self, files: Vec<FileEntry>) -> Vec<FileEntry> {
        let total = files.len();

        let mut selected: Vec<FileEntry> = files
            .into_iter()
            .filter_map(|mut entry| {
                entry.category = self.categorize(&entry.path, &entry.content);
                if entry.category == FileCategory::Excluded {
                    tracing::trace!(path = %entry.path, "excluded");
                    None
                } else {
                    Some(entry)
                }
            })
            .collect();

        selected.sort_by_key(|entry| (entry.category.priority(), entry.size));
        selected.truncate(self.max_selected_files);

        tracing::debug!(
            total,
            selected = selected.len(),
            "File filter applied"
        );

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> FileFilter {
        FileFilter::new(FileFilterConfig::default()).unwrap()
    }

    fn entry(path: &str, size: u64) -> FileEntry {
        FileEntry::new(path, "content", size)
    }

    #[test]
    fn test_excluded_directories() {
        let f = filter();
        assert!(f.is_excluded("tests/unit.py"));
        assert!(f.is_excluded("src/test/helper.js"));
        assert!(f.is_excluded("web/node_modules/lib/index.js"));
        assert!(f.is_excluded("Build/output.js"));
        assert!(f.is_excluded("public/assets/app.css"));
        assert!(!f.is_excluded("src/testing_utils.py"));
        assert!(!f.is_excluded("src/latest.js"));
    }

    #[test]
    fn test_excluded_files() {
        let f = filter();
        assert!(f.is_excluded("static/app.min.js"));
        assert!(f.is_excluded("bundle.js.map"));
        assert!(f.is_excluded("Cargo.lock"));
        assert!(f.is_excluded("src/button.test.tsx"));
        assert!(f.is_excluded("pkg/server_test.go"));
        assert!(f.is_excluded("app/test_models.py"));
        assert!(f.is_excluded(".DS_Store"));
        assert!(!f.is_excluded("src/app.js"));
    }

    #[test]
    fn test_env_files_excluded() {
        let f = filter();
        assert!(f.is_excluded(".env"));
        assert!(f.is_excluded(".env.local"));
        assert!(f.is_excluded("deploy/.env.production"));
        assert!(f.is_excluded("config/prod.env"));
        assert!(!f.is_excluded("src/env.rs"));
        assert!(!f.is_excluded("src/environment.py"));

        let files = vec![entry("config/prod.env", 10), entry(".env", 5), entry("src/main.rs", 20)];
        let selected: Vec<String> = f.apply(files).into_iter().map(|e| e.path).collect();
        assert_eq!(selected, vec!["src/main.rs".to_string()]);
    }

    #[test]
    fn test_non_text_files_excluded() {
        let f = filter();
        assert!(f.is_excluded("logo.png"));
        assert!(f.is_excluded("docs/manual.pdf"));
        assert!(f.is_excluded("data.weird"));
        assert!(!f.is_excluded("Dockerfile"));
    }

    #[test]
    fn test_is_excluded_dir() {
        let f = filter();
        assert!(f.is_excluded_dir("node_modules"));
        assert!(f.is_excluded_dir("packages/web/dist"));
        assert!(f.is_excluded_dir("static/assets"));
        assert!(!f.is_excluded_dir("src"));
        assert!(!f.is_excluded_dir("contest"));
    }

    #[test]
    fn test_categorize() {
        let f = filter();
        assert_eq!(f.categorize("package.json", "{}"), FileCategory::Config);
        assert_eq!(f.categorize("backend/Cargo.toml", ""), FileCategory::Config);
        assert_eq!(f.categorize("README.md", "# hi"), FileCategory::Readme);
        assert_eq!(f.categorize("docs/ARCHITECTURE.md", ""), FileCategory::Readme);
        assert_eq!(f.categorize("LICENSE", "MIT"), FileCategory::Readme);
        assert_eq!(f.categorize("src/main.rs", "fn main() {}"), FileCategory::Source);
        assert_eq!(f.categorize("tests/a.rs", ""), FileCategory::Excluded);
        assert_eq!(f.categorize("src/blob.txt", "a\0b"), FileCategory::Excluded);
    }

    #[test]
    fn test_apply_never_emits_excluded() {
        let files = vec![
            entry("src/app.js", 10),
            entry("test/app.test.js", 5),
            entry("dist/app.min.js", 5),
            entry("logo.png", 5),
            entry("src/test/fixture.js", 5),
        ];

        let selected = filter().apply(files);
        let paths: Vec<&str> = selected.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.js"]);
    }

    #[test]
    fn test_apply_manifests_first() {
        let files = vec![
            entry("src/a.js", 1),
            entry("src/b.js", 2),
            entry("package.json", 9_000),
            entry("README.md", 5_000),
        ];

        let selected = filter().apply(files);
        let package_pos = selected
            .iter()
            .position(|e| e.path == "package.json")
            .unwrap();
        for (i, e) in selected.iter().enumerate() {
            if e.category == FileCategory::Source {
                assert!(package_pos < i, "package.json must precede {}", e.path);
            }
        }
        assert_eq!(selected[0].path, "README.md");
    }

    #[test]
    fn test_apply_sorts_by_size_within_tier() {
        let files = vec![
            entry("src/big.rs", 300),
            entry("src/small.rs", 10),
            entry("src/mid.rs", 100),
        ];

        let selected = filter().apply(files);
        let paths: Vec<&str> = selected.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src/small.rs", "src/mid.rs", "src/big.rs"]);
    }

    #[test]
    fn test_apply_caps_selection() {
        let files: Vec<FileEntry> = (0..40).map(|i| entry(&format!("src/f{i}.rs"), i)).collect();
        let selected = filter().apply(files);
        assert_eq!(selected.len(), DEFAULT_MAX_SELECTED_FILES);

        let small = FileFilter::new(FileFilterConfig::new().max_selected_files(3)).unwrap();
        let files: Vec<FileEntry> = (0..10).map(|i| entry(&format!("src/f{i}.rs"), i)).collect();
        assert_eq!(small.apply(files).len(), 3);
    }

    #[test]
    fn test_apply_empty() {
        assert!(filter().apply(Vec::new()).is_empty());
    }

    #[test]
    fn test_user_exclusions() {
        let config = FileFilterConfig::new()
            .exclude_files(vec!["*.generated.ts".to_string()])
            .exclude_directories(vec!["migrations".to_string()]);
        let f = FileFilter::new(config).unwrap();

        assert!(f.is_excluded("src/api.generated.ts"));
        assert!(f.is_excluded("db/migrations/001.sql"));
        assert!(!f.is_excluded("src/api.ts"));
    }

    #[test]
    fn test_invalid_user_glob() {
        let config = FileFilterConfig::new().exclude_files(vec!["a[".to_string()]);
        assert!(FileFilter::new(config).unwrap_err().is_config());
    }
}
