use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

static BINARY_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exe", "dll", "so", "dylib", "a", "o", "obj", "png", "jpg", "jpeg", "gif", "bmp", "ico",
        "webp", "svg", "mp3", "mp4", "avi", "mkv", "mov", "wav", "flac", "pdf", "doc", "docx",
        "xls", "xlsx", "ppt", "pptx", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "wasm", "pyc",
        "class", "jar", "dmg", "app", "deb", "rpm", "msi", "woff", "woff2", "ttf", "otf", "eot",
    ]
    .into_iter()
    .collect()
});

/// Extensions counted as code files in repository statistics.
static CODE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "py", "js", "ts", "jsx", "tsx", "java", "cpp", "c", "h", "cs", "php", "rb", "go", "rs",
        "swift", "kt", "scala", "html", "css", "scss", "sass", "less", "vue", "svelte", "json",
        "xml", "yaml", "yml", "toml", "ini", "cfg", "md", "txt", "dockerfile", "makefile",
        "gradle", "properties",
    ]
    .into_iter()
    .collect()
});

static TEXT_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let mut set: HashSet<&'static str> = CODE_EXTENSIONS.iter().copied().collect();
    set.extend([
        "hpp", "cc", "hh", "m", "mm", "sh", "bash", "zsh", "fish", "ps1", "bat", "lua", "vim",
        "pl", "pm", "r", "jl", "ex", "exs", "erl", "hrl", "clj", "cljs", "hs", "ml", "mli", "fs",
        "fsx", "dart", "groovy", "sql", "graphql", "gql", "proto", "thrift", "tf", "hcl", "nix",
        "cmake", "mk", "rst", "adoc", "tex", "conf", "lock", "kts", "mod", "sum",
    ]);
    set
});

/// Extension-less file names that are still text.
static TEXT_FILE_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "dockerfile", "makefile", "gemfile", "pipfile", "rakefile", "procfile", "license", "licence",
        "readme", "changelog", "contributing", "authors", "notice", "vagrantfile", "justfile",
        ".gitignore", ".dockerignore", ".editorconfig",
    ]
    .into_iter()
    .collect()
});

static LANGUAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("py", "Python"),
        ("js", "JavaScript"),
        ("ts", "TypeScript"),
        ("jsx", "React JSX"),
        ("tsx", "React TSX"),
        ("java", "Java"),
        ("cpp", "C++"),
        ("c", "C"),
        ("h", "Header"),
        ("cs", "C#"),
        ("php", "PHP"),
        ("rb", "Ruby"),
        ("go", "Go"),
        ("rs", "Rust"),
        ("swift", "Swift"),
        ("kt", "Kotlin"),
        ("html", "HTML"),
        ("css", "CSS"),
        ("scss", "SCSS"),
        ("json", "JSON"),
        ("md", "Markdown"),
        ("yaml", "YAML"),
        ("yml", "YAML"),
        ("toml", "TOML"),
        ("dockerfile", "Docker"),
        ("makefile", "Makefile"),
    ]
    .into_iter()
    .collect()
});

/// Priority class of a repository file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// Project manifest or build file
    Config,
    /// README and other top-level documentation
    Readme,
    /// Any other text file
    Source,
    /// Dropped by an exclusion rule
    Excluded,
}

impl FileCategory {
    /// Sort tier: lower values are sent to the model first.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Config | Self::Readme => 0,
            Self::Source => 1,
            Self::Excluded => u8::MAX,
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::Readme => "readme",
            Self::Source => "source",
            Self::Excluded => "excluded",
        };
        f.write_str(name)
    }
}

/// A fetched repository file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Repository-relative path with `/` separators
    pub path: String,

    /// UTF-8 file content
    pub content: String,

    /// Size reported by GitHub, in bytes
    pub size: u64,

    /// Category, assigned by the file filter
    pub category: FileCategory,
}

impl FileEntry {
    /// Creates an uncategorised entry (treated as [`FileCategory::Source`]
    /// until the filter runs).
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            size,
            category: FileCategory::Source,
        }
    }

    /// Final path component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }

    /// Lower-cased extension without the dot, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        extension(&self.path)
    }

    /// Language label used in the prompt.
    #[must_use]
    pub fn language(&self) -> &'static str {
        language_for(&self.path)
    }

    /// Number of lines in the content.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// Final component of a `/`-separated path.
#[must_use]
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Lower-cased extension of a `/`-separated path.
///
/// Dotfiles such as `.gitignore` have no extension.
#[must_use]
pub(crate) fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Language label for a path, `"Other"` when unknown.
#[must_use]
pub(crate) fn language_for(path: &str) -> &'static str {
    let key = extension(path).unwrap_or_else(|| file_name(path).to_ascii_lowercase());
    LANGUAGES.get(key.as_str()).copied().unwrap_or("Other")
}

/// Checks if a path counts as a code file for statistics.
#[must_use]
pub(crate) fn is_code_file(path: &str) -> bool {
    extension(path).is_some_and(|ext| CODE_EXTENSIONS.contains(ext.as_str()))
}

/// Checks if a path suggests a text file.
#[must_use]
pub(crate) fn has_text_extension(path: &str) -> bool {
    match extension(path) {
        Some(ext) => TEXT_EXTENSIONS.contains(ext.as_str()),
        None => {
            let name = file_name(path).to_ascii_lowercase();
            TEXT_FILE_NAMES.contains(name.as_str())
        }
    }
}

/// Checks if a path suggests a binary file.
#[must_use]
pub(crate) fn has_binary_extension(path: &str) -> bool {
    extension(path).is_some_and(|ext| BINARY_EXTENSIONS.contains(ext.as_str()))
}

/// Returns true if the bytes look binary (contain a NUL byte).
#[must_use]
pub(crate) fn is_binary_content(bytes: &[u8]) -> bool {
    memchr::memchr(0, bytes).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_entry_defaults() {
        let entry = FileEntry::new("src/main.rs", "fn main() {}\n", 13);

        assert_eq!(entry.category, FileCategory::Source);
        assert_eq!(entry.file_name(), "main.rs");
        assert_eq!(entry.extension().as_deref(), Some("rs"));
        assert_eq!(entry.language(), "Rust");
        assert_eq!(entry.line_count(), 1);
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b/App.TSX").as_deref(), Some("tsx"));
        assert_eq!(extension(".gitignore"), None);
        assert_eq!(extension("Makefile"), None);
        assert_eq!(extension("dir.d/file"), None);
    }

    #[test]
    fn test_language_for() {
        assert_eq!(language_for("app.py"), "Python");
        assert_eq!(language_for("docker/Dockerfile"), "Docker");
        assert_eq!(language_for("data.bin"), "Other");
    }

    #[test]
    fn test_has_text_extension() {
        assert!(has_text_extension("src/lib.rs"));
        assert!(has_text_extension("Cargo.toml"));
        assert!(has_text_extension("README.md"));
        assert!(has_text_extension("Dockerfile"));
        assert!(has_text_extension("LICENSE"));
        assert!(!has_text_extension("binary.exe"));
        assert!(!has_text_extension("no_extension"));
    }

    #[test]
    fn test_has_binary_extension() {
        assert!(has_binary_extension("app.exe"));
        assert!(has_binary_extension("assets/logo.PNG"));
        assert!(has_binary_extension("archive.zip"));
        assert!(!has_binary_extension("code.rs"));
    }

    #[test]
    fn test_is_code_file() {
        assert!(is_code_file("index.js"));
        assert!(is_code_file("config.yml"));
        assert!(!is_code_file("image.png"));
        assert!(!is_code_file("LICENSE"));
    }

    #[test]
    fn test_is_binary_content() {
        assert!(!is_binary_content(b"hello, world"));
        assert!(is_binary_content(&[0x89, b'P', b'N', b'G', 0, 0]));
        assert!(!is_binary_content(b""));
    }

    #[test]
    fn test_category_priority() {
        assert!(FileCategory::Config.priority() < FileCategory::Source.priority());
        assert_eq!(FileCategory::Config.priority(), FileCategory::Readme.priority());
    }
}
