//! Splits the model's markdown into titled sections and flattens section
//! bodies into blocks the encoders can lay out.

use crate::analysis::is_bare_diagram;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag};
use regex::Regex;
use std::ops::Range;

/// Title used when the narrative has no headings.
pub const FALLBACK_TITLE: &str = "Analysis";

static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+(?:[.)]|(?:\.\d+)+[.)]?)(?:\s+|$)").expect("static regex is valid"));
static UPPER_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9_ \-/&]+$").expect("static regex is valid"));
static EXTRA_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("static regex is valid"));

/// A titled part of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Display title
    pub title: String,
    /// Markdown body with diagram blocks removed
    pub body: String,
    /// Diagram sources found in the body, in order
    pub diagrams: Vec<String>,
    /// False when the narrative had no headings to split on
    pub formatted: bool,
}

impl Section {
    /// Creates a formatted section.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            diagrams: Vec::new(),
            formatted: true,
        }
    }
}

/// Narrative split into an optional preface and sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrative {
    /// Text before the first heading
    pub preface: Option<String>,
    /// Sections in document order
    pub sections: Vec<Section>,
}

/// Splits a narrative into sections.
///
/// # Errors
///
/// Returns a render error for an empty or whitespace-only narrative.
pub fn split_sections(narrative: &str) -> Result<Vec<Section>> {
    split_narrative(narrative).map(|n| n.sections)
}

/// Splits a narrative into a preface and sections.
///
/// Headings of level 1 to 3 start a section; deeper headings stay in the
/// body. Without any such heading the whole text becomes one unformatted
/// section titled [`FALLBACK_TITLE`].
///
/// # Errors
///
/// Returns a render error for an empty or whitespace-only narrative.
pub fn split_narrative(narrative: &str) -> Result<Narrative> {
    if narrative.trim().is_empty() {
        return Err(Error::render("document", "analysis text is empty"));
    }

    let headings = section_headings(narrative);

    let Some(first) = headings.first() else {
        let (body, diagrams) = take_diagrams(narrative);
        return Ok(Narrative {
            preface: None,
            sections: vec![Section {
                title: FALLBACK_TITLE.to_string(),
                body,
                diagrams,
                formatted: false,
            }],
        });
    };

    // Diagrams ahead of the first heading belong to the first section.
    let (preface, mut leading_diagrams) = take_diagrams(&narrative[..first.span.start]);
    let preface = non_empty(&preface);

    let mut sections: Vec<Section> = headings
        .iter()
        .enumerate()
        .map(|(i, heading)| {
            let end = headings
                .get(i + 1)
                .map_or(narrative.len(), |next| next.span.start);
            let (body, diagrams) = take_diagrams(&narrative[heading.span.end..end]);
            let title = normalize_title(&heading.text);

            Section {
                title: if title.is_empty() {
                    format!("Section {}", i + 1)
                } else {
                    title
                },
                body,
                diagrams,
                formatted: true,
            }
        })
        .collect();

    if let Some(first) = sections.first_mut() {
        leading_diagrams.append(&mut first.diagrams);
        first.diagrams = leading_diagrams;
    }

    Ok(Narrative { preface, sections })
}

struct Heading {
    text: String,
    span: Range<usize>,
}

fn section_headings(narrative: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut current: Option<Heading> = None;

    for (event, range) in Parser::new(narrative).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading(level, ..)) if level <= HeadingLevel::H3 => {
                current = Some(Heading {
                    text: String::new(),
                    span: range,
                });
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(ref mut heading) = current {
                    heading.text.push_str(&text);
                }
            }
            Event::End(Tag::Heading(..)) => {
                if let Some(heading) = current.take() {
                    headings.push(heading);
                }
            }
            _ => {}
        }
    }

    headings
}

/// Strips a leading `1.` / `2)` / `3.1` number and turns all-caps titles
/// such as `DATA_FLOW` into `Data Flow`.
#[must_use]
pub fn normalize_title(raw: &str) -> String {
    let title = LEADING_NUMBER.replace(raw.trim(), "");
    let title = title.trim().trim_end_matches(':').trim();

    let has_letters = title.chars().any(char::is_alphabetic);
    if has_letters && UPPER_TITLE.is_match(title) {
        title
            .split(|c: char| c == '_' || c.is_whitespace())
            .filter(|w| !w.is_empty())
            .map(title_case)
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        title.to_string()
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

/// Moves diagram fences out of a section body.
fn take_diagrams(body: &str) -> (String, Vec<String>) {
    let mut diagrams = Vec::new();
    let mut cuts: Vec<Range<usize>> = Vec::new();
    let mut current: Option<(Range<usize>, bool, String)> = None;

    for (event, range) in Parser::new(body).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let language = info.split_whitespace().next().unwrap_or("");
                let tagged = language.eq_ignore_ascii_case("mermaid");
                if tagged || language.is_empty() {
                    current = Some((range, tagged, String::new()));
                }
            }
            Event::Text(text) => {
                if let Some((_, _, ref mut source)) = current {
                    source.push_str(&text);
                }
            }
            Event::End(Tag::CodeBlock(_)) => {
                if let Some((span, tagged, source)) = current.take() {
                    if tagged || is_bare_diagram(&source) {
                        if !source.trim().is_empty() {
                            diagrams.push(source.trim_end().to_string());
                        }
                        cuts.push(span);
                    }
                }
            }
            _ => {}
        }
    }

    if cuts.is_empty() {
        return (body.trim().to_string(), diagrams);
    }

    let mut remaining = String::with_capacity(body.len());
    let mut last = 0;
    for span in cuts {
        remaining.push_str(&body[last..span.start]);
        last = span.end;
    }
    remaining.push_str(&body[last..]);

    let remaining = EXTRA_BLANK_LINES.replace_all(&remaining, "\n\n");
    (remaining.trim().to_string(), diagrams)
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// A layout unit of a section body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Sub-heading inside a section
    Heading(String),
    /// Running text
    Paragraph(String),
    /// List entry, `depth` starts at 1
    ListItem {
        /// Nesting depth
        depth: usize,
        /// Item text
        text: String,
    },
    /// Preformatted text
    Code(String),
}

/// Flattens markdown into layout blocks, dropping inline formatting.
#[must_use]
pub fn blocks(markdown: &str) -> Vec<Block> {
    let mut out = Vec::new();
    let mut text = String::new();
    let mut list_depth = 0usize;
    let mut in_code = false;

    let flush_item = |text: &mut String, depth: usize, out: &mut Vec<Block>| {
        let item = text.trim();
        if !item.is_empty() {
            out.push(Block::ListItem {
                depth,
                text: item.to_string(),
            });
        }
        text.clear();
    };

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::List(_)) => {
                if list_depth > 0 {
                    flush_item(&mut text, list_depth, &mut out);
                }
                list_depth += 1;
            }
            Event::End(Tag::List(_)) => list_depth = list_depth.saturating_sub(1),
            Event::Start(Tag::Item) => text.clear(),
            Event::End(Tag::Item) => flush_item(&mut text, list_depth, &mut out),
            Event::Start(Tag::CodeBlock(_)) => {
                in_code = true;
                text.clear();
            }
            Event::End(Tag::CodeBlock(_)) => {
                in_code = false;
                let code = text.trim_end_matches('\n');
                if !code.trim().is_empty() {
                    out.push(Block::Code(code.to_string()));
                }
                text.clear();
            }
            Event::End(Tag::Heading(..)) => {
                let heading = text.trim();
                if !heading.is_empty() {
                    out.push(Block::Heading(heading.to_string()));
                }
                text.clear();
            }
            Event::End(Tag::Paragraph) => {
                if list_depth > 0 {
                    text.push(' ');
                } else {
                    let paragraph = text.trim();
                    if !paragraph.is_empty() {
                        out.push(Block::Paragraph(paragraph.to_string()));
                    }
                    text.clear();
                }
            }
            Event::Text(t) | Event::Code(t) | Event::Html(t) => text.push_str(&t),
            Event::SoftBreak => text.push(if in_code { '\n' } else { ' ' }),
            Event::HardBreak => text.push('\n'),
            _ => {}
        }
    }

    let rest = text.trim();
    if !rest.is_empty() {
        out.push(Block::Paragraph(rest.to_string()));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_headers_three_sections() {
        let text = "# One\nfirst\n\n## Two\nsecond\n\n### Three\nthird\n";
        let sections = split_sections(text).unwrap();

        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
        assert_eq!(sections[1].body, "second");
        assert!(sections.iter().all(|s| s.formatted));
    }

    #[test]
    fn test_no_header_single_unformatted_section() {
        let text = "Just a blob of analysis.\n\nWith two paragraphs.";
        let sections = split_sections(text).unwrap();

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, FALLBACK_TITLE);
        assert!(!sections[0].formatted);
        assert_eq!(sections[0].body, text);
    }

    #[test]
    fn test_single_section_body() {
        let sections = split_sections("## Architecture\nSimple CRUD app.").unwrap();
        assert_eq!(sections, vec![Section::new("Architecture", "Simple CRUD app.")]);
    }

    #[test]
    fn test_empty_narrative_is_error() {
        assert!(split_sections("").is_err());
        assert!(split_sections("  \n\t").is_err());
    }

    #[test]
    fn test_preface_is_not_a_section() {
        let narrative = split_narrative("Intro text.\n\n## Overview\nBody").unwrap();
        assert_eq!(narrative.preface.as_deref(), Some("Intro text."));
        assert_eq!(narrative.sections.len(), 1);
    }

    #[test]
    fn test_deep_headings_stay_in_body() {
        let sections = split_sections("## Modules\n#### Parser\nParses things.").unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections[0].body.contains("#### Parser"));
    }

    #[test]
    fn test_setext_heading() {
        let sections = split_sections("Overview\n========\n\nText here.").unwrap();
        assert_eq!(sections[0].title, "Overview");
        assert_eq!(sections[0].body, "Text here.");
    }

    #[test]
    fn test_diagrams_move_out_of_body() {
        let text = "### 6. MERMAID_ARCHITECTURE_DIAGRAM\nComponents:\n\n```mermaid\ngraph TD\n  A-->B\n```\n\nDone.";
        let sections = split_sections(text).unwrap();

        assert_eq!(sections[0].title, "Mermaid Architecture Diagram");
        assert_eq!(sections[0].diagrams, vec!["graph TD\n  A-->B".to_string()]);
        assert_eq!(sections[0].body, "Components:\n\nDone.");
    }

    #[test]
    fn test_unformatted_section_keeps_its_diagram() {
        let text = "Plain analysis text.\n\n```mermaid\ngraph TD\n  A-->B\n```";
        let sections = split_sections(text).unwrap();

        assert_eq!(sections.len(), 1);
        assert!(!sections[0].formatted);
        assert_eq!(sections[0].body, "Plain analysis text.");
        assert_eq!(sections[0].diagrams, vec!["graph TD\n  A-->B".to_string()]);
    }

    #[test]
    fn test_preface_diagram_goes_to_first_section() {
        let text = "```mermaid\ngraph LR\n  X-->Y\n```\n\nIntro.\n\n# One\na\n\n# Two\nb\n\n# Three\nc";
        let narrative = split_narrative(text).unwrap();

        let titles: Vec<&str> = narrative.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
        assert_eq!(narrative.preface.as_deref(), Some("Intro."));
        assert_eq!(narrative.sections[0].diagrams, vec!["graph LR\n  X-->Y".to_string()]);
    }

    #[test]
    fn test_other_code_blocks_stay() {
        let text = "## Setup\n```bash\ncargo run\n```";
        let sections = split_sections(text).unwrap();
        assert!(sections[0].diagrams.is_empty());
        assert!(sections[0].body.contains("cargo run"));
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("1. OVERVIEW"), "Overview");
        assert_eq!(normalize_title("4) DATA_FLOW"), "Data Flow");
        assert_eq!(normalize_title("2.1 Request Handling"), "Request Handling");
        assert_eq!(normalize_title("Design Patterns:"), "Design Patterns");
        assert_eq!(normalize_title("HTTP API"), "Http Api");
        assert_eq!(normalize_title("Component `Fetcher`"), "Component `Fetcher`");
        assert_eq!(normalize_title("2024 roadmap"), "2024 roadmap");
    }

    #[test]
    fn test_empty_title_gets_placeholder() {
        let sections = split_sections("## 1.\nbody").unwrap();
        assert_eq!(sections[0].title, "Section 1");
    }

    #[test]
    fn test_blocks() {
        let md = "Intro with **bold** and `code`.\n\n#### Detail\n\n- one\n- two\n  - nested\n\n```\nlet x = 1;\nlet y = 2;\n```\n";
        let blocks = blocks(md);

        assert_eq!(
            blocks,
            vec![
                Block::Paragraph("Intro with bold and code.".to_string()),
                Block::Heading("Detail".to_string()),
                Block::ListItem {
                    depth: 1,
                    text: "one".to_string()
                },
                Block::ListItem {
                    depth: 1,
                    text: "two".to_string()
                },
                Block::ListItem {
                    depth: 2,
                    text: "nested".to_string()
                },
                Block::Code("let x = 1;\nlet y = 2;".to_string()),
            ]
        );
    }
}
