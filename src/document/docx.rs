//! DOCX encoder.

use super::sections::{Block, blocks};
use super::{DIAGRAM_LABEL, DocumentModel};
use crate::error::{Error, Result};
use docx_rs::{
    AlignmentType, BreakType, Docx, Paragraph, Run, RunFonts, Style, StyleType, Table, TableCell,
    TableRow,
};
use std::io::Cursor;

const TITLE_STYLE: &str = "Title";
const HEADING1_STYLE: &str = "Heading1";
const HEADING2_STYLE: &str = "Heading2";
const HEADING3_STYLE: &str = "Heading3";
const DIAGRAM_STYLE: &str = "DiagramSource";

const MONOSPACE: &str = "Courier New";
const CODE_SIZE: usize = 18;

pub(super) fn render(model: &DocumentModel) -> Result<Vec<u8>> {
    let mut docx = with_styles(Docx::new());

    docx = docx.add_paragraph(
        Paragraph::new()
            .add_run(Run::new().add_text(&model.title))
            .style(TITLE_STYLE)
            .align(AlignmentType::Center),
    );

    docx = docx
        .add_paragraph(labelled("Repository", &model.repository))
        .add_paragraph(labelled("Main Language", &model.language));
    if let Some(description) = &model.description {
        docx = docx.add_paragraph(labelled("Description", description));
    }
    docx = docx.add_paragraph(labelled("Generated on", &model.generated_on));

    docx = docx
        .add_paragraph(heading(HEADING1_STYLE, "Repository Statistics"))
        .add_table(statistics_table(&model.statistics));

    if let Some(preface) = &model.preface {
        docx = add_markdown(docx, preface);
    }

    for section in &model.sections {
        docx = docx.add_paragraph(heading(HEADING1_STYLE, &section.title));
        docx = if section.formatted {
            add_markdown(docx, &section.body)
        } else {
            section
                .body
                .split("\n\n")
                .filter(|p| !p.trim().is_empty())
                .fold(docx, |docx, p| docx.add_paragraph(plain(p.trim())))
        };

        for diagram in &section.diagrams {
            docx = docx
                .add_paragraph(Paragraph::new().add_run(Run::new().add_text(DIAGRAM_LABEL).bold()))
                .add_paragraph(monospace(diagram).style(DIAGRAM_STYLE));
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|e| Error::render("docx", e.to_string()))?;

    Ok(buffer.into_inner())
}

fn with_styles(docx: Docx) -> Docx {
    docx.add_style(
        Style::new(TITLE_STYLE, StyleType::Paragraph)
            .name("Title")
            .size(48)
            .bold()
            .color("2E8B57"),
    )
    .add_style(
        Style::new(HEADING1_STYLE, StyleType::Paragraph)
            .name("Heading 1")
            .size(32)
            .bold()
            .color("2E8B57"),
    )
    .add_style(
        Style::new(HEADING2_STYLE, StyleType::Paragraph)
            .name("Heading 2")
            .size(26)
            .bold()
            .color("4682B4"),
    )
    .add_style(
        Style::new(HEADING3_STYLE, StyleType::Paragraph)
            .name("Heading 3")
            .size(24)
            .bold(),
    )
    .add_style(
        Style::new(DIAGRAM_STYLE, StyleType::Paragraph)
            .name("Diagram Source")
            .size(CODE_SIZE)
            .color("333333"),
    )
}

fn heading(style: &str, text: &str) -> Paragraph {
    Paragraph::new()
        .add_run(Run::new().add_text(text))
        .style(style)
}

fn plain(text: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text))
}

fn labelled(label: &str, value: &str) -> Paragraph {
    Paragraph::new()
        .add_run(Run::new().add_text(format!("{label}: ")).bold())
        .add_run(Run::new().add_text(value))
}

/// One run per line, joined with line breaks.
fn monospace(text: &str) -> Paragraph {
    let fonts = || RunFonts::new().ascii(MONOSPACE).hi_ansi(MONOSPACE);
    text.lines()
        .enumerate()
        .fold(Paragraph::new(), |paragraph, (i, line)| {
            let mut run = Run::new().fonts(fonts()).size(CODE_SIZE);
            if i > 0 {
                run = run.add_break(BreakType::TextWrapping);
            }
            paragraph.add_run(run.add_text(line))
        })
}

fn statistics_table(rows: &[(String, String)]) -> Table {
    let cell = |text: &str, bold: bool| {
        let run = Run::new().add_text(text);
        TableCell::new().add_paragraph(Paragraph::new().add_run(if bold { run.bold() } else { run }))
    };

    let header = TableRow::new(vec![cell("Metric", true), cell("Value", true)]);
    let body = rows
        .iter()
        .map(|(metric, value)| TableRow::new(vec![cell(metric, false), cell(value, false)]));

    Table::new(std::iter::once(header).chain(body).collect())
}

fn add_markdown(docx: Docx, markdown: &str) -> Docx {
    blocks(markdown)
        .into_iter()
        .fold(docx, |docx, block| match block {
            Block::Heading(text) => docx.add_paragraph(heading(HEADING2_STYLE, &text)),
            Block::Paragraph(text) => docx.add_paragraph(plain(&text)),
            Block::ListItem { depth, text } => {
                let prefix = "    ".repeat(depth.saturating_sub(1));
                docx.add_paragraph(plain(&format!("{prefix}\u{2022} {text}")))
            }
            Block::Code(code) => docx.add_paragraph(monospace(&code)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::model;
    use docx_rs::DocumentChild;

    /// `(style, text)` of every top-level paragraph, read back from the package.
    fn paragraphs(bytes: &[u8]) -> Vec<(String, String)> {
        let docx = docx_rs::read_docx(bytes).unwrap();
        docx.document
            .children
            .iter()
            .filter_map(|child| match child {
                DocumentChild::Paragraph(p) => Some((
                    p.property.style.as_ref().map(|s| s.val.clone()).unwrap_or_default(),
                    p.raw_text(),
                )),
                _ => None,
            })
            .collect()
    }

    fn headings(bytes: &[u8]) -> Vec<(String, String)> {
        paragraphs(bytes)
            .into_iter()
            .filter(|(style, _)| style.starts_with("Heading"))
            .collect()
    }

    #[test]
    fn test_docx_is_zip() {
        let bytes = render(&model("## Architecture\nSimple CRUD app.")).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_docx_with_diagram_and_lists() {
        let narrative = "Intro.\n\n## Components\n- api\n  - handlers\n\n```mermaid\ngraph TD\n  A-->B\n```\n\n#### Notes\n```\ncode\n```";
        let bytes = render(&model(narrative)).unwrap();
        assert!(bytes.starts_with(b"PK"));
        assert!(bytes.len() > 1000);
    }

    #[test]
    fn test_unformatted_narrative() {
        let bytes = render(&model("No headings here.\n\nSecond paragraph.")).unwrap();
        assert!(bytes.starts_with(b"PK"));

        let texts: Vec<String> = paragraphs(&bytes).into_iter().map(|(_, t)| t).collect();
        let at = texts.iter().position(|t| t == "Analysis").unwrap();
        assert_eq!(texts[at + 1..], ["No headings here.", "Second paragraph."]);
    }

    #[test]
    fn test_headings_in_order() {
        let narrative = "Intro.\n\n# One\na\n\n## Two\nb\n\n### Three\nc\n\n#### Deep\nd";
        let bytes = render(&model(narrative)).unwrap();

        let expected = [
            (HEADING1_STYLE, "Repository Statistics"),
            (HEADING1_STYLE, "One"),
            (HEADING1_STYLE, "Two"),
            (HEADING1_STYLE, "Three"),
            (HEADING2_STYLE, "Deep"),
        ]
        .map(|(s, t)| (s.to_string(), t.to_string()));
        assert_eq!(headings(&bytes), expected);
    }

    #[test]
    fn test_single_section_with_diagram() {
        let bytes = render(&model("Plain text.\n\n```mermaid\ngraph TD\n  A-->B\n```")).unwrap();

        assert_eq!(
            headings(&bytes),
            [
                (HEADING1_STYLE.to_string(), "Repository Statistics".to_string()),
                (HEADING1_STYLE.to_string(), "Analysis".to_string()),
            ]
        );
        let diagrams: Vec<(String, String)> = paragraphs(&bytes)
            .into_iter()
            .filter(|(style, _)| style == DIAGRAM_STYLE)
            .collect();
        assert_eq!(diagrams.len(), 1);
        let lines: Vec<&str> = diagrams[0].1.lines().map(str::trim).collect();
        assert_eq!(lines, ["graph TD", "A-->B"]);
    }
}
