//! PDF encoder using the built-in Type1 fonts.

use super::sections::{Block, blocks};
use super::{DIAGRAM_LABEL, DocumentModel};
use crate::error::Result;
use printpdf::{
    BuiltinFont, Color, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, Point, Pt, Rgb, TextItem,
};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 25.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const MM_PER_PT: f32 = 0.352_778;
const LINE_SPACING: f32 = 1.35;
const LIST_INDENT: f32 = 6.0;
const VALUE_COLUMN: f32 = 70.0;

const TITLE_SIZE: f32 = 24.0;
const HEADING_SIZE: f32 = 16.0;
const SUBHEADING_SIZE: f32 = 12.5;
const BODY_SIZE: f32 = 10.5;
const CODE_SIZE: f32 = 8.5;

const GREEN: (f32, f32, f32) = (0.180, 0.545, 0.341);
const BLUE: (f32, f32, f32) = (0.275, 0.510, 0.706);
const BLACK: (f32, f32, f32) = (0.0, 0.0, 0.0);
const GREY: (f32, f32, f32) = (0.35, 0.35, 0.35);

#[allow(clippy::unnecessary_wraps)]
pub(super) fn render(model: &DocumentModel) -> Result<Vec<u8>> {
    let pages = pages(model);
    let mut document = PdfDocument::new(&model.title);
    let bytes = document
        .with_pages(pages)
        .save(&PdfSaveOptions::default(), &mut Vec::new());

    Ok(bytes)
}

/// Lays the model out into A4 pages.
fn pages(model: &DocumentModel) -> Vec<PdfPage> {
    let mut layout = Layout::new();

    layout.text(&model.title, BuiltinFont::HelveticaBold, TITLE_SIZE, GREEN, 0.0);
    layout.space(4.0);
    layout.text(
        &format!("Repository: {}", model.repository),
        BuiltinFont::Helvetica,
        BODY_SIZE,
        BLACK,
        0.0,
    );
    if let Some(description) = &model.description {
        layout.text(
            &format!("Description: {description}"),
            BuiltinFont::Helvetica,
            BODY_SIZE,
            BLACK,
            0.0,
        );
    }
    layout.text(
        &format!("Main Language: {}", model.language),
        BuiltinFont::Helvetica,
        BODY_SIZE,
        BLACK,
        0.0,
    );
    layout.text(
        &format!("Generated on: {}", model.generated_on),
        BuiltinFont::Helvetica,
        BODY_SIZE,
        GREY,
        0.0,
    );

    layout.space(6.0);
    layout.text("Repository Statistics", BuiltinFont::HelveticaBold, HEADING_SIZE, GREEN, 0.0);
    layout.space(2.0);
    layout.row("Metric", "Value", BuiltinFont::HelveticaBold);
    for (metric, value) in &model.statistics {
        layout.row(metric, value, BuiltinFont::Helvetica);
    }

    if let Some(preface) = &model.preface {
        layout.space(6.0);
        layout.markdown(preface);
    }

    for section in &model.sections {
        layout.space(6.0);
        layout.keep_with_next(HEADING_SIZE * 4.0 * MM_PER_PT);
        layout.text(&section.title, BuiltinFont::HelveticaBold, HEADING_SIZE, GREEN, 0.0);
        layout.space(2.0);
        if section.formatted {
            layout.markdown(&section.body);
        } else {
            for paragraph in section.body.split("\n\n") {
                layout.text(paragraph, BuiltinFont::Helvetica, BODY_SIZE, BLACK, 0.0);
                layout.space(2.0);
            }
        }

        for diagram in &section.diagrams {
            layout.space(3.0);
            layout.keep_with_next(BODY_SIZE * 3.0 * MM_PER_PT);
            layout.text(DIAGRAM_LABEL, BuiltinFont::HelveticaBold, BODY_SIZE, BLUE, 0.0);
            layout.code(diagram);
        }
    }

    layout.finish()
}

/// Top-down page filler; `y` is the baseline in millimetres from the bottom.
struct Layout {
    pages: Vec<PdfPage>,
    ops: Vec<Op>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn finish(mut self) -> Vec<PdfPage> {
        self.break_page();
        self.pages
    }

    fn break_page(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        self.pages
            .push(PdfPage::new(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), ops));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < MARGIN && !self.ops.is_empty() {
            self.break_page();
        }
    }

    fn keep_with_next(&mut self, height: f32) {
        self.ensure(height);
    }

    fn space(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn markdown(&mut self, markdown: &str) {
        for block in blocks(markdown) {
            match block {
                Block::Heading(text) => {
                    self.space(2.0);
                    self.keep_with_next(SUBHEADING_SIZE * 3.0 * MM_PER_PT);
                    self.text(&text, BuiltinFont::HelveticaBold, SUBHEADING_SIZE, BLUE, 0.0);
                    self.space(1.0);
                }
                Block::Paragraph(text) => {
                    self.text(&text, BuiltinFont::Helvetica, BODY_SIZE, BLACK, 0.0);
                    self.space(2.0);
                }
                Block::ListItem { depth, text } => {
                    #[allow(clippy::cast_precision_loss)]
                    let indent = LIST_INDENT * depth as f32;
                    self.text(
                        &format!("- {text}"),
                        BuiltinFont::Helvetica,
                        BODY_SIZE,
                        BLACK,
                        indent,
                    );
                    self.space(0.5);
                }
                Block::Code(code) => {
                    self.code(&code);
                    self.space(2.0);
                }
            }
        }
    }

    fn code(&mut self, code: &str) {
        for line in code.lines() {
            let line = line.replace('\t', "    ");
            self.text(&line, BuiltinFont::Courier, CODE_SIZE, GREY, 4.0);
        }
    }

    /// Writes wrapped text; explicit newlines start new lines.
    fn text(&mut self, text: &str, font: BuiltinFont, size: f32, color: (f32, f32, f32), indent: f32) {
        let width = CONTENT_WIDTH - indent;
        for raw in text.split('\n') {
            let clean = to_win_ansi(raw);
            let lines = wrap(&clean, font, size, width);
            if lines.is_empty() {
                self.space(size * LINE_SPACING * MM_PER_PT);
            }
            for line in lines {
                self.line(&line, font, size, color, MARGIN + indent);
            }
        }
    }

    fn row(&mut self, metric: &str, value: &str, font: BuiltinFont) {
        let height = BODY_SIZE * LINE_SPACING * MM_PER_PT;
        self.ensure(height);
        self.y -= height;
        self.put(&to_win_ansi(metric), font, BODY_SIZE, BLACK, MARGIN);
        self.put(&to_win_ansi(value), font, BODY_SIZE, BLACK, MARGIN + VALUE_COLUMN);
    }

    fn line(&mut self, text: &str, font: BuiltinFont, size: f32, color: (f32, f32, f32), x: f32) {
        let height = size * LINE_SPACING * MM_PER_PT;
        self.ensure(height);
        self.y -= height;
        self.put(text, font, size, color, x);
    }

    fn put(&mut self, text: &str, font: BuiltinFont, size: f32, color: (f32, f32, f32), x: f32) {
        let (r, g, b) = color;
        self.ops.extend([
            Op::StartTextSection,
            Op::SetFillColor {
                col: Color::Rgb(Rgb {
                    r,
                    g,
                    b,
                    icc_profile: None,
                }),
            },
            Op::SetFontSizeBuiltinFont {
                size: Pt(size),
                font,
            },
            Op::SetTextCursor {
                pos: Point {
                    x: Mm(x).into(),
                    y: Mm(self.y).into(),
                },
            },
            Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(text.to_string())],
                font,
            },
            Op::EndTextSection,
        ]);
    }
}

/// Greedy word wrap using approximate glyph widths.
fn wrap(text: &str, font: BuiltinFont, size: f32, width_mm: f32) -> Vec<String> {
    let max = width_mm / (size * MM_PER_PT);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0;

    for word in text.split_whitespace() {
        let word_width = text_width(word, font);
        let space = if current.is_empty() { 0.0 } else { text_width(" ", font) };

        if current_width + space + word_width <= max {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_width += space + word_width;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0.0;
        }

        if word_width <= max {
            current.push_str(word);
            current_width = word_width;
        } else {
            for ch in word.chars() {
                let w = char_width(ch, font);
                if current_width + w > max && !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0.0;
                }
                current.push(ch);
                current_width += w;
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    // Keep leading indentation of code lines.
    if matches!(font, BuiltinFont::Courier) {
        let indent: String = text.chars().take_while(|c| *c == ' ').collect();
        if let Some(first) = lines.first_mut() {
            first.insert_str(0, &indent);
        }
    }

    lines
}

fn text_width(text: &str, font: BuiltinFont) -> f32 {
    text.chars().map(|c| char_width(c, font)).sum()
}

/// Width in ems.
fn char_width(c: char, font: BuiltinFont) -> f32 {
    let bold = matches!(font, BuiltinFont::HelveticaBold);
    match font {
        BuiltinFont::Courier => 0.6,
        _ => {
            let base = match c {
                'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' | 'I' => 0.28,
                ' ' | 'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '-' => 0.33,
                'm' | 'w' | 'M' | 'W' | '@' => 0.85,
                'A'..='Z' => 0.68,
                _ => 0.56,
            };
            if bold { base * 1.06 } else { base }
        }
    }
}

/// Maps text to what the built-in fonts can show.
pub(super) fn to_win_ansi(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => Some("'".into()),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => Some("\"".into()),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => Some("-".into()),
            '\u{2022}' | '\u{25CF}' | '\u{25E6}' | '\u{2023}' => Some("*".into()),
            '\u{2026}' => Some("...".into()),
            '\u{2192}' | '\u{27F6}' | '\u{21D2}' => Some("->".into()),
            '\u{2190}' | '\u{27F5}' => Some("<-".into()),
            '\u{2194}' => Some("<->".into()),
            '\u{00A0}' | '\u{2002}'..='\u{200A}' => Some(" ".into()),
            '\u{200B}' | '\u{FEFF}' | '\r' => None,
            '\t' => Some("    ".into()),
            ' '..='~' | '\u{00A1}'..='\u{00FF}' => Some(c.to_string()),
            _ => Some("?".into()),
        })
        .collect::<Vec<String>>()
        .concat()
}
