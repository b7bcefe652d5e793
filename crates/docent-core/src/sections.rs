//! Splits doc bodies into heading-delimited sections for embedding and retrieval.
//! Each ATX heading opens a new section; paragraph content under it becomes the section text.

use crate::docs::Doc;

/// Sections with more characters than this are kept but not embedded.
pub const DEFAULT_MAX_SECTION_CHARS: usize = 2048;

/// A titled span of documentation text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Heading depth (1 for `#`, 2 for `##`, …); 0 for content before the first heading.
    pub level: u8,
    pub title: String,
    /// Paragraphs joined by a single newline.
    pub text: String,
}

impl Section {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Parse one doc into sections. Sections without text are dropped.
pub fn parse_sections(doc: &Doc) -> Vec<Section> {
    let mut builder = SectionBuilder::new(doc.title.clone().unwrap_or_default());
    let mut fence: Option<&str> = None;

    for line in doc.body.lines() {
        let trimmed = line.trim_start();
        if let Some(marker) = fence {
            builder.push_line(line);
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if let Some(marker) = fence_marker(trimmed) {
            fence = Some(marker);
            builder.push_line(line);
            continue;
        }
        if let Some((level, title)) = parse_heading(trimmed) {
            builder.start(level, title);
            continue;
        }
        if trimmed.is_empty() {
            builder.end_paragraph();
        } else {
            builder.push_line(line.trim_end());
        }
    }
    builder.finish()
}

/// Parse all docs, keeping doc order.
pub fn parse_all(docs: &[Doc]) -> Vec<(&Doc, Vec<Section>)> {
    docs.iter().map(|d| (d, parse_sections(d))).collect()
}

struct SectionBuilder {
    sections: Vec<Section>,
    level: u8,
    title: String,
    paragraphs: Vec<String>,
    current: Vec<String>,
}

impl SectionBuilder {
    fn new(preamble_title: String) -> Self {
        Self {
            sections: Vec::new(),
            level: 0,
            title: preamble_title,
            paragraphs: Vec::new(),
            current: Vec::new(),
        }
    }

    fn push_line(&mut self, line: &str) {
        self.current.push(line.to_string());
    }

    fn end_paragraph(&mut self) {
        if !self.current.is_empty() {
            self.paragraphs.push(self.current.join("\n"));
            self.current.clear();
        }
    }

    fn start(&mut self, level: u8, title: String) {
        self.flush();
        self.level = level;
        self.title = title;
    }

    fn flush(&mut self) {
        self.end_paragraph();
        let text = self.paragraphs.join("\n").trim().to_string();
        self.paragraphs.clear();
        if !text.is_empty() {
            self.sections.push(Section {
                level: self.level,
                title: std::mem::take(&mut self.title),
                text,
            });
        }
    }

    fn finish(mut self) -> Vec<Section> {
        self.flush();
        self.sections
    }
}

/// `# Title` → `(1, "Title")`. Requires a space after the hashes; closing hashes are trimmed.
fn parse_heading(line: &str) -> Option<(u8, String)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end().to_string();
    Some((hashes as u8, title))
}

fn fence_marker(line: &str) -> Option<&'static str> {
    if line.starts_with("```") {
        Some("```")
    } else if line.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}
