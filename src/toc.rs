use regex::Regex;

use crate::model::{TocEntry, TocLevel};

const CONTENTS_LINE: &str = "\\contentsline";

/// Parser for `.toc` files written by LaTeX.
///
/// Reads `\contentsline{level}{title}{page}` entries in document order. The
/// title argument is captured with brace balancing, so formatting commands
/// such as `\numberline{2.1}` inside it do not cut the capture short.
#[derive(Debug, Clone)]
pub struct TocParser {
    numberline: Regex,
    control_word: Regex,
}

impl Default for TocParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TocParser {
    pub fn new() -> Self {
        Self {
            numberline: Regex::new(r"\\numberline\s*\{[^{}]*\}").expect("numberline pattern"),
            control_word: Regex::new(r"\\[A-Za-z]+\s*").expect("control word pattern"),
        }
    }

    pub fn parse(&self, text: &str) -> Vec<TocEntry> {
        let mut entries = Vec::new();
        let mut cursor = 0usize;

        while let Some(found) = text[cursor..].find(CONTENTS_LINE) {
            let start = cursor + found + CONTENTS_LINE.len();
            cursor = start;

            let Some((level, after_level)) = read_group(text, start) else {
                continue;
            };
            let Some((title, after_title)) = read_group(text, after_level) else {
                continue;
            };
            let Some((page, after_page)) = read_group(text, after_title) else {
                continue;
            };
            cursor = after_page;

            let Some(level) = TocLevel::from_keyword(level.trim()) else {
                continue;
            };
            let Ok(page) = page.trim().parse::<u32>() else {
                continue;
            };
            entries.push(TocEntry {
                level,
                title: self.clean_title(title),
                page,
            });
        }

        entries
    }

    /// Strip `\numberline{..}`, then other control words, then outer whitespace.
    pub fn clean_title(&self, raw: &str) -> String {
        let without_number = self.numberline.replace_all(raw, "");
        let without_commands = self.control_word.replace_all(&without_number, "");
        without_commands.trim().to_string()
    }
}

/// Read one `{...}` argument starting at `from`, skipping leading whitespace.
/// Returns the inner text and the offset just past the closing brace.
fn read_group(text: &str, from: usize) -> Option<(&str, usize)> {
    let rest = &text[from..];
    let skipped = rest.len() - rest.trim_start().len();
    let open = from + skipped;
    if !text[open..].starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut escaped = false;
    for (idx, ch) in text[open..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let close = open + idx;
                    return Some((&text[open + 1..close], close + 1));
                }
            }
            _ => {}
        }
    }
    None
}
