use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{Diagnostic, DiagnosticKind, PageRecord};
use crate::nesting::FileStack;
use crate::scanner::{LogEvent, LogScanner};

/// Structured facts recovered from one build log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogReport {
    pub pages: Vec<PageRecord>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Page number -> file that first emitted it.
#[derive(Debug, Clone, Default)]
pub struct PageMap {
    pages: BTreeMap<u32, String>,
}

impl PageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the page was already attributed.
    pub fn record(&mut self, page: u32, file: &str) -> bool {
        if self.pages.contains_key(&page) {
            return false;
        }
        self.pages.insert(page, file.to_string());
        true
    }

    pub fn into_records(self) -> Vec<PageRecord> {
        self.pages
            .into_iter()
            .map(|(page, file)| PageRecord { page, file })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Pending {
    file: String,
    parts: Vec<String>,
}

impl Pending {
    fn new(first: &str, file: &str) -> Self {
        let mut parts = Vec::new();
        if !first.is_empty() {
            parts.push(first.to_string());
        }
        Self {
            file: file.to_string(),
            parts,
        }
    }

    fn finish(self, kind: DiagnosticKind, line: Option<u32>) -> Diagnostic {
        Diagnostic {
            kind,
            file: self.file,
            line,
            message: self.parts.join(" "),
        }
    }
}

/// Accumulates multi-line errors and warnings during a forward pass.
#[derive(Debug, Clone)]
pub struct DiagnosticCollector<'a> {
    include_warnings: bool,
    line_marker: &'a Regex,
    error: Option<Pending>,
    warning: Option<Pending>,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
}

impl<'a> DiagnosticCollector<'a> {
    /// `line_marker` captures the source line number in group 1.
    pub fn new(include_warnings: bool, line_marker: &'a Regex) -> Self {
        Self {
            include_warnings,
            line_marker,
            error: None,
            warning: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Feed a line to the diagnostics still open from earlier lines.
    ///
    /// Must run before the line's own start events are applied.
    pub fn continue_line(&mut self, line: &str, events: &[LogEvent]) {
        if let Some(mut pending) = self.error.take() {
            if line.starts_with('!') {
                self.errors.push(pending.finish(DiagnosticKind::Error, None));
            } else if let Some(caps) = self.line_marker.captures(line) {
                let number = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
                self.errors.push(pending.finish(DiagnosticKind::Error, number));
            } else {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    pending.parts.push(trimmed.to_string());
                }
                self.error = Some(pending);
            }
        }

        if let Some(mut pending) = self.warning.take() {
            let indented = line.starts_with(char::is_whitespace);
            let new_warning = events
                .iter()
                .any(|ev| matches!(ev, LogEvent::WarningMarker(_)));
            if indented && !new_warning {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    pending.parts.push(trimmed.to_string());
                }
                self.warning = Some(pending);
            } else {
                self.warnings.push(pending.finish(DiagnosticKind::Warning, None));
            }
        }
    }

    pub fn start_error(&mut self, message: &str, file: &str) {
        if let Some(prev) = self.error.take() {
            self.errors.push(prev.finish(DiagnosticKind::Error, None));
        }
        self.error = Some(Pending::new(message, file));
    }

    pub fn start_warning(&mut self, message: &str, file: &str) {
        if !self.include_warnings {
            return;
        }
        if let Some(prev) = self.warning.take() {
            self.warnings.push(prev.finish(DiagnosticKind::Warning, None));
        }
        self.warning = Some(Pending::new(message, file));
    }

    /// Close anything still open at end of input.
    pub fn finish(mut self) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
        if let Some(pending) = self.error.take() {
            self.errors.push(pending.finish(DiagnosticKind::Error, None));
        }
        if let Some(pending) = self.warning.take() {
            self.warnings.push(pending.finish(DiagnosticKind::Warning, None));
        }
        (self.errors, self.warnings)
    }
}

/// Log parser: one forward pass driving the file stack, page map and
/// diagnostic collector from the scanner's events.
#[derive(Debug, Clone)]
pub struct LogParser {
    scanner: LogScanner,
    line_marker: Regex,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    pub fn new() -> Self {
        Self {
            scanner: LogScanner::new(),
            // `l.<n>` as a token, not the tail of a word like `tbl.3`
            line_marker: Regex::new(r"\bl\.(\d+)").expect("line marker pattern"),
        }
    }

    pub fn parse(&self, text: &str, main_file: &str, include_warnings: bool) -> LogReport {
        let mut stack = FileStack::new(main_file);
        let mut pages = PageMap::new();
        let mut diagnostics = DiagnosticCollector::new(include_warnings, &self.line_marker);

        for line in text.lines() {
            let events = self.scanner.scan_line(line);
            diagnostics.continue_line(line, &events);

            for event in &events {
                match event {
                    LogEvent::ErrorStart(msg) => diagnostics.start_error(msg, stack.current()),
                    LogEvent::WarningMarker(msg) => diagnostics.start_warning(msg, stack.current()),
                    LogEvent::PageEmitted(n) => {
                        pages.record(*n, stack.current());
                    }
                    LogEvent::FileOpen(_) | LogEvent::FileClose => stack.apply(event),
                }
            }
        }

        let (errors, warnings) = diagnostics.finish();
        LogReport {
            pages: pages.into_records(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_control_sequence_gets_line_number() {
        let report = LogParser::new().parse("! Undefined control sequence.\nl.12 \\foo", "main.tex", false);
        assert_eq!(report.errors.len(), 1);
        let err = &report.errors[0];
        assert_eq!(err.kind, DiagnosticKind::Error);
        assert_eq!(err.line, Some(12));
        assert_eq!(err.file, "main.tex");
        assert!(err.message.contains("Undefined control sequence."));
    }

    #[test]
    fn line_marker_inside_word_does_not_end_error() {
        let log = "! Undefined control sequence.\n<argument> \\ref{tbl.3}\nl.40 \\foo";
        let report = LogParser::new().parse(log, "main.tex", false);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].line, Some(40));
        assert_eq!(
            report.errors[0].message,
            "Undefined control sequence. <argument> \\ref{tbl.3}"
        );
    }

    #[test]
    fn repeated_page_keeps_first_file() {
        let report = LogParser::new().parse("(chapter1.tex some text [4] [4] )\n(./ch2.tex [4] [5])", "main.tex", false);
        assert_eq!(
            report.pages,
            vec![
                PageRecord { page: 4, file: "chapter1.tex".into() },
                PageRecord { page: 5, file: "ch2.tex".into() },
            ]
        );
    }

    #[test]
    fn pages_sorted_ascending() {
        let report = LogParser::new().parse("[3] [1]\n(./b.tex [2])", "main.tex", false);
        let pages: Vec<u32> = report.pages.iter().map(|p| p.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(report.pages[1].file, "b.tex");
    }

    #[test]
    fn multiline_error_skips_blank_lines() {
        let log = "(./ch1.tex\n! LaTeX Error: File `missing.sty' not found.\n\nType X to quit or <RETURN> to proceed,\nl.3 \\usepackage\n)";
        let report = LogParser::new().parse(log, "main.tex", false);
        assert_eq!(report.errors.len(), 1);
        let err = &report.errors[0];
        assert_eq!(err.file, "ch1.tex");
        assert_eq!(err.line, Some(3));
        assert_eq!(
            err.message,
            "LaTeX Error: File `missing.sty' not found. Type X to quit or <RETURN> to proceed,"
        );
    }

    #[test]
    fn consecutive_errors_split_without_line() {
        let log = "! First problem.\n! Second problem.\nl.7 x";
        let report = LogParser::new().parse(log, "main.tex", false);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].line, None);
        assert_eq!(report.errors[0].message, "First problem.");
        assert_eq!(report.errors[1].line, Some(7));
    }

    #[test]
    fn unterminated_error_is_kept() {
        let report = LogParser::new().parse("! Emergency stop.\n*** (job aborted)", "main.tex", false);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].line, None);
        assert!(report.errors[0].message.contains("job aborted"));
    }

    #[test]
    fn warnings_only_when_requested() {
        let log = "LaTeX Warning: Reference `fig:a' on page 2 undefined on input line 40.\n\n";
        assert!(LogParser::new().parse(log, "main.tex", false).warnings.is_empty());
        let report = LogParser::new().parse(log, "main.tex", true);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, DiagnosticKind::Warning);
        assert_eq!(report.warnings[0].line, None);
    }

    #[test]
    fn warning_continuation_requires_indent() {
        let log = "(./sec.tex\nLaTeX Font Warning: Font shape `OT1/cmr/bx/sc' undefined\n   using `OT1/cmr/bx/n' instead on input line 9.\nnot part of it\nPackage hyperref Warning: Token not allowed\n    removing `\\textbf' on input line 12.\n)";
        let report = LogParser::new().parse(log, "main.tex", true);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(
            report.warnings[0].message,
            "LaTeX Font Warning: Font shape `OT1/cmr/bx/sc' undefined using `OT1/cmr/bx/n' instead on input line 9."
        );
        assert_eq!(report.warnings[0].file, "sec.tex");
        assert!(report.warnings[1].message.ends_with("on input line 12."));
    }

    #[test]
    fn indented_new_warning_starts_fresh() {
        let log = "LaTeX Warning: one\n  LaTeX Warning: two\n";
        let report = LogParser::new().parse(log, "main.tex", true);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.warnings[0].message, "LaTeX Warning: one");
        assert_eq!(report.warnings[1].message, "LaTeX Warning: two");
    }

    #[test]
    fn parsing_is_idempotent() {
        let log = "(./a.tex [1] ! no\n! Oops.\nl.4 y\nLaTeX Warning: w\n  cont\n[2])";
        let parser = LogParser::new();
        assert_eq!(parser.parse(log, "main.tex", true), parser.parse(log, "main.tex", true));
    }

    #[test]
    fn empty_log_yields_nothing() {
        let report = LogParser::new().parse("", "main.tex", true);
        assert_eq!(report, LogReport::default());
    }
}
