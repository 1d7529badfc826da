use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::compiler::{failure_excerpt, CompileRequest, Compiler, LatexCompiler};
use crate::config::{Config, RenderConfig, ReportConfig};
use crate::error::{DocToolError, Result};
use crate::model::{
    Diagnostic, DocumentSummary, Engine, PageRecord, TocEntry, TocLevel, ToolArgs, ToolOutput,
};
use crate::parser::{LogParser, LogReport};
use crate::preamble::PreambleScanner;
use crate::reader::ArtifactReader;
use crate::renderer::{check_page, DocumentRenderer, PdfiumRenderer};
use crate::toc::TocParser;

pub const COMPILE_LATEX: &str = "compile_latex";
pub const CHECK_LOG: &str = "check_log";
pub const DOCUMENT_SUMMARY: &str = "document_summary";
pub const TOC_PAGE_MAP: &str = "toc_page_map";
pub const PAGE_TEXT: &str = "page_text";
pub const RENDER_PAGE: &str = "render_page";

pub const TOOL_NAMES: [&str; 6] = [
    COMPILE_LATEX,
    CHECK_LOG,
    DOCUMENT_SUMMARY,
    TOC_PAGE_MAP,
    PAGE_TEXT,
    RENDER_PAGE,
];

/// Tool kit: runs one named operation against a LaTeX project directory.
///
/// Every call owns its inputs and accumulators, so one kit can serve
/// concurrent requests behind an `Arc`.
pub struct ToolKit {
    compiler: Arc<dyn Compiler>,
    renderer: Arc<dyn DocumentRenderer>,
    reader: ArtifactReader,
    log_parser: LogParser,
    toc_parser: TocParser,
    preamble: PreambleScanner,
    render: RenderConfig,
    report: ReportConfig,
}

impl ToolKit {
    pub fn new(config: &Config) -> Self {
        Self::with_backends(
            config,
            Arc::new(LatexCompiler::new(&config.compile)),
            Arc::new(PdfiumRenderer::new(&config.render)),
        )
    }

    pub fn with_backends(
        config: &Config,
        compiler: Arc<dyn Compiler>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        Self {
            compiler,
            renderer,
            reader: ArtifactReader::new(),
            log_parser: LogParser::new(),
            toc_parser: TocParser::new(),
            preamble: PreambleScanner::new(),
            render: config.render.clone(),
            report: config.report.clone(),
        }
    }

    pub async fn call(&self, name: &str, args: ToolArgs) -> ToolOutput {
        let started = Instant::now();
        let result = match name {
            COMPILE_LATEX => self.compile_latex(&args).await,
            CHECK_LOG => self.check_log(&args).await,
            DOCUMENT_SUMMARY => self.document_summary(&args).await,
            TOC_PAGE_MAP => self.toc_page_map(&args).await,
            PAGE_TEXT => self.page_text(&args).await,
            RENDER_PAGE => self.render_page(&args).await,
            _ => {
                warn!(tool = name, "unknown tool requested");
                return ToolOutput::error(format!("Unknown tool: {name}"));
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(text) => {
                info!(tool = name, elapsed_ms, "tool call finished");
                ToolOutput::ok(text)
            }
            Err(e) => {
                warn!(tool = name, elapsed_ms, error = %e, "tool call failed");
                ToolOutput::error(format!("Error: {e}"))
            }
        }
    }

    pub async fn compile_latex(&self, args: &ToolArgs) -> Result<String> {
        let dir = project_dir(args)?;
        let engine: Engine = args.engine.parse()?;
        let request = CompileRequest {
            project_dir: dir.clone(),
            engine,
            base_name: args.base_name().to_string(),
            full_recompile: args.full_recompile,
        };

        let outcome = self.compiler.compile(&request).await?;
        let log_report = self.optional_log(&dir, args, true).await;

        if !outcome.success {
            let mut reason = match outcome.exit_code {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            };
            let excerpt = failure_excerpt(&outcome.output, self.report.max_listed);
            if excerpt.is_empty() {
                reason.push_str("\nNo failure lines found in compiler output.");
            } else {
                reason.push_str("\nCompiler output:\n");
                reason.push_str(&excerpt.join("\n"));
            }
            if let Some(report) = &log_report {
                if !report.errors.is_empty() {
                    reason.push_str("\n\n");
                    reason.push_str(&self.format_list("Errors", &report.errors));
                }
            }
            return Err(DocToolError::Process {
                command: outcome.command,
                reason,
            });
        }

        let mut text = format!("Compilation succeeded with {engine} ({}).\n", outcome.command);
        let pdf = dir.join(format!("{}.pdf", args.base_name()));
        if pdf.is_file() {
            let _ = writeln!(text, "Output: {}", pdf.display());
        }
        match log_report {
            Some(report) => {
                let _ = writeln!(text, "Log errors: {}, warnings: {}", report.errors.len(), report.warnings.len());
                if !report.errors.is_empty() {
                    text.push('\n');
                    text.push_str(&self.format_list("Errors", &report.errors));
                }
            }
            None => text.push_str("No build log was found.\n"),
        }
        Ok(text)
    }

    pub async fn check_log(&self, args: &ToolArgs) -> Result<String> {
        let dir = project_dir(args)?;
        let log_path = dir.join(format!("{}.log", args.base_name()));
        let text = self.reader.read_text(&log_path).await?;
        let report = self
            .log_parser
            .parse(&text, &args.main_tex(), args.include_warnings);
        Ok(self.format_log_report(&report, args.include_warnings))
    }

    pub async fn document_summary(&self, args: &ToolArgs) -> Result<String> {
        let dir = project_dir(args)?;
        let source_path = dir.join(args.main_tex());
        if !source_path.is_file() {
            return Err(DocToolError::InvalidRequest(format!(
                "main source file {} not found",
                source_path.display()
            )));
        }
        let source = self.reader.read_text(&source_path).await?;
        let preamble = self.preamble.scan(&source);

        let mut summary = DocumentSummary {
            document_class: preamble.document_class,
            class_options: preamble.class_options,
            packages: preamble.packages,
            ..DocumentSummary::default()
        };
        let mut notes = Vec::new();

        let pdf = dir.join(format!("{}.pdf", args.base_name()));
        if pdf.is_file() {
            let first_page = self
                .blocking(move |r| {
                    let count = r.page_count(&pdf)?;
                    let size = if count > 0 { Some(r.page_size(&pdf, 1)?) } else { None };
                    Ok((count, size))
                })
                .await;
            match first_page {
                Ok((count, size)) => {
                    summary.page_count = Some(count);
                    summary.first_page_size = size;
                }
                Err(e) => notes.push(format!("PDF could not be read: {e}")),
            }
        } else {
            notes.push("PDF not built yet; compile the project first.".to_string());
        }

        let toc_path = dir.join(format!("{}.toc", args.base_name()));
        match self.reader.read_text(&toc_path).await {
            Ok(toc) => {
                for entry in self.toc_parser.parse(&toc) {
                    match entry.level {
                        TocLevel::Part => summary.parts += 1,
                        TocLevel::Section => summary.sections += 1,
                        TocLevel::Subsection => summary.subsections += 1,
                    }
                }
            }
            Err(DocToolError::MissingArtifact { .. }) => notes.push("No table of contents file.".to_string()),
            Err(e) => notes.push(e.to_string()),
        }

        if let Some(report) = self.optional_log(&dir, args, true).await {
            summary.warnings = Some(report.warnings.len());
        }

        let mut text = render_summary(&args.main_tex(), &summary);
        for note in notes {
            let _ = writeln!(text, "Note: {note}");
        }
        Ok(text)
    }

    pub async fn toc_page_map(&self, args: &ToolArgs) -> Result<String> {
        let dir = project_dir(args)?;
        let toc_path = dir.join(format!("{}.toc", args.base_name()));
        let toc = self.reader.read_text(&toc_path).await?;
        let entries = self.toc_parser.parse(&toc);

        let mut text = render_toc(&entries);
        if let Some(report) = self.optional_log(&dir, args, false).await {
            if !report.pages.is_empty() {
                text.push('\n');
                text.push_str(&render_page_sources(&report.pages));
            }
        }
        Ok(text)
    }

    pub async fn page_text(&self, args: &ToolArgs) -> Result<String> {
        let dir = project_dir(args)?;
        let page = required_page(args)?;
        let pdf = existing_pdf(&dir, args)?;
        let limit = self.render.text_limit;

        let (count, raw) = self
            .blocking(move |r| {
                let count = r.page_count(&pdf)?;
                check_page(page, count)?;
                Ok((count, r.page_text(&pdf, page)?))
            })
            .await?;

        let body = if raw.trim().is_empty() {
            "(no extractable text on this page)".to_string()
        } else {
            truncate_chars(&raw, limit)
        };
        Ok(format!("Page {page} of {count}:\n\n{body}"))
    }

    pub async fn render_page(&self, args: &ToolArgs) -> Result<String> {
        let dir = project_dir(args)?;
        let page = required_page(args)?;
        let pdf = existing_pdf(&dir, args)?;
        let out = match &args.output_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => dir.join(p),
            None => dir.join(format!("{}_page{page}.png", args.base_name())),
        };
        let scale = self.render.scale;

        let target = out.clone();
        let (count, (width, height)) = self
            .blocking(move |r| {
                let count = r.page_count(&pdf)?;
                check_page(page, count)?;
                Ok((count, r.render_page(&pdf, page, scale, &target)?))
            })
            .await?;

        Ok(format!(
            "Rendered page {page} of {count} to {} ({width}x{height} px)",
            out.display()
        ))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DocumentRenderer) -> Result<T> + Send + 'static,
    {
        let renderer = Arc::clone(&self.renderer);
        tokio::task::spawn_blocking(move || f(renderer.as_ref()))
            .await
            .map_err(|e| DocToolError::Render(format!("render task failed: {e}")))?
    }

    /// Parse the build log if it exists and decodes; otherwise `None`.
    async fn optional_log(&self, dir: &Path, args: &ToolArgs, include_warnings: bool) -> Option<LogReport> {
        let log_path = dir.join(format!("{}.log", args.base_name()));
        match self.reader.read_text(&log_path).await {
            Ok(text) => Some(self.log_parser.parse(&text, &args.main_tex(), include_warnings)),
            Err(DocToolError::MissingArtifact { .. }) => None,
            Err(e) => {
                warn!(path = %log_path.display(), error = %e, "build log unreadable");
                None
            }
        }
    }

    fn format_log_report(&self, report: &LogReport, include_warnings: bool) -> String {
        let mut text = String::new();
        if report.errors.is_empty() {
            text.push_str("No errors found.\n");
        } else {
            text.push_str(&self.format_list("Errors", &report.errors));
        }
        if include_warnings {
            text.push('\n');
            if report.warnings.is_empty() {
                text.push_str("No warnings found.\n");
            } else {
                text.push_str(&self.format_list("Warnings", &report.warnings));
            }
        }
        text
    }

    /// Numbered list capped at `max_listed`; the full count is always shown.
    fn format_list(&self, title: &str, items: &[Diagnostic]) -> String {
        let mut text = format!("{title} ({}):\n", items.len());
        for (idx, d) in items.iter().take(self.report.max_listed).enumerate() {
            let location = match d.line {
                Some(line) => format!("{}:{line}", d.file),
                None => d.file.clone(),
            };
            let _ = writeln!(text, "{}. [{location}] {}", idx + 1, d.message);
        }
        if items.len() > self.report.max_listed {
            let _ = writeln!(text, "... and {} more", items.len() - self.report.max_listed);
        }
        text
    }
}

fn project_dir(args: &ToolArgs) -> Result<PathBuf> {
    let dir = args
        .project_dir
        .clone()
        .ok_or_else(|| DocToolError::InvalidRequest("project_dir is required".to_string()))?;
    if !dir.is_dir() {
        return Err(DocToolError::InvalidRequest(format!(
            "project directory {} does not exist",
            dir.display()
        )));
    }
    Ok(dir)
}

fn required_page(args: &ToolArgs) -> Result<u32> {
    args.page
        .ok_or_else(|| DocToolError::InvalidRequest("page is required (1-based)".to_string()))
}

fn existing_pdf(dir: &Path, args: &ToolArgs) -> Result<PathBuf> {
    let pdf = dir.join(format!("{}.pdf", args.base_name()));
    if !pdf.is_file() {
        return Err(DocToolError::MissingArtifact { path: pdf });
    }
    Ok(pdf)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => {
            let remaining = text[cut..].chars().count();
            format!("{}\n\n[... truncated, {remaining} more characters]", &text[..cut])
        }
        None => text.to_string(),
    }
}

fn render_summary(main_tex: &str, s: &DocumentSummary) -> String {
    let mut text = format!("Document summary for {main_tex}\n");
    match (&s.document_class, &s.class_options) {
        (Some(class), Some(opts)) => {
            let _ = writeln!(text, "Class: {class} [{opts}]");
        }
        (Some(class), None) => {
            let _ = writeln!(text, "Class: {class}");
        }
        (None, _) => text.push_str("Class: (no \\documentclass found)\n"),
    }
    if s.packages.is_empty() {
        text.push_str("Packages: none\n");
    } else {
        let _ = writeln!(text, "Packages ({}): {}", s.packages.len(), s.packages.join(", "));
    }
    if let Some(count) = s.page_count {
        let _ = writeln!(text, "Pages: {count}");
    }
    if let Some(size) = s.first_page_size {
        let _ = writeln!(
            text,
            "Page size: {:.1} x {:.1} pt ({:.1} x {:.1} mm)",
            size.width,
            size.height,
            size.width * 25.4 / 72.0,
            size.height * 25.4 / 72.0
        );
    }
    let _ = writeln!(
        text,
        "Table of contents: {} part(s), {} section(s), {} subsection(s)",
        s.parts, s.sections, s.subsections
    );
    if let Some(warnings) = s.warnings {
        let _ = writeln!(text, "Log warnings: {warnings}");
    }
    text
}

/// Entries are shown under the nearest preceding part; the data stays flat.
fn render_toc(entries: &[TocEntry]) -> String {
    if entries.is_empty() {
        return "Table of contents is empty.\n".to_string();
    }
    let mut text = format!("Table of contents ({} entries):\n", entries.len());
    let mut in_part = false;
    for entry in entries {
        let depth = match entry.level {
            TocLevel::Part => {
                in_part = true;
                0
            }
            TocLevel::Section => usize::from(in_part),
            TocLevel::Subsection => 1 + usize::from(in_part),
        };
        let label = match entry.level {
            TocLevel::Part => "Part: ",
            TocLevel::Section | TocLevel::Subsection => "",
        };
        let _ = writeln!(
            text,
            "{}{label}{} .... p. {}",
            "  ".repeat(depth),
            entry.title,
            entry.page
        );
    }
    text
}

/// Consecutive pages from the same file are folded into one range.
fn render_page_sources(pages: &[PageRecord]) -> String {
    let mut text = String::from("Pages by source file:\n");
    let mut iter = pages.iter().peekable();
    while let Some(first) = iter.next() {
        let mut last = first.page;
        while let Some(next) = iter.peek() {
            if next.file == first.file && next.page == last + 1 {
                last = next.page;
                iter.next();
            } else {
                break;
            }
        }
        if last == first.page {
            let _ = writeln!(text, "  p. {}: {}", first.page, first.file);
        } else {
            let _ = writeln!(text, "  p. {}-{}: {}", first.page, last, first.file);
        }
    }
    text
}

/// JSON schemas for `tools/list`.
pub fn tool_catalog() -> Vec<Value> {
    let project = json!({ "type": "string", "description": "Directory containing the LaTeX project" });
    let main_file = json!({ "type": "string", "description": "Main file base name", "default": "main" });
    let page = json!({ "type": "integer", "minimum": 1, "description": "1-based page number" });

    vec![
        json!({
            "name": COMPILE_LATEX,
            "description": "Compile the LaTeX project and report errors from the build log.",
            "inputSchema": {
                "type": "object",
                "required": ["project_dir"],
                "properties": {
                    "project_dir": project,
                    "main_file": main_file,
                    "engine": { "type": "string", "enum": ["xelatex", "pdflatex", "lualatex"], "default": "xelatex" },
                    "full_recompile": { "type": "boolean", "default": true, "description": "Run latexmk (all passes) instead of a single engine pass" }
                }
            }
        }),
        json!({
            "name": CHECK_LOG,
            "description": "Scan the build log for errors and optionally warnings, with file and line attribution.",
            "inputSchema": {
                "type": "object",
                "required": ["project_dir"],
                "properties": {
                    "project_dir": project,
                    "main_file": main_file,
                    "include_warnings": { "type": "boolean", "default": false }
                }
            }
        }),
        json!({
            "name": DOCUMENT_SUMMARY,
            "description": "Summarize document class, packages, page count and size, TOC and warning counts.",
            "inputSchema": {
                "type": "object",
                "required": ["project_dir"],
                "properties": { "project_dir": project, "main_file": main_file }
            }
        }),
        json!({
            "name": TOC_PAGE_MAP,
            "description": "Map table-of-contents entries to page numbers and pages to source files.",
            "inputSchema": {
                "type": "object",
                "required": ["project_dir"],
                "properties": { "project_dir": project, "main_file": main_file }
            }
        }),
        json!({
            "name": PAGE_TEXT,
            "description": "Extract the text of one PDF page.",
            "inputSchema": {
                "type": "object",
                "required": ["project_dir", "page"],
                "properties": { "project_dir": project, "main_file": main_file, "page": page }
            }
        }),
        json!({
            "name": RENDER_PAGE,
            "description": "Render one PDF page to a PNG image at 2x resolution.",
            "inputSchema": {
                "type": "object",
                "required": ["project_dir", "page"],
                "properties": {
                    "project_dir": project,
                    "main_file": main_file,
                    "page": page,
                    "output_path": { "type": "string", "description": "Defaults to <main_file>_page<N>.png in the project directory" }
                }
            }
        }),
    ]
}
