use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use latex_doc_mcp::compiler::{CompileOutcome, CompileRequest, Compiler};
use latex_doc_mcp::config::Config;
use latex_doc_mcp::error::Result;
use latex_doc_mcp::model::{Engine, PageSize, ToolArgs};
use latex_doc_mcp::renderer::DocumentRenderer;
use latex_doc_mcp::tools::ToolKit;
use tempfile::{tempdir, TempDir};

struct FakeRenderer {
    pages: usize,
    text: String,
}

impl DocumentRenderer for FakeRenderer {
    fn page_count(&self, _pdf: &Path) -> Result<usize> {
        Ok(self.pages)
    }

    fn page_size(&self, _pdf: &Path, _page: u32) -> Result<PageSize> {
        Ok(PageSize { width: 595.0, height: 842.0 })
    }

    fn page_text(&self, _pdf: &Path, page: u32) -> Result<String> {
        Ok(format!("page {page}: {}", self.text))
    }

    fn render_page(&self, _pdf: &Path, _page: u32, scale: f32, out: &Path) -> Result<(u32, u32)> {
        std::fs::write(out, b"png")?;
        Ok(((595.0 * scale) as u32, (842.0 * scale) as u32))
    }
}

/// Writes a canned log and reports the configured exit status.
struct FakeCompiler {
    log: String,
    success: bool,
    output: String,
    seen: Mutex<Vec<CompileRequest>>,
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome> {
        self.seen.lock().unwrap().push(request.clone());
        let log_path = request.project_dir.join(format!("{}.log", request.base_name));
        std::fs::write(log_path, &self.log)?;
        Ok(CompileOutcome {
            command: format!("fake {}", request.engine),
            success: self.success,
            exit_code: Some(if self.success { 0 } else { 1 }),
            output: self.output.clone(),
        })
    }
}

fn fake_compiler(log: &str, success: bool, output: &str) -> Arc<FakeCompiler> {
    Arc::new(FakeCompiler {
        log: log.to_string(),
        success,
        output: output.to_string(),
        seen: Mutex::new(Vec::new()),
    })
}

fn toolkit_with(compiler: Arc<FakeCompiler>, pages: usize, text: &str) -> ToolKit {
    ToolKit::with_backends(
        &Config::default(),
        compiler,
        Arc::new(FakeRenderer {
            pages,
            text: text.to_string(),
        }),
    )
}

fn toolkit(pages: usize) -> ToolKit {
    toolkit_with(fake_compiler("", true, ""), pages, "hello")
}

fn project() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let root = dir.path().to_path_buf();
    (dir, root)
}

fn args(root: &Path) -> ToolArgs {
    ToolArgs {
        project_dir: Some(root.to_path_buf()),
        ..ToolArgs::default()
    }
}

const SAMPLE_LOG: &str = "This is XeTeX, Version 3.141592653\n\
(./main.tex\n\
LaTeX2e <2023-11-01>\n\
(/usr/share/texlive/texmf-dist/tex/latex/base/article.cls\n\
Document Class: article 2023/05/17 v1.4n Standard LaTeX document class\n\
(/usr/share/texlive/texmf-dist/tex/latex/base/size10.clo))\n\
(./intro.tex [1] [2]\n\
LaTeX Warning: Citation `knuth84' on page 2 undefined on input line 14.\n\
\n\
) (./methods.tex [3]\n\
! Undefined control sequence.\n\
l.8 \\foo\n\
\n\
[4] [4]) [5] (./main.aux) )\n";

#[tokio::test]
async fn page_out_of_range_is_reported() {
    let (_dir, root) = project();
    std::fs::write(root.join("main.pdf"), b"%PDF-1.5").unwrap();
    let kit = toolkit(3);

    for page in [0u32, 4] {
        let out = kit
            .call("page_text", ToolArgs { page: Some(page), ..args(&root) })
            .await;
        assert!(out.is_error, "page {page} should be rejected");
        assert!(out.text.contains("out of range"));
        assert!(out.text.contains("1..=3"));
    }

    let out = kit
        .call("render_page", ToolArgs { page: Some(4), ..args(&root) })
        .await;
    assert!(out.is_error);
    assert!(out.text.contains("out of range"));
}

#[tokio::test]
async fn page_text_is_capped() {
    let (_dir, root) = project();
    std::fs::write(root.join("main.pdf"), b"%PDF-1.5").unwrap();
    let kit = toolkit_with(fake_compiler("", true, ""), 2, &"x".repeat(3000));

    let out = kit
        .call("page_text", ToolArgs { page: Some(2), ..args(&root) })
        .await;
    assert!(!out.is_error, "{}", out.text);
    assert!(out.text.starts_with("Page 2 of 2:"));
    assert!(out.text.contains("[... truncated,"));
}

#[tokio::test]
async fn page_text_without_pdf_asks_for_compile() {
    let (_dir, root) = project();
    let out = toolkit(1)
        .call("page_text", ToolArgs { page: Some(1), ..args(&root) })
        .await;
    assert!(out.is_error);
    assert!(out.text.contains("main.pdf"));
    assert!(out.text.contains("compile the project first"));
}

#[tokio::test]
async fn missing_page_argument() {
    let (_dir, root) = project();
    std::fs::write(root.join("main.pdf"), b"%PDF-1.5").unwrap();
    let out = toolkit(1).call("render_page", args(&root)).await;
    assert!(out.is_error);
    assert!(out.text.contains("page is required"));
}

#[tokio::test]
async fn render_page_default_and_custom_paths() {
    let (_dir, root) = project();
    std::fs::write(root.join("main.pdf"), b"%PDF-1.5").unwrap();
    let kit = toolkit(2);

    let out = kit
        .call("render_page", ToolArgs { page: Some(1), ..args(&root) })
        .await;
    assert!(!out.is_error, "{}", out.text);
    assert!(root.join("main_page1.png").is_file());
    assert!(out.text.contains("1190x1684 px"));

    let out = kit
        .call(
            "render_page",
            ToolArgs {
                page: Some(2),
                output_path: Some(PathBuf::from("shots.png")),
                ..args(&root)
            },
        )
        .await;
    assert!(!out.is_error, "{}", out.text);
    assert!(root.join("shots.png").is_file());
}

#[tokio::test]
async fn check_log_attributes_files_and_lines() {
    let (_dir, root) = project();
    std::fs::write(root.join("main.log"), SAMPLE_LOG).unwrap();

    let out = toolkit(1).call("check_log", args(&root)).await;
    assert!(!out.is_error, "{}", out.text);
    assert!(out.text.contains("Errors (1):"));
    assert!(out.text.contains("1. [methods.tex:8] Undefined control sequence."));
    assert!(!out.text.contains("Warnings"));

    let out = toolkit(1)
        .call("check_log", ToolArgs { include_warnings: true, ..args(&root) })
        .await;
    assert!(out.text.contains("Warnings (1):"));
    assert!(out.text.contains("[intro.tex] LaTeX Warning: Citation `knuth84'"));
}

#[tokio::test]
async fn warning_list_is_capped_at_twenty() {
    let (_dir, root) = project();
    let log: String = (1..=25)
        .map(|i| format!("LaTeX Warning: warning number {i}\n\n"))
        .collect();
    std::fs::write(root.join("main.log"), log).unwrap();

    let out = toolkit(1)
        .call("check_log", ToolArgs { include_warnings: true, ..args(&root) })
        .await;
    assert!(out.text.contains("No errors found."));
    assert!(out.text.contains("Warnings (25):"));
    assert!(out.text.contains("20. [main.tex] LaTeX Warning: warning number 20"));
    assert!(!out.text.contains("warning number 21"));
    assert!(out.text.contains("... and 5 more"));
}

#[tokio::test]
async fn undecodable_log_is_reported() {
    let (_dir, root) = project();
    std::fs::write(root.join("main.log"), [0u8, 159, 146, 150, 0]).unwrap();
    let out = toolkit(1).call("check_log", args(&root)).await;
    assert!(out.is_error);
    assert!(out.text.contains("not decodable"));
}

#[tokio::test]
async fn toc_page_map_with_page_sources() {
    let (_dir, root) = project();
    std::fs::write(
        root.join("main.toc"),
        "\\contentsline {part}{I\\hspace {1em}Basics}{1}{part.1}%\n\
\\contentsline {section}{\\numberline {1}Introduction}{1}{section.1}%\n\
\\contentsline {subsection}{\\numberline {1.1}Scope}{2}{subsection.1.1}%\n\
\\contentsline {section}{\\numberline {2}Methods}{3}{section.2}%\n",
    )
    .unwrap();
    std::fs::write(root.join("main.log"), SAMPLE_LOG).unwrap();

    let out = toolkit(5).call("toc_page_map", args(&root)).await;
    assert!(!out.is_error, "{}", out.text);
    assert!(out.text.contains("Table of contents (4 entries):"));
    assert!(out.text.contains("  Introduction .... p. 1"));
    assert!(out.text.contains("    Scope .... p. 2"));
    assert!(out.text.contains("Pages by source file:"));
    assert!(out.text.contains("p. 1-2: intro.tex"));
    assert!(out.text.contains("p. 3-4: methods.tex"));
    assert!(out.text.contains("p. 5: main.tex"));
}

#[tokio::test]
async fn toc_missing_asks_for_compile() {
    let (_dir, root) = project();
    let out = toolkit(1).call("toc_page_map", args(&root)).await;
    assert!(out.is_error);
    assert!(out.text.contains("main.toc"));
}

#[tokio::test]
async fn document_summary_combines_artifacts() {
    let (_dir, root) = project();
    std::fs::write(
        root.join("main.tex"),
        "\\documentclass[12pt]{report}\n\\usepackage{amsmath,graphicx}\n\\usepackage{hyperref}\n\\usepackage{amsmath}\n\\begin{document}\n\\end{document}\n",
    )
    .unwrap();
    std::fs::write(root.join("main.pdf"), b"%PDF-1.5").unwrap();
    std::fs::write(
        root.join("main.toc"),
        "\\contentsline{section}{\\numberline{1}A}{1}\\contentsline{subsection}{\\numberline{1.1}B}{2}",
    )
    .unwrap();
    std::fs::write(root.join("main.log"), SAMPLE_LOG).unwrap();

    let out = toolkit(7).call("document_summary", args(&root)).await;
    assert!(!out.is_error, "{}", out.text);
    assert!(out.text.contains("Class: report [12pt]"));
    assert!(out.text.contains("Packages (3): amsmath, graphicx, hyperref"));
    assert!(out.text.contains("Pages: 7"));
    assert!(out.text.contains("Page size: 595.0 x 842.0 pt"));
    assert!(out.text.contains("0 part(s), 1 section(s), 1 subsection(s)"));
    assert!(out.text.contains("Log warnings: 1"));
}

#[tokio::test]
async fn document_summary_before_first_build() {
    let (_dir, root) = project();
    std::fs::write(root.join("main.tex"), "\\documentclass{article}\n").unwrap();

    let out = toolkit(1).call("document_summary", args(&root)).await;
    assert!(!out.is_error, "{}", out.text);
    assert!(out.text.contains("Class: article"));
    assert!(out.text.contains("Packages: none"));
    assert!(out.text.contains("PDF not built yet"));
    assert!(!out.text.contains("Pages:"));
}

#[tokio::test]
async fn compile_success_reports_log_errors() {
    let (_dir, root) = project();
    let compiler = fake_compiler(SAMPLE_LOG, true, "Output written on main.pdf");
    let kit = toolkit_with(compiler.clone(), 1, "");

    let out = kit
        .call(
            "compile_latex",
            ToolArgs {
                engine: "pdflatex".into(),
                full_recompile: false,
                main_file: "main.tex".into(),
                ..args(&root)
            },
        )
        .await;
    assert!(!out.is_error, "{}", out.text);
    assert!(out.text.contains("Compilation succeeded with pdflatex"));
    assert!(out.text.contains("Log errors: 1, warnings: 1"));
    assert!(out.text.contains("[methods.tex:8]"));

    let seen = compiler.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].engine, Engine::Pdflatex);
    assert_eq!(seen[0].base_name, "main");
    assert!(!seen[0].full_recompile);
}

#[tokio::test]
async fn compile_failure_includes_excerpt() {
    let (_dir, root) = project();
    let output = "This is XeTeX\n! Undefined control sequence.\nl.8 \\foo\nLatexmk: Errors, so I did not complete making targets\n";
    let kit = toolkit_with(fake_compiler(SAMPLE_LOG, false, output), 1, "");

    let out = kit.call("compile_latex", args(&root)).await;
    assert!(out.is_error);
    assert!(out.text.contains("exit status 1"));
    assert!(out.text.contains("! Undefined control sequence."));
    assert!(out.text.contains("Latexmk: Errors"));
    assert!(!out.text.contains("This is XeTeX"));
    assert!(out.text.contains("Errors (1):"));
}

#[tokio::test]
async fn compile_rejects_unknown_engine() {
    let (_dir, root) = project();
    let compiler = fake_compiler("", true, "");
    let kit = toolkit_with(compiler.clone(), 1, "");

    let out = kit
        .call("compile_latex", ToolArgs { engine: "context".into(), ..args(&root) })
        .await;
    assert!(out.is_error);
    assert!(out.text.contains("unknown engine"));
    assert!(compiler.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_tool_and_bad_project_dir() {
    let (_dir, root) = project();
    let out = toolkit(1).call("typeset_everything", args(&root)).await;
    assert!(out.is_error);
    assert!(out.text.contains("typeset_everything"));

    let out = toolkit(1)
        .call("check_log", args(&root.join("does-not-exist")))
        .await;
    assert!(out.is_error);
    assert!(out.text.contains("does not exist"));
}

#[tokio::test]
async fn concurrent_calls_do_not_interfere() {
    let (_dir_a, a) = project();
    let (_dir_b, b) = project();
    std::fs::write(a.join("main.log"), "! Alpha failed.\nl.1 a\n").unwrap();
    std::fs::write(b.join("main.log"), "! Beta failed.\nl.2 b\n").unwrap();

    let kit = Arc::new(toolkit(1));
    let (ra, rb) = tokio::join!(kit.call("check_log", args(&a)), kit.call("check_log", args(&b)));
    assert!(ra.text.contains("Alpha") && !ra.text.contains("Beta"));
    assert!(rb.text.contains("Beta") && !rb.text.contains("Alpha"));
}
