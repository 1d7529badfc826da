use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DocToolError;

/// Flat argument map shared by every tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolArgs {
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
    #[serde(default = "default_main_file")]
    pub main_file: String,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_full_recompile")]
    pub full_recompile: bool,
    #[serde(default)]
    pub include_warnings: bool,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

fn default_main_file() -> String {
    "main".to_string()
}

fn default_engine() -> String {
    "xelatex".to_string()
}

fn default_full_recompile() -> bool {
    true
}

impl Default for ToolArgs {
    fn default() -> Self {
        Self {
            project_dir: None,
            main_file: default_main_file(),
            engine: default_engine(),
            full_recompile: default_full_recompile(),
            include_warnings: false,
            page: None,
            output_path: None,
        }
    }
}

impl ToolArgs {
    /// Base name without a trailing `.tex`.
    pub fn base_name(&self) -> &str {
        let name = self.main_file.trim();
        name.strip_suffix(".tex").unwrap_or(name)
    }

    pub fn main_tex(&self) -> String {
        format!("{}.tex", self.base_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Xelatex,
    Pdflatex,
    Lualatex,
}

impl Engine {
    pub fn program(self) -> &'static str {
        match self {
            Engine::Xelatex => "xelatex",
            Engine::Pdflatex => "pdflatex",
            Engine::Lualatex => "lualatex",
        }
    }

    /// latexmk switch selecting this engine.
    pub fn latexmk_flag(self) -> &'static str {
        match self {
            Engine::Xelatex => "-pdfxe",
            Engine::Pdflatex => "-pdf",
            Engine::Lualatex => "-pdflua",
        }
    }
}

impl FromStr for Engine {
    type Err = DocToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xelatex" => Ok(Engine::Xelatex),
            "pdflatex" => Ok(Engine::Pdflatex),
            "lualatex" => Ok(Engine::Lualatex),
            other => Err(DocToolError::InvalidRequest(format!(
                "unknown engine '{other}', expected one of xelatex, pdflatex, lualatex"
            ))),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

/// 诊断条目。多行错误或警告拼接后均用该结构承载。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: String,
    pub line: Option<u32>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub page: u32,
    pub file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TocLevel {
    Part,
    Section,
    Subsection,
}

impl TocLevel {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "part" => Some(TocLevel::Part),
            "section" => Some(TocLevel::Section),
            "subsection" => Some(TocLevel::Subsection),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub level: TocLevel,
    pub title: String,
    pub page: u32,
}

/// Page size in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_class: Option<String>,
    pub class_options: Option<String>,
    pub packages: Vec<String>,
    pub page_count: Option<usize>,
    pub first_page_size: Option<PageSize>,
    pub parts: usize,
    pub sections: usize,
    pub subsections: usize,
    pub warnings: Option<usize>,
}

/// Text payload returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}
