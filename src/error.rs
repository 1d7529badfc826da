use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocToolError>;

#[derive(Debug, Error)]
pub enum DocToolError {
    #[error("config error: {0}")]
    Config(String),

    #[error("{} not found; compile the project first", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("{} is not decodable as text: {reason}", path.display())]
    Encoding { path: PathBuf, reason: String },

    #[error("{}", page_range_message(.page, .count))]
    PageOutOfRange { page: u32, count: usize },

    #[error("{command} failed: {reason}")]
    Process { command: String, reason: String },

    #[error("{command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("render error: {0}")]
    Render(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn page_range_message(page: &u32, count: &usize) -> String {
    if *count == 0 {
        format!("page {page} is out of range; the document has no pages")
    } else {
        format!("page {page} is out of range; the document has {count} page(s), valid pages are 1..={count}")
    }
}
