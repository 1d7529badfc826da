use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use latex_doc_mcp::config::{Config, ServerMode};
use latex_doc_mcp::http::serve_http;
use latex_doc_mcp::mcp::run_stdio;
use latex_doc_mcp::tools::ToolKit;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout 用于 JSON-RPC，日志输出到 stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => Config::load_from_path(Path::new(path))
            .with_context(|| format!("loading config from {path}"))?,
        None => Config::default(),
    };
    info!(mode = ?config.server.mode, "starting latex-doc-mcp");

    let toolkit = Arc::new(ToolKit::new(&config));

    match config.server.mode {
        ServerMode::Stdio => run_stdio(toolkit).await?,
        ServerMode::Http => serve_http(toolkit, &config.server).await?,
        ServerMode::Both => {
            let server = config.server.clone();
            let http_toolkit = toolkit.clone();
            let http_task = tokio::spawn(async move { serve_http(http_toolkit, &server).await });
            run_stdio(toolkit).await?;
            // stdin 已关闭，HTTP 服务继续运行直到退出
            http_task.await.context("http task panicked")??;
        }
    }

    Ok(())
}
