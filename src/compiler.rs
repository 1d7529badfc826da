use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::CompileConfig;
use crate::error::{DocToolError, Result};
use crate::model::Engine;

/// Lines worth quoting back when a build fails.
const FAILURE_MARKERS: &[&str] = &["Error", "error:", "Fatal", "Emergency stop", "failed"];

#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub project_dir: PathBuf,
    pub engine: Engine,
    pub base_name: String,
    pub full_recompile: bool,
}

#[derive(Debug, Clone)]
pub struct CompileOutcome {
    /// Rendered command line, for reporting.
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome>;
}

/// Runs the TeX engine directly, or latexmk when a full recompile is asked for.
#[derive(Debug, Clone)]
pub struct LatexCompiler {
    latexmk: String,
    timeout: Option<Duration>,
}

impl LatexCompiler {
    pub fn new(config: &CompileConfig) -> Self {
        Self {
            latexmk: config.latexmk.clone(),
            timeout: Some(config.timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn command_line(&self, request: &CompileRequest) -> (String, Vec<String>) {
        let source = format!("{}.tex", request.base_name);
        if request.full_recompile {
            (
                self.latexmk.clone(),
                vec![
                    request.engine.latexmk_flag().to_string(),
                    "-g".to_string(),
                    "-interaction=nonstopmode".to_string(),
                    source,
                ],
            )
        } else {
            (
                request.engine.program().to_string(),
                vec!["-interaction=nonstopmode".to_string(), source],
            )
        }
    }
}

#[async_trait]
impl Compiler for LatexCompiler {
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome> {
        let (program, args) = self.command_line(request);
        let command = format!("{} {}", program, args.join(" "));
        info!(dir = %request.project_dir.display(), %command, "starting compile");

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(&request.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own group, so a timeout can reach the engine runs latexmk spawns
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| DocToolError::Process {
                command: command.clone(),
                reason: format!("could not start {program}: {e}"),
            })?;

        let pid = child.id();
        let waited = match self.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(res) => res,
                Err(_) => {
                    warn!(%command, "compile timed out");
                    if let Some(pid) = pid {
                        kill_process_group(pid).await;
                    }
                    return Err(DocToolError::Timeout {
                        command,
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|e| DocToolError::Process {
            command: command.clone(),
            reason: e.to_string(),
        })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.ends_with('\n') && !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        info!(%command, status = ?output.status.code(), "compile finished");
        Ok(CompileOutcome {
            command,
            success: output.status.success(),
            exit_code: output.status.code(),
            output: text,
        })
    }
}

/// Kill every process in the group led by `pid`.
///
/// Dropping the child only kills the direct process; latexmk leaves its
/// engine passes running otherwise.
#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    let group = format!("-{pid}");
    let status = Command::new("kill")
        .args(["-KILL", "--", group.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = status {
        warn!(pid, error = %e, "could not kill compile process group");
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pid: u32) {}

/// Up to `limit` output lines that look like failures, in order.
pub fn failure_excerpt(output: &str, limit: usize) -> Vec<&str> {
    output
        .lines()
        .filter(|line| line.starts_with('!') || FAILURE_MARKERS.iter().any(|m| line.contains(m)))
        .take(limit)
        .collect()
}
