use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DocToolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Stdio,
    Http,
    Both,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub mode: ServerMode,
    pub http_addr: Option<String>,
    pub http_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Multi-pass driver used for full recompiles.
    pub latexmk: String,
    /// 0 disables the timeout. On expiry the driver and every engine pass it
    /// started are killed as one process group.
    pub timeout_secs: u64,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            latexmk: "latexmk".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub scale: f32,
    pub text_limit: usize,
    /// Directory holding the pdfium shared library. Falls back to the system lookup.
    pub pdfium_library_path: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            text_limit: 2000,
            pdfium_library_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub max_listed: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { max_listed: 20 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub compile: CompileConfig,
    pub render: RenderConfig,
    pub report: ReportConfig,
}

impl Config {
    /// Load from a YAML or JSON file, picked by extension.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DocToolError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let is_json = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("json")
        );
        if is_json {
            serde_json::from_str(&raw)
                .map_err(|e| DocToolError::Config(format!("{}: {e}", path.display())))
        } else {
            serde_yaml::from_str(&raw)
                .map_err(|e| DocToolError::Config(format!("{}: {e}", path.display())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  mode: both\n  http_port: 8080\ncompile:\n  timeout_secs: 30\n").unwrap();

        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.server.mode, ServerMode::Both);
        assert_eq!(cfg.server.http_port, Some(8080));
        assert_eq!(cfg.compile.timeout_secs, 30);
        assert_eq!(cfg.compile.latexmk, "latexmk");
        assert_eq!(cfg.render.text_limit, 2000);
        assert_eq!(cfg.report.max_listed, 20);
    }

    #[test]
    fn json_config_is_parsed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"render": {"scale": 3.0}}"#).unwrap();

        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.render.scale, 3.0);
        assert_eq!(cfg.server.mode, ServerMode::Stdio);
    }

    #[test]
    fn malformed_config_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server: [unclosed").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, DocToolError::Config(_)));
    }
}
