//! LaTeX 文档工具 MCP 服务核心库
//! 日志与目录解析在 `scanner`、`nesting`、`parser`、`toc` 中，编译、PDF 与传输层围绕其组织。

pub mod config;
pub mod error;
pub mod model;
pub mod scanner;
pub mod nesting;
pub mod parser;
pub mod toc;
pub mod preamble;
pub mod reader;
pub mod compiler;
pub mod renderer;
pub mod tools;
pub mod http;
pub mod mcp;
