use crate::scanner::LogEvent;

/// Stack of source files the engine currently has open, innermost last.
///
/// The root entry is the main document and is never popped, so `depth()` is
/// always at least 1 even for unbalanced logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStack {
    files: Vec<String>,
}

impl FileStack {
    pub fn new(main_file: impl Into<String>) -> Self {
        Self {
            files: vec![main_file.into()],
        }
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.files.push(name.into());
    }

    /// Pop the innermost file. A close at root depth is ignored.
    pub fn pop(&mut self) {
        if self.files.len() > 1 {
            self.files.pop();
        }
    }

    pub fn current(&self) -> &str {
        // 根文件永不出栈
        self.files.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.files.len()
    }

    /// Apply a scanner event; events other than open/close leave the stack alone.
    pub fn apply(&mut self, event: &LogEvent) {
        match event {
            LogEvent::FileOpen(name) => self.push(name.as_str()),
            LogEvent::FileClose => self.pop(),
            _ => {}
        }
    }
}
