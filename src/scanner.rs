use regex::Regex;

/// Structural event found on a single log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    FileOpen(String),
    FileClose,
    PageEmitted(u32),
    ErrorStart(String),
    WarningMarker(String),
}

const WARNING_MARKERS: &[&str] = &["Warning:", "warning:"];

/// 行扫描器：把单行日志按从左到右的顺序拆成结构事件。
///
/// 行与行之间不保存状态，跨行顺序由调用方负责。
#[derive(Debug, Clone)]
pub struct LogScanner {
    file_open: Regex,
    page: Regex,
}

impl Default for LogScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LogScanner {
    pub fn new() -> Self {
        Self {
            file_open: Regex::new(r"\((?:\./)?([^\s()]+?\.tex)").expect("file-open pattern"),
            page: Regex::new(r"\[(\d+)\]").expect("page pattern"),
        }
    }

    pub fn scan_line(&self, line: &str) -> Vec<LogEvent> {
        let mut found: Vec<(usize, LogEvent)> = Vec::new();

        if let Some(rest) = line.strip_prefix('!') {
            found.push((0, LogEvent::ErrorStart(rest.trim().to_string())));
        }

        for caps in self.file_open.captures_iter(line) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            found.push((whole.start(), LogEvent::FileOpen(name.as_str().to_string())));
        }

        for (idx, _) in line.match_indices(')') {
            found.push((idx, LogEvent::FileClose));
        }

        for caps in self.page.captures_iter(line) {
            let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            // 溢出或为 0 的计数不算页码
            match num.as_str().parse::<u32>() {
                Ok(n) if n > 0 => found.push((whole.start(), LogEvent::PageEmitted(n))),
                _ => {}
            }
        }

        if let Some(idx) = WARNING_MARKERS.iter().filter_map(|m| line.find(m)).min() {
            found.push((idx, LogEvent::WarningMarker(line.trim().to_string())));
        }

        found.sort_by_key(|(offset, _)| *offset);
        found.into_iter().map(|(_, ev)| ev).collect()
    }
}
