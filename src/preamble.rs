use regex::Regex;

/// 主文件导言区中的文档类与宏包声明。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preamble {
    pub document_class: Option<String>,
    pub class_options: Option<String>,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PreambleScanner {
    document_class: Regex,
    use_package: Regex,
}

impl Default for PreambleScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PreambleScanner {
    pub fn new() -> Self {
        Self {
            document_class: Regex::new(r"\\documentclass\s*(?:\[([^\]]*)\])?\s*\{([^}]*)\}")
                .expect("documentclass pattern"),
            use_package: Regex::new(r"\\usepackage\s*(?:\[[^\]]*\])?\s*\{([^}]*)\}")
                .expect("usepackage pattern"),
        }
    }

    pub fn scan(&self, source: &str) -> Preamble {
        let mut preamble = Preamble::default();

        for line in source.lines() {
            let line = strip_comment(line);
            if line.trim().is_empty() {
                continue;
            }

            if preamble.document_class.is_none() {
                if let Some(caps) = self.document_class.captures(line) {
                    preamble.class_options = caps
                        .get(1)
                        .map(|m| normalize_list(m.as_str()))
                        .filter(|s| !s.is_empty());
                    preamble.document_class = caps.get(2).map(|m| m.as_str().trim().to_string());
                }
            }

            for caps in self.use_package.captures_iter(line) {
                let Some(names) = caps.get(1) else { continue };
                for name in names.as_str().split(',') {
                    let name = name.trim();
                    if !name.is_empty() && !preamble.packages.iter().any(|p| p == name) {
                        preamble.packages.push(name.to_string());
                    }
                }
            }
        }

        preamble
    }
}

/// Cut a line at its first unescaped `%`.
fn strip_comment(line: &str) -> &str {
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\\' => escaped = !escaped,
            '%' if !escaped => return &line[..idx],
            _ => escaped = false,
        }
    }
    line
}

fn normalize_list(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
