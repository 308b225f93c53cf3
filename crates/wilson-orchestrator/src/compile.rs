//! Compile-error diagnostics parsing.
//!
//! Compiler output is matched line-by-line against the
//! `<path>:<line>[:<col>]: <message>` shape shared by Go and most C-like
//! toolchains. URL-shaped lines never count as locations.

use regex::Regex;
use std::sync::OnceLock;

/// Parsed summary of a compiler's stderr.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileDiagnostics {
    /// Distinct offending files, in first-seen order.
    pub files: Vec<String>,
    /// Number of error lines carrying a location.
    pub error_count: usize,
}

impl CompileDiagnostics {
    pub fn affected_file_count(&self) -> usize {
        self.files.len()
    }
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // path:line(:col)?: message — path must carry an extension and no spaces.
        Regex::new(r"^(?P<path>[^\s:]+\.\w+):(?P<line>\d+)(?::(?P<col>\d+))?:\s*(?P<msg>\S.*)$")
            .unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

/// Parse every located error in a compiler's output.
pub fn parse_compile_errors(stderr: &str) -> CompileDiagnostics {
    let mut diagnostics = CompileDiagnostics::default();
    for line in stderr.lines() {
        let line = line.trim();
        if line.contains("://") {
            continue; // URL, not a file location
        }
        if let Some(caps) = location_pattern().captures(line) {
            let path = caps["path"].to_string();
            if !diagnostics.files.contains(&path) {
                diagnostics.files.push(path);
            }
            diagnostics.error_count += 1;
        }
    }
    diagnostics
}

/// The file named by the first offending line, if any.
///
/// This is what `LoadRequiredFiles` uses to decide which file content to
/// inject for a compile-error task.
pub fn extract_error_file(stderr: &str) -> Option<String> {
    parse_compile_errors(stderr).files.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file() {
        let stderr = "user.go:17:10: undefined: fmt";
        let diag = parse_compile_errors(stderr);
        assert_eq!(diag.files, vec!["user.go"]);
        assert_eq!(diag.error_count, 1);
        assert_eq!(extract_error_file(stderr).as_deref(), Some("user.go"));
    }

    #[test]
    fn test_absolute_path() {
        let stderr = "/tmp/proj/user.go:3:1: syntax error: unexpected }";
        assert_eq!(extract_error_file(stderr).as_deref(), Some("/tmp/proj/user.go"));
    }

    #[test]
    fn test_relative_path() {
        let stderr = "pkg/util/helpers.go:9:2: imported and not used: \"os\"";
        assert_eq!(extract_error_file(stderr).as_deref(), Some("pkg/util/helpers.go"));
    }

    #[test]
    fn test_multi_line_takes_first_file() {
        let stderr = "\
# example.com/proj
user.go:17:10: undefined: fmt
user.go:20:3: undefined: fmt
store.go:5:1: expected declaration";
        let diag = parse_compile_errors(stderr);
        assert_eq!(diag.files, vec!["user.go", "store.go"]);
        assert_eq!(diag.error_count, 3);
        assert_eq!(extract_error_file(stderr).as_deref(), Some("user.go"));
    }

    #[test]
    fn test_url_rejected() {
        let stderr = "see https://golang.org/doc/faq.html:1:2: for details";
        assert_eq!(extract_error_file(stderr), None);
        assert_eq!(parse_compile_errors(stderr).error_count, 0);
    }

    #[test]
    fn test_build_failed_without_locations() {
        let stderr = "build failed: exit status 2";
        let diag = parse_compile_errors(stderr);
        assert!(diag.files.is_empty());
        assert_eq!(extract_error_file(stderr), None);
    }

    #[test]
    fn test_line_without_column() {
        let stderr = "main.go:4: undefined name";
        let diag = parse_compile_errors(stderr);
        assert_eq!(diag.files, vec!["main.go"]);
    }
}
