//! Tool-call extraction from LLM responses.
//!
//! Models wrap calls in prose, markdown fences, or emit several in a row;
//! the parser scans for balanced JSON objects and keeps the ones shaped
//! like `{"tool": …, "arguments": …}`, in order of appearance.

use wilson_core::{ToolCall, WilsonError, WilsonResult};

/// Markers of a response that narrates code or effects instead of acting.
const NARRATION_MARKERS: &[&str] = &[
    "```",
    "i have created",
    "i've created",
    "i created",
    "i have written",
    "i've written",
    "i wrote",
    "here is the code",
    "here's the code",
    "here is the implementation",
    "the file now contains",
    "i have implemented",
    "i've implemented",
];

/// Extract every tool call embedded in `response`, in order.
pub fn extract_tool_calls(response: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let bytes = response.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = balanced_object_end(response, i) {
                if let Ok(call) = serde_json::from_str::<ToolCall>(&response[i..=end]) {
                    if !call.name.is_empty() {
                        calls.push(call);
                        i = end + 1;
                        continue;
                    }
                }
            }
        }
        i += 1;
    }
    calls
}

/// Whether a call-free response reads like the model describing work it
/// claims to have done.
pub fn looks_like_hallucination(response: &str) -> bool {
    let lower = response.to_lowercase();
    NARRATION_MARKERS.iter().any(|m| lower.contains(m))
}

/// Parse a response that is required to contain tool calls.
pub fn parse_tool_response(response: &str) -> WilsonResult<Vec<ToolCall>> {
    let calls = extract_tool_calls(response);
    if !calls.is_empty() {
        return Ok(calls);
    }
    if looks_like_hallucination(response) {
        Err(WilsonError::Hallucination(
            "response narrates code or results instead of emitting tool calls".to_string(),
        ))
    } else {
        Err(WilsonError::Generation(
            "no tool calls found in response".to_string(),
        ))
    }
}

/// Index of the `}` closing the object that starts at `start`, honouring
/// strings and escapes. `None` when unbalanced.
fn balanced_object_end(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_call() {
        let calls = extract_tool_calls(
            r#"{"tool": "write_file", "arguments": {"path": "fizzbuzz.go", "content": "package main"}}"#,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "write_file");
    }

    #[test]
    fn test_call_wrapped_in_prose() {
        let response = r#"I'll write the file now.

{"tool": "write_file", "arguments": {"path": "a.go", "content": "x"}}

That should do it."#;
        let calls = extract_tool_calls(response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arg_str("path"), Some("a.go"));
    }

    #[test]
    fn test_multiple_calls_in_order() {
        let response = r#"
{"tool": "create_directory", "arguments": {"path": "pkg"}}
{"tool": "write_file", "arguments": {"path": "pkg/a.go", "content": "package pkg"}}
{"tool": "compile_project", "arguments": {}}
"#;
        let calls = extract_tool_calls(response);
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["create_directory", "write_file", "compile_project"]);
    }

    #[test]
    fn test_call_inside_code_fence() {
        let response = "```json\n{\"tool\": \"read_file\", \"arguments\": {\"path\": \"a.go\"}}\n```";
        let calls = extract_tool_calls(response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
    }

    #[test]
    fn test_braces_inside_strings() {
        let response = r#"{"tool": "write_file", "arguments": {"path": "a.go", "content": "func main() { fmt.Println(\"{}\") }"}}"#;
        let calls = extract_tool_calls(response);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arg_str("content").unwrap().contains("{}"));
    }

    #[test]
    fn test_non_call_objects_ignored() {
        let response = r#"The config is {"debug": true}. Now: {"tool": "git_status", "arguments": {}}"#;
        let calls = extract_tool_calls(response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "git_status");
    }

    #[test]
    fn test_hallucination_detected() {
        let response = "I have created fizzbuzz.go with the following content:\n```go\npackage main\n```";
        assert!(extract_tool_calls(response).is_empty());
        let err = parse_tool_response(response).unwrap_err();
        assert!(matches!(err, WilsonError::Hallucination(_)));
    }

    #[test]
    fn test_plain_prose_is_generation_error() {
        let err = parse_tool_response("I am not sure what you mean.").unwrap_err();
        assert!(matches!(err, WilsonError::Generation(_)));
    }

    #[test]
    fn test_unbalanced_object() {
        assert!(extract_tool_calls(r#"{"tool": "write_file", "arguments": {"#).is_empty());
    }
}
