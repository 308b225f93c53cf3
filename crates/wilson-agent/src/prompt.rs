//! Prompt assembly: role fragment + tool schema for the system prompt,
//! task description + injected context for the user prompt.

use crate::kind::AgentKind;
use wilson_core::{ManagedTask, TaskContext};
use wilson_tools::ToolMetadata;

pub fn system_prompt(kind: AgentKind, tools: &[ToolMetadata]) -> String {
    let mut prompt = String::from(kind.role_fragment());
    prompt.push_str(
        "\n\nTo act, emit one JSON object per tool call, in execution order:\n\
         {\"tool\": \"<name>\", \"arguments\": {…}}\n\
         Only the tools listed below exist. When you are finished, reply \
         with plain text and no tool calls.\n\nAvailable tools:\n",
    );
    for meta in tools {
        prompt.push_str(&format!(
            "- {} ({}, {} risk): parameters {}\n",
            meta.name, meta.category, meta.risk_level, meta.parameters
        ));
        if let Some(example) = meta.examples.first() {
            prompt.push_str(&format!("  example: {example}\n"));
        }
    }
    prompt
}

/// Build the user prompt for a task, injecting whatever context the
/// manager prepared (file content for fix-mode, compile errors) plus the
/// textual content of declared dependency sources.
pub fn user_prompt(
    task: &ManagedTask,
    ctx: &TaskContext,
    dependency_sources: &[(String, String)],
) -> String {
    let mut prompt = format!("Task {}: {}\n\n{}\n", task.key, task.title, task.description);

    prompt.push_str(&format!("\nProject path: {}\n", ctx.project_path));
    if let Some(target) = task.target_file() {
        prompt.push_str(&format!("Target file: {target}\n"));
    }
    if task.fix_mode() {
        prompt.push_str(
            "Fix mode: make the smallest change that fixes the problem. \
             Do not rewrite the file.\n",
        );
    }
    if let Some(compile_error) = task.compile_error() {
        prompt.push_str(&format!("\nCompiler output to fix:\n{compile_error}\n"));
    }
    if let Some(content) = task.file_content() {
        if let Some(target) = task.target_file() {
            prompt.push_str(&format!(
                "\n--- CURRENT CONTENT OF {target} (numbered) ---\n{}--- END ---\n",
                numbered(&content)
            ));
        } else {
            prompt.push_str(&format!("\n--- FILE CONTENT ---\n{content}\n--- END ---\n"));
        }
    }

    // Declared dependency sources go in verbatim so the model extends
    // their symbols instead of redefining them.
    for (path, content) in dependency_sources {
        prompt.push_str(&format!(
            "\n--- DEPENDENCY SOURCE {path} (do not redefine its symbols) ---\n{content}\n--- END {path} ---\n"
        ));
    }

    if ctx.previous_attempts > 0 {
        prompt.push_str(&format!(
            "\nThis is retry attempt {}. Earlier attempts failed:\n",
            ctx.previous_attempts + 1
        ));
        for err in ctx.errors.iter().rev().take(3) {
            prompt.push_str(&format!("- [{}] {}: {}\n", err.phase, err.error_type, err.message));
        }
    }

    prompt
}

/// Continuation message carrying the rolling tool-output buffer.
pub fn continuation_prompt(tool_outputs: &str) -> String {
    format!(
        "Tool results so far:\n{tool_outputs}\n\
         Continue with further tool calls, or reply with a plain-text summary if the task is complete."
    )
}

/// Stricter re-ask after a response that failed tool-call parsing.
pub fn reask_prompt() -> String {
    "Your previous reply contained no valid tool call. Respond with ONLY \
     JSON tool calls of the form {\"tool\": \"<name>\", \"arguments\": {…}} — \
     no prose, no code fences."
        .to_string()
}

fn numbered(content: &str) -> String {
    let mut out = String::new();
    for (idx, line) in content.lines().enumerate() {
        out.push_str(&format!("{:>4} | {line}\n", idx + 1));
    }
    out
}
