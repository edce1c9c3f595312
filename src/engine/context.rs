// src/engine/context.rs

//! Prompt assembly for one subtask dispatch.
//!
//! A subtask's prompt carries the top-level task for grounding, the subtask's
//! own description shaped by its kind, the outputs of its dependencies in
//! declaration order, and any reference snippets retrieval found.

use crate::dag::subtask::{Subtask, SubtaskKind};
use crate::snippets::Snippet;

fn kind_instruction(kind: SubtaskKind) -> &'static str {
    match kind {
        SubtaskKind::Function => "Implement this as a single function.",
        SubtaskKind::Method => "Implement this as a method on the type it belongs to.",
        SubtaskKind::Class => "Implement this as one class or type with its behaviour.",
        SubtaskKind::Interface => "Define the interface only; no implementation body.",
        SubtaskKind::Type => "Define the data type, including its fields.",
        SubtaskKind::Module => "Implement this as a self-contained module.",
        SubtaskKind::Test => "Write tests covering the described behaviour.",
        SubtaskKind::Other => "Produce the described artifact.",
    }
}

/// Build the full prompt for one subtask.
///
/// `dependencies` holds `(description, output)` pairs for every finished
/// dependency, already in dependency-declaration order.
pub fn build_prompt(
    task_text: &str,
    subtask: &Subtask,
    dependencies: &[(String, String)],
    snippets: &[Snippet],
) -> String {
    let mut prompt = String::new();

    prompt.push_str("You are implementing one part of a larger coding task.\n\n");
    prompt.push_str("Overall task:\n");
    prompt.push_str(task_text.trim());
    prompt.push_str("\n\n");

    prompt.push_str(&format!(
        "Your subtask: {}\n{}\n",
        subtask.description.trim(),
        kind_instruction(subtask.kind)
    ));

    if !dependencies.is_empty() {
        prompt.push_str("\nAlready completed, build on these:\n");
        for (description, output) in dependencies {
            prompt.push_str(&format!("\n## {}\n", description.trim()));
            prompt.push_str(output.trim());
            prompt.push('\n');
        }
    }

    if !snippets.is_empty() {
        prompt.push_str("\nReference snippets from the existing codebase:\n");
        for snippet in snippets {
            prompt.push_str(&format!("\n---- {} ----\n", snippet.path));
            prompt.push_str(snippet.content.trim_end());
            prompt.push('\n');
        }
    }

    prompt.push_str("\nRespond with only the artifact for your subtask, no commentary.\n");
    prompt
}
