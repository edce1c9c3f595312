// src/decompose/parse.rs

//! Parser chain for decomposition responses.
//!
//! Backends answer in whatever shape they feel like, so parsing is an ordered
//! list of strategies, each either producing drafts or passing:
//!
//! 1. the whole response as a JSON array (or `{"subtasks": [...]}`)
//! 2. the first code-fenced block that parses the same way
//! 3. labeled `subtask:` sections picked out by regex
//!
//! A strategy never errors, it just declines; only when every strategy
//! declines is the response [`Unparseable`](ParseOutcome::Unparseable).

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::dag::subtask::{DraftSubtask, SubtaskKind};

/// Result of running the chain.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Parsed(Vec<DraftSubtask>),
    Unparseable,
}

/// Try each strategy in order and return the first hit.
pub fn parse_draft_list(text: &str) -> ParseOutcome {
    let strategies: [(&str, fn(&str) -> Option<Vec<DraftSubtask>>); 3] = [
        ("json", parse_json),
        ("fenced-json", parse_fenced_json),
        ("labeled-sections", parse_labeled_sections),
    ];

    for (name, strategy) in strategies {
        if let Some(drafts) = strategy(text) {
            debug!(strategy = name, count = drafts.len(), "response parsed");
            return ParseOutcome::Parsed(drafts);
        }
    }
    ParseOutcome::Unparseable
}

#[derive(Debug, Deserialize)]
struct DraftListWrapper {
    subtasks: Vec<DraftSubtask>,
}

/// The whole text is a JSON array of drafts, or an object wrapping one.
fn parse_json(text: &str) -> Option<Vec<DraftSubtask>> {
    let trimmed = text.trim();
    if let Ok(drafts) = serde_json::from_str::<Vec<DraftSubtask>>(trimmed) {
        return non_empty(drafts);
    }
    if let Ok(wrapper) = serde_json::from_str::<DraftListWrapper>(trimmed) {
        return non_empty(wrapper.subtasks);
    }
    None
}

/// A code fence somewhere in the text holds the JSON.
fn parse_fenced_json(text: &str) -> Option<Vec<DraftSubtask>> {
    let fence = Regex::new(r"(?s)```(?:json)?\s*(.*?)```").ok()?;
    for captures in fence.captures_iter(text) {
        if let Some(block) = captures.get(1) {
            if let Some(drafts) = parse_json(block.as_str()) {
                return Some(drafts);
            }
        }
    }
    None
}

/// Plain-text sections of the form:
///
/// ```text
/// subtask: parser
/// description: build the tokenizer and parser
/// depends: (none)
/// complexity: 0.6
/// kind: module
/// ```
fn parse_labeled_sections(text: &str) -> Option<Vec<DraftSubtask>> {
    let header = Regex::new(r"(?im)^[\s#*>-]*subtask(?:\s+\d+)?\s*:\s*(\S+)\s*$").ok()?;
    let description = Regex::new(r"(?im)^\s*description\s*:\s*(.+)$").ok()?;
    let depends = Regex::new(r"(?im)^\s*(?:depends(?:\s+on)?|dependencies|deps)\s*:\s*(.+)$").ok()?;
    let complexity = Regex::new(r"(?im)^\s*complexity\s*:\s*([0-9.]+)").ok()?;
    let kind = Regex::new(r"(?im)^\s*kind\s*:\s*([a-zA-Z]+)").ok()?;
    let work_units = Regex::new(r"(?im)^\s*work[_\s]?units\s*:\s*([0-9]+)").ok()?;

    // Each header owns the text up to the next header.
    let mut spans: Vec<(String, usize)> = Vec::new();
    for captures in header.captures_iter(text) {
        let id = captures.get(1)?.as_str().to_string();
        let end = captures.get(0)?.end();
        spans.push((id, end));
    }
    if spans.is_empty() {
        return None;
    }

    let mut drafts = Vec::with_capacity(spans.len());
    for (i, (id, body_start)) in spans.iter().enumerate() {
        let body_end = spans
            .get(i + 1)
            .map(|(_, next_start)| *next_start)
            .unwrap_or(text.len());
        let body = &text[*body_start..body_end];

        let mut draft = DraftSubtask::new(id.clone(), String::new());
        draft.description = description
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| id.clone());

        if let Some(value) = depends.captures(body).and_then(|c| c.get(1)) {
            draft.dependencies = value
                .as_str()
                .split([',', ' '])
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .filter(|d| !matches!(d.to_lowercase().as_str(), "none" | "(none)" | "-"))
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = complexity.captures(body).and_then(|c| c.get(1)) {
            if let Ok(parsed) = value.as_str().parse::<f64>() {
                draft.complexity = parsed;
            }
        }
        if let Some(value) = kind.captures(body).and_then(|c| c.get(1)) {
            draft.kind = SubtaskKind::parse_lenient(value.as_str());
        }
        if let Some(value) = work_units.captures(body).and_then(|c| c.get(1)) {
            if let Ok(parsed) = value.as_str().parse::<u32>() {
                draft.work_units = parsed;
            }
        }

        drafts.push(draft);
    }

    non_empty(drafts)
}

fn non_empty(drafts: Vec<DraftSubtask>) -> Option<Vec<DraftSubtask>> {
    if drafts.is_empty() { None } else { Some(drafts) }
}
