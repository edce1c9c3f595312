//! Up-front complexity estimation.
//!
//! The engine asks an estimator once per run to decide whether decomposition
//! is worth it at all and to size the fallback single subtask. The stock
//! [`HeuristicEstimator`] is deliberately crude: text length, structural
//! density and a keyword scan, each normalised to [0,1].

use std::collections::BTreeMap;

use serde::Serialize;

/// Overall score plus the factor breakdown that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct ComplexityEstimate {
    pub overall: f64,
    pub factors: BTreeMap<String, f64>,
}

pub trait ComplexityEstimator: Send + Sync {
    fn estimate(&self, task_text: &str) -> ComplexityEstimate;
}

/// Text-statistics estimator; no model call involved.
#[derive(Debug, Clone, Default)]
pub struct HeuristicEstimator;

/// Words that usually signal a heavyweight task.
const HEAVY_KEYWORDS: &[&str] = &[
    "async",
    "cache",
    "compiler",
    "concurrent",
    "database",
    "distributed",
    "encrypt",
    "migrate",
    "optimi",
    "parallel",
    "parser",
    "protocol",
    "refactor",
    "scheduler",
    "stream",
];

impl ComplexityEstimator for HeuristicEstimator {
    fn estimate(&self, task_text: &str) -> ComplexityEstimate {
        let length = (task_text.chars().count() as f64 / 800.0).min(1.0);

        let bullet_lines = task_text
            .lines()
            .filter(|line| {
                let trimmed = line.trim_start();
                trimmed.starts_with('-')
                    || trimmed.starts_with('*')
                    || trimmed
                        .chars()
                        .next()
                        .map(|c| c.is_ascii_digit())
                        .unwrap_or(false)
            })
            .count();
        let connectives = task_text
            .split_whitespace()
            .filter(|word| matches!(word.to_lowercase().as_str(), "and" | "then" | "also"))
            .count();
        let structure = ((bullet_lines + connectives) as f64 / 8.0).min(1.0);

        let lower = task_text.to_lowercase();
        let keyword_hits = HEAVY_KEYWORDS
            .iter()
            .filter(|keyword| lower.contains(*keyword))
            .count();
        let keywords = (keyword_hits as f64 / 4.0).min(1.0);

        let overall = (0.4 * length + 0.3 * structure + 0.3 * keywords).clamp(0.0, 1.0);

        let mut factors = BTreeMap::new();
        factors.insert("length".to_string(), length);
        factors.insert("structure".to_string(), structure);
        factors.insert("keywords".to_string(), keywords);

        ComplexityEstimate { overall, factors }
    }
}
