// src/snippets.rs

//! Optional code-snippet retrieval.
//!
//! When a [`SnippetLookup`] is wired into the engine, code-shaped subtasks get
//! a handful of relevant snippets appended to their prompt. Retrieval is
//! strictly best-effort: the trait cannot fail, and the engine timeboxes every
//! lookup so a slow index can never stall dispatch.

use std::future::Future;
use std::pin::Pin;

/// One retrieved snippet, labeled with where it came from.
#[derive(Debug, Clone)]
pub struct Snippet {
    pub path: String,
    pub content: String,
}

impl Snippet {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Source of reference snippets for prompt enrichment.
///
/// Implementations that hit an error should log it themselves and return an
/// empty list; a lookup failure must never fail a run.
pub trait SnippetLookup: Send + Sync {
    fn lookup(
        &self,
        query: String,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<Snippet>> + Send + '_>>;
}
