use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;

use codeloom::dag::subtask::DraftSubtask;
use codeloom::decompose::Decomposer;
use codeloom::exec::backend::{
    Backend, BackendError, BackendErrorKind, BackendRequest, BackendResponse,
};
use codeloom::progress::ProgressSink;
use codeloom::snippets::{Snippet, SnippetLookup};

/// Scripted behaviour for one subtask id.
#[derive(Clone)]
pub enum Reply {
    /// Succeed with this text.
    Ok(String),
    /// Fail every attempt with this error.
    Fail(BackendErrorKind, String),
    /// Rate-limit the first `times` attempts, then succeed with the text.
    RateLimitedTimes { times: usize, then: String },
    /// Never resolve. The caller's deadline or cancel flag has to end it.
    Hang,
}

enum Effective {
    Ok(String),
    Err(BackendErrorKind, String),
    Hang,
}

/// A fake backend that:
/// - records invocation order, prompts and peak concurrency
/// - returns scripted replies per subtask id (default: a generic success).
pub struct FakeBackend {
    id: String,
    delay: Duration,
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    prompts: Mutex<HashMap<String, String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeBackend {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            delay: Duration::ZERO,
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Hold every call for this long before replying. Lets tests observe
    /// overlapping dispatches.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(&self, subtask_id: &str, reply: Reply) {
        let mut replies = self.replies.lock().unwrap();
        replies.insert(subtask_id.to_string(), reply);
    }

    pub fn ok(&self, subtask_id: &str, text: &str) {
        self.script(subtask_id, Reply::Ok(text.to_string()));
    }

    pub fn fail(&self, subtask_id: &str, kind: BackendErrorKind, message: &str) {
        self.script(subtask_id, Reply::Fail(kind, message.to_string()));
    }

    pub fn rate_limited_times(&self, subtask_id: &str, times: usize, then: &str) {
        self.script(
            subtask_id,
            Reply::RateLimitedTimes {
                times,
                then: then.to_string(),
            },
        );
    }

    pub fn hang(&self, subtask_id: &str) {
        self.script(subtask_id, Reply::Hang);
    }

    /// Invocation starts, in order, retries included.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, subtask_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == subtask_id)
            .count()
    }

    /// Peak number of simultaneously in-flight invocations.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// The prompt from the most recent invocation for this subtask.
    pub fn prompt_for(&self, subtask_id: &str) -> Option<String> {
        self.prompts.lock().unwrap().get(subtask_id).cloned()
    }

    fn record_start(&self, request: &BackendRequest) {
        self.calls.lock().unwrap().push(request.subtask_id.clone());
        self.prompts
            .lock()
            .unwrap()
            .insert(request.subtask_id.clone(), request.prompt.clone());
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(current, Ordering::SeqCst);
    }

    fn effective_reply(&self, subtask_id: &str) -> Effective {
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(subtask_id) {
            Some(Reply::Ok(text)) => Effective::Ok(text.clone()),
            Some(Reply::Fail(kind, message)) => Effective::Err(*kind, message.clone()),
            Some(Reply::RateLimitedTimes { times, then }) => {
                if *times == 0 {
                    Effective::Ok(then.clone())
                } else {
                    *times -= 1;
                    Effective::Err(BackendErrorKind::RateLimited, "quota exceeded".to_string())
                }
            }
            Some(Reply::Hang) => Effective::Hang,
            None => Effective::Ok(default_output(subtask_id)),
        }
    }
}

struct ActiveGuard<'a> {
    backend: &'a FakeBackend,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.backend.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Backend for FakeBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn invoke(
        &self,
        request: BackendRequest,
        _cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = Result<BackendResponse, BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.record_start(&request);
            let _guard = ActiveGuard { backend: self };
            let outcome = self.effective_reply(&request.subtask_id);

            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }

            match outcome {
                Effective::Ok(text) => Ok(BackendResponse {
                    text,
                    usage: Some(10),
                }),
                Effective::Err(kind, message) => Err(BackendError::new(kind, message)),
                Effective::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!("pending future resolved")
                }
            }
        })
    }
}

/// Default output for unscripted subtasks. Long enough and plain enough to
/// pass merge validation for unclassified kinds.
fn default_output(subtask_id: &str) -> String {
    format!("generated output for {subtask_id}")
}

/// Scripted decomposition result.
pub enum DecomposeScript {
    Drafts(Vec<DraftSubtask>),
    Empty,
    Fails(String),
}

/// A decomposer that replies from a script and counts invocations.
pub struct FakeDecomposer {
    script: DecomposeScript,
    calls: AtomicUsize,
}

impl FakeDecomposer {
    pub fn new(script: DecomposeScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn drafts(drafts: Vec<DraftSubtask>) -> Self {
        Self::new(DecomposeScript::Drafts(drafts))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decomposer for FakeDecomposer {
    fn decompose(
        &self,
        _task_text: String,
        _cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<DraftSubtask>>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match &self.script {
            DecomposeScript::Drafts(drafts) => Ok(drafts.clone()),
            DecomposeScript::Empty => Ok(Vec::new()),
            DecomposeScript::Fails(message) => Err(anyhow::anyhow!("{message}")),
        };
        Box::pin(async move { result })
    }
}

/// One recorded progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Progress(String, u8),
    Complete(String, String),
    Fail(String, String),
}

/// A progress sink that records every notification.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn completed_ids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Complete(id, _) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Fail(id, _) => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for CollectingSink {
    fn on_progress(&self, subtask_id: &str, percent: u8) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Progress(subtask_id.to_string(), percent));
    }

    fn on_complete(&self, subtask_id: &str, output: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Complete(subtask_id.to_string(), output.to_string()));
    }

    fn on_fail(&self, subtask_id: &str, reason: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Fail(subtask_id.to_string(), reason.to_string()));
    }
}

/// A snippet lookup that serves a fixed list and records queries.
pub struct StaticSnippets {
    snippets: Vec<Snippet>,
    queries: Mutex<Vec<String>>,
}

impl StaticSnippets {
    pub fn new(snippets: Vec<Snippet>) -> Self {
        Self {
            snippets,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl SnippetLookup for StaticSnippets {
    fn lookup(
        &self,
        query: String,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<Snippet>> + Send + '_>> {
        self.queries.lock().unwrap().push(query);
        let snippets: Vec<Snippet> = self.snippets.iter().take(limit).cloned().collect();
        Box::pin(async move { snippets })
    }
}
