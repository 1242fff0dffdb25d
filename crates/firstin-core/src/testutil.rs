//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing assertions on recorded
//! calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::PollError;
use crate::job::Job;
use crate::traits::{JobAnalyzer, JobFetcher, JobFilter, Notifier, SeenStore};

/// Build a test job with the given id and no timestamp.
pub fn make_job(id: &str) -> Job {
    Job {
        id: id.to_string(),
        company: "testco".to_string(),
        title: "Software Engineer".to_string(),
        location: "US".to_string(),
        url: format!("https://example.com/{id}"),
        posted_at: None,
        first_seen: None,
        source: "test".to_string(),
        detail: None,
        insights: None,
    }
}

/// Build a test job with the given id and publication timestamp.
pub fn make_job_posted_at(id: &str, posted_at: DateTime<Utc>) -> Job {
    let mut job = make_job(id);
    job.posted_at = Some(posted_at);
    job
}

/// Build a batch of test jobs from ids.
pub fn make_jobs(ids: &[&str]) -> Vec<Job> {
    ids.iter().map(|id| make_job(id)).collect()
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

type FetchResult = Result<Vec<Job>, PollError>;
type ErrorFactory = dyn Fn() -> PollError + Send + Sync;

/// Mock fetcher with a queue of canned responses.
///
/// Each call pops the front of the queue; when the queue is exhausted the
/// fallback applies (the `fallback_jobs` batch, or the error factory for
/// `always_failing`). An optional delay simulates a slow upstream.
#[derive(Clone)]
pub struct MockFetcher {
    responses: Arc<Mutex<Vec<FetchResult>>>,
    fallback_jobs: Arc<Mutex<Vec<Job>>>,
    error_factory: Option<Arc<ErrorFactory>>,
    delay: Option<Duration>,
    calls: Arc<Mutex<usize>>,
}

impl MockFetcher {
    /// Always return the same batch.
    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            fallback_jobs: Arc::new(Mutex::new(jobs)),
            error_factory: None,
            delay: None,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Pop queued responses in order, then fall back to an empty batch.
    pub fn with_responses(responses: Vec<FetchResult>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fallback_jobs: Arc::new(Mutex::new(Vec::new())),
            error_factory: None,
            delay: None,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Fail every call with a fresh error from the factory.
    pub fn always_failing<E>(factory: E) -> Self
    where
        E: Fn() -> PollError + Send + Sync + 'static,
    {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            fallback_jobs: Arc::new(Mutex::new(Vec::new())),
            error_factory: Some(Arc::new(factory)),
            delay: None,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Sleep before answering, to simulate a slow upstream.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the batch returned by subsequent calls.
    pub fn set_jobs(&self, jobs: Vec<Job>) {
        *self.fallback_jobs.lock().unwrap() = jobs;
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl JobFetcher for MockFetcher {
    async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
        *self.calls.lock().unwrap() += 1;

        if let Some(delay) = self.delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(PollError::cancelled()),
            }
        }

        {
            let mut responses = self.responses.lock().unwrap();
            if !responses.is_empty() {
                return responses.remove(0);
            }
        }
        if let Some(factory) = &self.error_factory {
            return Err(factory());
        }
        Ok(self.fallback_jobs.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Map-backed seen store with optional error injection.
#[derive(Clone, Default)]
pub struct MemoryStore {
    seen: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    mark_error: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store so a cycle is not a first run.
    pub fn with_seen(ids: &[&str]) -> Self {
        let store = Self::default();
        let mut seen = store.seen.lock().unwrap();
        for id in ids {
            seen.insert((*id).to_string(), Utc::now());
        }
        drop(seen);
        store
    }

    /// Make every subsequent `mark_seen` fail with a store error.
    pub fn fail_marks(&self, message: &str) {
        *self.mark_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn seen_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.seen.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl SeenStore for MemoryStore {
    async fn has_seen(&self, job_id: &str) -> Result<bool, PollError> {
        Ok(self.seen.lock().unwrap().contains_key(job_id))
    }

    async fn mark_seen(&self, job_id: &str) -> Result<(), PollError> {
        if let Some(msg) = self.mark_error.lock().unwrap().as_ref() {
            return Err(PollError::Store(msg.clone()));
        }
        self.seen
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn prune(&self, older_than: Duration) -> Result<u64, PollError> {
        let cutoff =
            Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let mut seen = self.seen.lock().unwrap();
        let before = seen.len();
        seen.retain(|_, first_seen| *first_seen >= cutoff);
        Ok((before - seen.len()) as u64)
    }

    async fn is_empty(&self) -> Result<bool, PollError> {
        Ok(self.seen.lock().unwrap().is_empty())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that records every delivered batch.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    batches: Arc<Mutex<Vec<Vec<Job>>>>,
    error: Arc<Mutex<Option<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `notify` fail without recording.
    pub fn fail_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn batches(&self) -> Vec<Vec<Job>> {
        self.batches.lock().unwrap().clone()
    }

    /// Ids across all recorded batches, in delivery order.
    pub fn delivered_ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|j| j.id.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, jobs: &[Job]) -> Result<(), PollError> {
        if let Some(msg) = self.error.lock().unwrap().as_ref() {
            return Err(PollError::Notify(msg.clone()));
        }
        self.batches.lock().unwrap().push(jobs.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingAnalyzer
// ---------------------------------------------------------------------------

/// Analyzer that records which jobs it saw and returns them unchanged.
#[derive(Clone, Default)]
pub struct RecordingAnalyzer {
    analyzed: Arc<Mutex<Vec<String>>>,
}

impl RecordingAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyzed_ids(&self) -> Vec<String> {
        self.analyzed.lock().unwrap().clone()
    }
}

impl JobAnalyzer for RecordingAnalyzer {
    async fn analyze(&self, _cancel: CancellationToken, job: Job) -> Job {
        self.analyzed.lock().unwrap().push(job.id.clone());
        job
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Filter that matches every job.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllFilter;

impl JobFilter for AcceptAllFilter {
    fn matches(&self, _job: &Job) -> bool {
        true
    }
}

/// Filter that rejects every job.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAllFilter;

impl JobFilter for RejectAllFilter {
    fn matches(&self, _job: &Job) -> bool {
        false
    }
}
