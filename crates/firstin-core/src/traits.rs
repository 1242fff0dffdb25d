use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::PollError;
use crate::job::Job;

/// Fetches every currently-listed posting for one configured board.
///
/// Implementations own pagination and normalization into [`Job`], and must
/// carry publication timestamps into `posted_at` when the upstream provides
/// them. Cancellation is observed at every HTTP round trip.
pub trait JobFetcher: Send + Sync {
    fn fetch_jobs(
        &self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Vec<Job>, PollError>> + Send;
}

/// Optional capability: enrich one job with detail-endpoint data.
///
/// Adapters without a detail endpoint simply do not implement this; callers
/// feature-test before using it.
pub trait DetailFetcher: Send + Sync {
    fn fetch_job_detail(
        &self,
        cancel: CancellationToken,
        job: Job,
    ) -> impl Future<Output = Result<Job, PollError>> + Send;
}

/// Durable mapping from job identifier to first-observation timestamp.
///
/// Shared by every poller; implementations serialize their own reads and
/// writes. `mark_seen` is idempotent.
pub trait SeenStore: Send + Sync + Clone {
    fn has_seen(&self, job_id: &str) -> impl Future<Output = Result<bool, PollError>> + Send;

    fn mark_seen(&self, job_id: &str) -> impl Future<Output = Result<(), PollError>> + Send;

    /// Delete entries first seen longer than `older_than` ago.
    fn prune(&self, older_than: Duration) -> impl Future<Output = Result<u64, PollError>> + Send;

    /// Emptiness probe used to detect first runs.
    fn is_empty(&self) -> impl Future<Output = Result<bool, PollError>> + Send;
}

/// Delivers a batch of newly-seen jobs to the outside world.
///
/// The call is atomic from the poller's view: success means every identifier
/// in the batch may be committed.
pub trait Notifier: Send + Sync + Clone {
    fn notify(&self, jobs: &[Job]) -> impl Future<Output = Result<(), PollError>> + Send;
}

/// Enriches a job with generated insights.
///
/// Must be pure with respect to the job value and must never fail
/// catastrophically: on error, implementations return the job unchanged.
pub trait JobAnalyzer: Send + Sync + Clone {
    fn analyze(
        &self,
        cancel: CancellationToken,
        job: Job,
    ) -> impl Future<Output = Job> + Send;
}

/// Analyzer used when enrichment is disabled: returns the job unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopAnalyzer;

impl JobAnalyzer for NopAnalyzer {
    async fn analyze(&self, _cancel: CancellationToken, job: Job) -> Job {
        job
    }
}

/// Decides whether a job matches the user's criteria.
pub trait JobFilter: Send + Sync {
    fn matches(&self, job: &Job) -> bool;
}
