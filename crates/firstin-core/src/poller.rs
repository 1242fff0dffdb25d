use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::PollError;
use crate::job::Job;
use crate::traits::{JobAnalyzer, JobFetcher, JobFilter, Notifier, SeenStore};

/// Owns the full poll pipeline for a single company:
/// fetch → filter → freshness gate → dedup → notify → mark seen.
///
/// Generic over all collaborators via traits, enabling dependency injection
/// and testing without real HTTP or a real store.
pub struct CompanyPoller<F, P, S, N, A>
where
    F: JobFetcher,
    P: JobFilter,
    S: SeenStore,
    N: Notifier,
    A: JobAnalyzer,
{
    name: String,
    ats: String,
    fetcher: F,
    filter: P,
    store: S,
    notifier: N,
    analyzer: A,
    max_age: Duration,
}

impl<F, P, S, N, A> CompanyPoller<F, P, S, N, A>
where
    F: JobFetcher,
    P: JobFilter,
    S: SeenStore,
    N: Notifier,
    A: JobAnalyzer,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        ats: impl Into<String>,
        fetcher: F,
        filter: P,
        store: S,
        notifier: N,
        analyzer: A,
        max_age: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            ats: ats.into(),
            fetcher,
            filter,
            store,
            notifier,
            analyzer,
            max_age,
        }
    }

    /// Company display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// ATS family tag, used by the scheduler for grouping.
    pub fn ats(&self) -> &str {
        &self.ats
    }

    /// Run one poll cycle.
    ///
    /// On the very first run (empty store) every surviving job is committed
    /// without notifying: the silent seed that prevents an alert storm on
    /// first deployment. On later cycles survivors are analyzed, delivered in
    /// one notifier call, and committed only after that call succeeds, so a
    /// notifier failure is retried on the next cycle rather than lost.
    pub async fn poll(&self, cancel: CancellationToken) -> Result<(), PollError> {
        let seeding = self
            .store
            .is_empty()
            .await
            .map_err(|e| e.in_step(&self.name, "first-run probe"))?;

        let jobs = self
            .fetcher
            .fetch_jobs(cancel.clone())
            .await
            .map_err(|e| e.in_step(&self.name, "fetch"))?;
        let fetched = jobs.len();
        tracing::debug!(company = %self.name, total = fetched, "fetched jobs from API");

        // Freshness cutoff from wall clock; upstream clocks are trusted.
        // The comparison is strict: a job exactly max_age old is still fresh.
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.max_age)
                .map_err(|e| PollError::Config(e.to_string()))?;

        let mut matched: Vec<Job> = Vec::new();
        let (mut filtered_out, mut stale_out) = (0usize, 0usize);
        for job in jobs {
            if !self.filter.matches(&job) {
                filtered_out += 1;
                continue;
            }
            // Stale postings are dropped on normal cycles only; a seeding
            // cycle commits the whole board, and jobs with no timestamp
            // always pass.
            if !seeding && job.posted_at.is_some_and(|posted_at| posted_at < cutoff) {
                stale_out += 1;
                continue;
            }
            matched.push(job);
        }
        tracing::debug!(
            company = %self.name,
            fetched,
            filtered_out,
            stale_out,
            matched = matched.len(),
            "filter pipeline results"
        );
        let matched_count = matched.len();

        let mut new_jobs: Vec<Job> = Vec::new();
        for job in matched {
            let seen = self
                .store
                .has_seen(&job.id)
                .await
                .map_err(|e| e.in_step(&self.name, "dedup"))?;
            if !seen {
                new_jobs.push(job);
            }
        }

        if seeding {
            let seeded = new_jobs.len();
            for job in &new_jobs {
                self.store
                    .mark_seen(&job.id)
                    .await
                    .map_err(|e| e.in_step(&self.name, "seed commit"))?;
            }
            tracing::info!(
                company = %self.name,
                seeded,
                "initial seed: marked existing jobs as seen"
            );
            return Ok(());
        }

        let new_count = new_jobs.len();
        if !new_jobs.is_empty() {
            let mut delivered = Vec::with_capacity(new_jobs.len());
            for job in new_jobs {
                delivered.push(self.analyzer.analyze(cancel.clone(), job).await);
            }

            self.notifier
                .notify(&delivered)
                .await
                .map_err(|e| e.in_step(&self.name, "notify"))?;

            for job in &delivered {
                self.store
                    .mark_seen(&job.id)
                    .await
                    .map_err(|e| e.in_step(&self.name, "commit"))?;
            }
        }

        tracing::info!(
            company = %self.name,
            fetched,
            matched = matched_count,
            new = new_count,
            "polled company"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::testutil::{
        make_job_posted_at, make_jobs, AcceptAllFilter, MemoryStore, MockFetcher,
        RecordingAnalyzer, RecordingNotifier, RejectAllFilter,
    };
    use crate::traits::NopAnalyzer;

    const ONE_HOUR: Duration = Duration::from_secs(3600);

    fn poller<F: JobFetcher, P: JobFilter>(
        fetcher: F,
        filter: P,
        store: MemoryStore,
        notifier: RecordingNotifier,
    ) -> CompanyPoller<F, P, MemoryStore, RecordingNotifier, NopAnalyzer> {
        CompanyPoller::new(
            "testco",
            "test",
            fetcher,
            filter,
            store,
            notifier,
            NopAnalyzer,
            ONE_HOUR,
        )
    }

    #[tokio::test]
    async fn silent_seed_commits_without_notifying() {
        let now = Utc::now();
        let jobs: Vec<Job> = ["A", "B", "C"]
            .iter()
            .map(|id| make_job_posted_at(id, now - ChronoDuration::minutes(5)))
            .collect();
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let p = poller(
            MockFetcher::with_jobs(jobs),
            AcceptAllFilter,
            store.clone(),
            notifier.clone(),
        );

        p.poll(CancellationToken::new()).await.unwrap();

        assert_eq!(notifier.batch_count(), 0);
        assert_eq!(store.seen_ids(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn first_new_job_after_seed_is_delivered() {
        let now = Utc::now();
        let seed: Vec<Job> = ["A", "B", "C"]
            .iter()
            .map(|id| make_job_posted_at(id, now - ChronoDuration::minutes(5)))
            .collect();
        let fetcher = MockFetcher::with_jobs(seed.clone());
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let p = poller(fetcher.clone(), AcceptAllFilter, store.clone(), notifier.clone());

        p.poll(CancellationToken::new()).await.unwrap();
        assert_eq!(notifier.batch_count(), 0);

        let mut next = seed;
        next.push(make_job_posted_at("D", Utc::now() - ChronoDuration::minutes(2)));
        fetcher.set_jobs(next);

        p.poll(CancellationToken::new()).await.unwrap();

        assert_eq!(notifier.batch_count(), 1);
        assert_eq!(notifier.delivered_ids(), vec!["D"]);
        assert!(store.seen_ids().contains(&"D".to_string()));
    }

    #[tokio::test]
    async fn stale_jobs_are_rejected_on_non_seed_cycles() {
        let now = Utc::now();
        let jobs = vec![
            make_job_posted_at("Y", now - ChronoDuration::hours(2)),
            make_job_posted_at("Z", now - ChronoDuration::minutes(10)),
        ];
        let store = MemoryStore::with_seen(&["X"]);
        let notifier = RecordingNotifier::new();
        let p = poller(
            MockFetcher::with_jobs(jobs),
            AcceptAllFilter,
            store.clone(),
            notifier.clone(),
        );

        p.poll(CancellationToken::new()).await.unwrap();

        assert_eq!(notifier.batch_count(), 1);
        assert_eq!(notifier.delivered_ids(), vec!["Z"]);
        let seen = store.seen_ids();
        assert!(!seen.contains(&"Y".to_string()));
        assert!(seen.contains(&"Z".to_string()));
    }

    #[tokio::test]
    async fn missing_posted_at_passes_the_freshness_gate() {
        let store = MemoryStore::with_seen(&["X"]);
        let notifier = RecordingNotifier::new();
        let p = poller(
            MockFetcher::with_jobs(make_jobs(&["no-timestamp"])),
            AcceptAllFilter,
            store.clone(),
            notifier.clone(),
        );

        p.poll(CancellationToken::new()).await.unwrap();

        assert_eq!(notifier.delivered_ids(), vec!["no-timestamp"]);
    }

    #[tokio::test]
    async fn filter_rejects_before_dedup() {
        let store = MemoryStore::with_seen(&["X"]);
        let notifier = RecordingNotifier::new();
        let p = poller(
            MockFetcher::with_jobs(make_jobs(&["1", "2"])),
            RejectAllFilter,
            store.clone(),
            notifier.clone(),
        );

        p.poll(CancellationToken::new()).await.unwrap();

        assert_eq!(notifier.batch_count(), 0);
        assert_eq!(store.seen_ids(), vec!["X"]);
    }

    #[tokio::test]
    async fn already_seen_jobs_are_not_redelivered() {
        let store = MemoryStore::with_seen(&["2"]);
        let notifier = RecordingNotifier::new();
        let p = poller(
            MockFetcher::with_jobs(make_jobs(&["1", "2", "3"])),
            AcceptAllFilter,
            store.clone(),
            notifier.clone(),
        );

        p.poll(CancellationToken::new()).await.unwrap();

        assert_eq!(notifier.delivered_ids(), vec!["1", "3"]);
    }

    #[tokio::test]
    async fn repolling_identical_board_delivers_nothing() {
        let store = MemoryStore::with_seen(&["seeded"]);
        let notifier = RecordingNotifier::new();
        let p = poller(
            MockFetcher::with_jobs(make_jobs(&["1", "2"])),
            AcceptAllFilter,
            store.clone(),
            notifier.clone(),
        );

        p.poll(CancellationToken::new()).await.unwrap();
        assert_eq!(notifier.batch_count(), 1);

        p.poll(CancellationToken::new()).await.unwrap();
        assert_eq!(notifier.batch_count(), 1, "second identical cycle must deliver nothing");
    }

    #[tokio::test]
    async fn fetch_error_has_no_side_effects() {
        let store = MemoryStore::with_seen(&["X"]);
        let notifier = RecordingNotifier::new();
        let p = poller(
            MockFetcher::always_failing(|| PollError::Transport {
                status: 503,
                retry_after: None,
                message: "unavailable".into(),
            }),
            AcceptAllFilter,
            store.clone(),
            notifier.clone(),
        );

        let err = p.poll(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("polling testco"));
        assert_eq!(notifier.batch_count(), 0);
        assert_eq!(store.seen_ids(), vec!["X"]);
    }

    #[tokio::test]
    async fn notifier_failure_leaves_jobs_uncommitted_for_retry() {
        let store = MemoryStore::with_seen(&["X"]);
        let notifier = RecordingNotifier::new();
        notifier.fail_with("webhook down");
        let p = poller(
            MockFetcher::with_jobs(make_jobs(&["1"])),
            AcceptAllFilter,
            store.clone(),
            notifier.clone(),
        );

        let err = p.poll(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            PollError::Context { step: "notify", .. }
        ));
        assert_eq!(store.seen_ids(), vec!["X"], "no commit after failed notify");

        // The webhook recovers; the same job is delivered on the next cycle.
        let notifier_ok = RecordingNotifier::new();
        let p = poller(
            MockFetcher::with_jobs(make_jobs(&["1"])),
            AcceptAllFilter,
            store.clone(),
            notifier_ok.clone(),
        );
        p.poll(CancellationToken::new()).await.unwrap();
        assert_eq!(notifier_ok.delivered_ids(), vec!["1"]);
        assert!(store.seen_ids().contains(&"1".to_string()));
    }

    #[tokio::test]
    async fn store_error_during_commit_aborts_the_cycle() {
        let store = MemoryStore::with_seen(&["X"]);
        let notifier = RecordingNotifier::new();
        let p = poller(
            MockFetcher::with_jobs(make_jobs(&["1"])),
            AcceptAllFilter,
            store.clone(),
            notifier.clone(),
        );
        store.fail_marks("disk full");

        let err = p.poll(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PollError::Context { step: "commit", .. }));
        // The notify already happened; a duplicate alert on the next cycle
        // is the accepted trade-off against silent loss.
        assert_eq!(notifier.batch_count(), 1);
    }

    #[tokio::test]
    async fn empty_first_fetch_keeps_seeding_until_a_commit() {
        let fetcher = MockFetcher::with_jobs(vec![]);
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let p = poller(fetcher.clone(), AcceptAllFilter, store.clone(), notifier.clone());

        p.poll(CancellationToken::new()).await.unwrap();
        assert!(store.is_empty().await.unwrap());

        // The board now has very old postings; this is still a seed cycle.
        fetcher.set_jobs(vec![make_job_posted_at(
            "old",
            Utc::now() - ChronoDuration::hours(48),
        )]);
        p.poll(CancellationToken::new()).await.unwrap();

        assert_eq!(notifier.batch_count(), 0);
        assert_eq!(store.seen_ids(), vec!["old"]);
    }

    #[tokio::test]
    async fn analyzer_runs_once_per_delivered_job_and_not_on_seed() {
        let analyzer = RecordingAnalyzer::new();
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let fetcher = MockFetcher::with_jobs(make_jobs(&["1", "2"]));
        let p = CompanyPoller::new(
            "testco",
            "test",
            fetcher.clone(),
            AcceptAllFilter,
            store.clone(),
            notifier.clone(),
            analyzer.clone(),
            ONE_HOUR,
        );

        p.poll(CancellationToken::new()).await.unwrap();
        assert!(analyzer.analyzed_ids().is_empty(), "seed cycle must not analyze");

        fetcher.set_jobs(make_jobs(&["1", "2", "3"]));
        p.poll(CancellationToken::new()).await.unwrap();

        assert_eq!(analyzer.analyzed_ids(), vec!["3"]);
    }

    #[tokio::test]
    async fn exact_cutoff_age_is_still_fresh() {
        let max_age = Duration::from_secs(3600);
        let store = MemoryStore::with_seen(&["X"]);
        let notifier = RecordingNotifier::new();
        // Posted slightly inside the window; an exact-boundary job cannot be
        // constructed deterministically against a live clock, so probe just
        // inside and just outside instead.
        let jobs = vec![
            make_job_posted_at("inside", Utc::now() - ChronoDuration::seconds(3599)),
            make_job_posted_at("outside", Utc::now() - ChronoDuration::seconds(3700)),
        ];
        let p = CompanyPoller::new(
            "testco",
            "test",
            MockFetcher::with_jobs(jobs),
            AcceptAllFilter,
            store,
            notifier.clone(),
            NopAnalyzer,
            max_age,
        );

        p.poll(CancellationToken::new()).await.unwrap();
        assert_eq!(notifier.delivered_ids(), vec!["inside"]);
    }
}
