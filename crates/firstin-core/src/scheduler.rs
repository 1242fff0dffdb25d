use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::poller::CompanyPoller;
use crate::traits::{JobAnalyzer, JobFetcher, JobFilter, Notifier, SeenStore};

/// Runs one long-lived task per ATS group.
///
/// Each task polls its companies sequentially with a minimum delay between
/// same-ATS requests, then sleeps the polling interval before the next pass.
/// Rate limiting toward one backend is structural: it falls out of the
/// sequential loop, not from shared state. Groups never block each other.
pub struct Scheduler<F, P, S, N, A>
where
    F: JobFetcher,
    P: JobFilter,
    S: SeenStore,
    N: Notifier,
    A: JobAnalyzer,
{
    pollers: Vec<CompanyPoller<F, P, S, N, A>>,
    interval: Duration,
    min_delay: Duration,
    ats_delays: HashMap<String, Duration>,
}

impl<F, P, S, N, A> Scheduler<F, P, S, N, A>
where
    F: JobFetcher + 'static,
    P: JobFilter + 'static,
    S: SeenStore + 'static,
    N: Notifier + 'static,
    A: JobAnalyzer + 'static,
{
    pub fn new(
        pollers: Vec<CompanyPoller<F, P, S, N, A>>,
        interval: Duration,
        min_delay: Duration,
        ats_delays: HashMap<String, Duration>,
    ) -> Self {
        Self {
            pollers,
            interval,
            min_delay,
            ats_delays,
        }
    }

    /// The per-ATS delay override if configured, otherwise the global minimum.
    fn min_delay_for(&self, ats: &str) -> Duration {
        self.ats_delays.get(ats).copied().unwrap_or(self.min_delay)
    }

    /// Partition pollers by ATS tag, preserving config order within each
    /// group and the order in which groups first appear.
    #[allow(clippy::type_complexity)]
    fn group_by_ats(
        pollers: Vec<CompanyPoller<F, P, S, N, A>>,
    ) -> Vec<(String, Vec<CompanyPoller<F, P, S, N, A>>)> {
        let mut groups: Vec<(String, Vec<CompanyPoller<F, P, S, N, A>>)> = Vec::new();
        for poller in pollers {
            let ats = poller.ats().to_string();
            match groups.iter_mut().find(|(tag, _)| *tag == ats) {
                Some((_, members)) => members.push(poller),
                None => groups.push((ats, vec![poller])),
            }
        }
        groups
    }

    /// Run until the token is cancelled. Returns once every group worker has
    /// observed the cancellation and exited.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            min_delay_secs = self.min_delay.as_secs(),
            ats_overrides = self.ats_delays.len(),
            companies = self.pollers.len(),
            "starting scheduler"
        );

        let groups = Self::group_by_ats(std::mem::take(&mut self.pollers));

        let mut handles = Vec::with_capacity(groups.len());
        for (ats, members) in groups {
            let delay = self.min_delay_for(&ats);
            let token = cancel.clone();
            handles.push(tokio::spawn(Self::run_group(
                ats,
                members,
                self.interval,
                delay,
                token,
            )));
        }

        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("scheduler stopped");
    }

    /// Poll loop for one ATS group: each company in order with the group's
    /// minimum delay between them (never after the last), then the polling
    /// interval before the next full pass. Every sleep and the loop head
    /// observe the cancellation token.
    async fn run_group(
        ats: String,
        pollers: Vec<CompanyPoller<F, P, S, N, A>>,
        interval: Duration,
        min_delay: Duration,
        cancel: CancellationToken,
    ) {
        tracing::debug!(ats = %ats, companies = pollers.len(), "group worker started");
        loop {
            for (i, poller) in pollers.iter().enumerate() {
                if cancel.is_cancelled() {
                    return;
                }
                if let Err(err) = poller.poll(cancel.clone()).await {
                    if err.is_cancelled() {
                        tracing::debug!(company = %poller.name(), ats = %ats, "poll cancelled");
                    } else {
                        tracing::error!(
                            company = %poller.name(),
                            ats = %ats,
                            error = %err,
                            "poll failed"
                        );
                    }
                }
                if i < pollers.len() - 1 {
                    tokio::select! {
                        () = tokio::time::sleep(min_delay) => {}
                        () = cancel.cancelled() => return,
                    }
                }
            }
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = cancel.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use super::*;
    use crate::error::PollError;
    use crate::job::Job;
    use crate::testutil::{AcceptAllFilter, MemoryStore, RecordingNotifier};
    use crate::traits::NopAnalyzer;

    /// Fetcher that records when each call started, optionally sleeping to
    /// simulate a slow upstream.
    #[derive(Clone)]
    struct TimedFetcher {
        label: String,
        log: Arc<Mutex<Vec<(String, Instant)>>>,
        delay: Duration,
        fail: bool,
    }

    impl TimedFetcher {
        fn new(label: &str, log: Arc<Mutex<Vec<(String, Instant)>>>) -> Self {
            Self {
                label: label.to_string(),
                log,
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl JobFetcher for TimedFetcher {
        async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
            self.log
                .lock()
                .unwrap()
                .push((self.label.clone(), Instant::now()));
            if !self.delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(self.delay) => {}
                    () = cancel.cancelled() => return Err(PollError::cancelled()),
                }
            }
            if self.fail {
                return Err(PollError::Network("injected".into()));
            }
            Ok(vec![])
        }
    }

    type TestPoller =
        CompanyPoller<TimedFetcher, AcceptAllFilter, MemoryStore, RecordingNotifier, NopAnalyzer>;

    fn test_poller(name: &str, ats: &str, fetcher: TimedFetcher) -> TestPoller {
        CompanyPoller::new(
            name,
            ats,
            fetcher,
            AcceptAllFilter,
            MemoryStore::new(),
            RecordingNotifier::new(),
            NopAnalyzer,
            Duration::from_secs(3600),
        )
    }

    fn calls_for(log: &Arc<Mutex<Vec<(String, Instant)>>>, label: &str) -> Vec<Instant> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, t)| *t)
            .collect()
    }

    #[tokio::test]
    async fn slow_group_does_not_block_fast_group() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let slow = test_poller(
            "slowco",
            "workday",
            TimedFetcher::new("slow", log.clone()).slow(Duration::from_millis(400)),
        );
        let fast = test_poller("fastco", "lever", TimedFetcher::new("fast", log.clone()));

        let sched = Scheduler::new(
            vec![slow, fast],
            Duration::from_millis(50),
            Duration::from_millis(10),
            HashMap::new(),
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let run = tokio::spawn(sched.run(token));

        tokio::time::sleep(Duration::from_millis(150)).await;
        let fast_calls = calls_for(&log, "fast");
        assert!(
            !fast_calls.is_empty(),
            "fast group should have completed a cycle while the slow group was blocked"
        );

        cancel.cancel();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn same_group_polls_are_spaced_by_min_delay() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = test_poller("one", "greenhouse", TimedFetcher::new("one", log.clone()));
        let second = test_poller("two", "greenhouse", TimedFetcher::new("two", log.clone()));

        let sched = Scheduler::new(
            vec![first, second],
            Duration::from_secs(3600),
            Duration::from_millis(100),
            HashMap::new(),
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let run = tokio::spawn(sched.run(token));

        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
        run.await.unwrap();

        let one = calls_for(&log, "one");
        let two = calls_for(&log, "two");
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 1);
        let gap = two[0].duration_since(one[0]);
        assert!(
            gap >= Duration::from_millis(100),
            "second same-ATS poll started only {gap:?} after the first"
        );
    }

    #[tokio::test]
    async fn per_ats_override_beats_global_min_delay() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = test_poller("one", "ashby", TimedFetcher::new("one", log.clone()));
        let second = test_poller("two", "ashby", TimedFetcher::new("two", log.clone()));

        let mut overrides = HashMap::new();
        overrides.insert("ashby".to_string(), Duration::from_millis(10));

        let sched = Scheduler::new(
            vec![first, second],
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            overrides,
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let run = tokio::spawn(sched.run(token));

        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        run.await.unwrap();

        assert_eq!(
            calls_for(&log, "two").len(),
            1,
            "override delay should let the second poller run well before the global minimum"
        );
    }

    #[tokio::test]
    async fn poll_error_does_not_skip_group_siblings() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let broken = test_poller(
            "broken",
            "lever",
            TimedFetcher::new("broken", log.clone()).failing(),
        );
        let healthy = test_poller("healthy", "lever", TimedFetcher::new("healthy", log.clone()));

        let sched = Scheduler::new(
            vec![broken, healthy],
            Duration::from_secs(3600),
            Duration::from_millis(10),
            HashMap::new(),
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let run = tokio::spawn(sched.run(token));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        run.await.unwrap();

        assert_eq!(calls_for(&log, "broken").len(), 1);
        assert_eq!(
            calls_for(&log, "healthy").len(),
            1,
            "a failing sibling must not stop the rest of the group"
        );
    }

    #[tokio::test]
    async fn cancellation_interrupts_long_sleeps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let poller = test_poller("one", "gem", TimedFetcher::new("one", log.clone()));

        // A one-hour interval must not hold up shutdown.
        let sched = Scheduler::new(
            vec![poller],
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            HashMap::new(),
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let run = tokio::spawn(sched.run(token));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("scheduler did not stop after cancellation")
            .unwrap();
    }
}
