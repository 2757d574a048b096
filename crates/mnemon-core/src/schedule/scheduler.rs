//! Per-user debounced extraction scheduler with a bounded worker pool.
//!
//! `schedule(user_id)` is called synchronously by handlers right after a
//! conversation turn is persisted. It returns quickly and never runs
//! extraction inline: each user has at most one non-terminal job, whose
//! firing time is pushed out by every call within the debounce window but
//! never past `first_queued_at + max_wait`. Workers drain fired jobs,
//! throttled by a global token bucket, and retry failures with exponential
//! backoff before recording the job as failed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use mnemon_types::config::SchedulerProfile;
use mnemon_types::memory::JobState;

use super::rate_limit::RateLimiter;
use super::Extract;

/// Queued user ids waiting for a worker.
const QUEUE_CAPACITY: usize = 1024;

struct JobEntry {
    state: JobState,
    first_queued_at: Instant,
    fire_at: Instant,
    attempt: u32,
    /// Bumped on every reschedule so stale debounce timers no-op.
    generation: u64,
}

struct SchedulerInner<E> {
    extractor: E,
    profile: SchedulerProfile,
    jobs: Mutex<HashMap<String, JobEntry>>,
    /// Terminal failures, kept observable for a bounded TTL.
    failed: Mutex<HashMap<String, Instant>>,
    tx: Mutex<Option<mpsc::Sender<String>>>,
    limiter: RateLimiter,
}

/// Debounced per-user extraction scheduler.
pub struct ExtractionScheduler<E: Extract + 'static> {
    inner: Arc<SchedulerInner<E>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: Extract + 'static> ExtractionScheduler<E> {
    /// Start the worker pool and return the running scheduler.
    pub fn start(extractor: E, profile: SchedulerProfile) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker_count = profile.workers.max(1);
        let limiter = RateLimiter::new(profile.rate_limit_max, profile.rate_limit_window());

        let inner = Arc::new(SchedulerInner {
            extractor,
            profile,
            jobs: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashMap::new()),
            tx: Mutex::new(Some(tx)),
            limiter,
        });

        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            workers.push(tokio::spawn(worker_loop(
                Arc::clone(&inner),
                Arc::clone(&rx),
                worker_id,
            )));
        }

        tracing::info!(workers = worker_count, "extraction scheduler started");
        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// (Re)schedule extraction for a user.
    ///
    /// Debounce: within the window, calls coalesce into the single pending
    /// job and push its firing time out. Once the job has been pending for
    /// `max_wait`, the next call promotes it to immediate execution. Calls
    /// while a job is waiting or active are no-ops; the run observes the
    /// fresh messages anyway.
    pub async fn schedule(&self, user_id: &str) {
        enum Outcome {
            Fresh { fire_at: Instant },
            Promoted,
            Postponed { fire_at: Instant, generation: u64 },
            Noop,
        }

        let now = Instant::now();
        let debounce = self.inner.profile.debounce();
        let max_wait = self.inner.profile.max_wait();

        let mut jobs = self.inner.jobs.lock().await;
        let outcome = match jobs.get_mut(user_id) {
            None => Outcome::Fresh {
                fire_at: now + debounce.min(max_wait),
            },
            Some(entry) if entry.state == JobState::Delayed => {
                if now.duration_since(entry.first_queued_at) >= max_wait {
                    entry.state = JobState::Waiting;
                    entry.generation = entry.generation.wrapping_add(1);
                    Outcome::Promoted
                } else {
                    let deadline = entry.first_queued_at + max_wait;
                    entry.fire_at = (now + debounce).min(deadline);
                    entry.generation = entry.generation.wrapping_add(1);
                    Outcome::Postponed {
                        fire_at: entry.fire_at,
                        generation: entry.generation,
                    }
                }
            }
            // Waiting: already queued. Active: the in-flight run loads
            // pending messages at its own stage 1 and sees this turn.
            Some(_) => Outcome::Noop,
        };
        if let Outcome::Fresh { fire_at } = outcome {
            jobs.insert(
                user_id.to_string(),
                JobEntry {
                    state: JobState::Delayed,
                    first_queued_at: now,
                    fire_at,
                    attempt: 0,
                    generation: 0,
                },
            );
        }
        drop(jobs);

        match outcome {
            Outcome::Fresh { fire_at } => {
                spawn_timer(Arc::clone(&self.inner), user_id.to_string(), fire_at, 0);
                // A fresh cycle supersedes any stale failure record.
                let mut failed = self.inner.failed.lock().await;
                failed.remove(user_id);
                let ttl = self.inner.profile.failed_ttl();
                failed.retain(|_, failed_at| now.duration_since(*failed_at) < ttl);
                tracing::debug!(user_id, "extraction scheduled");
            }
            Outcome::Promoted => {
                enqueue(&self.inner, user_id).await;
                tracing::debug!(user_id, "max wait exceeded; promoted to immediate");
            }
            Outcome::Postponed { fire_at, generation } => {
                spawn_timer(
                    Arc::clone(&self.inner),
                    user_id.to_string(),
                    fire_at,
                    generation,
                );
                tracing::debug!(user_id, "debounce timer reset");
            }
            Outcome::Noop => {}
        }
    }

    /// Remove a delayed or waiting job. Active runs finish on their own.
    pub async fn cancel(&self, user_id: &str) -> bool {
        let mut jobs = self.inner.jobs.lock().await;
        match jobs.get(user_id).map(|entry| entry.state) {
            Some(JobState::Delayed) | Some(JobState::Waiting) => {
                jobs.remove(user_id);
                tracing::debug!(user_id, "extraction job canceled");
                true
            }
            _ => false,
        }
    }

    /// Observable state of a user's job, if any.
    pub async fn job_state(&self, user_id: &str) -> Option<JobState> {
        if let Some(entry) = self.inner.jobs.lock().await.get(user_id) {
            return Some(entry.state);
        }
        if self.inner.failed.lock().await.contains_key(user_id) {
            return Some(JobState::Failed);
        }
        None
    }

    /// Number of non-terminal jobs currently tracked.
    pub async fn pending_count(&self) -> usize {
        self.inner.jobs.lock().await.len()
    }

    /// Close the queue, drain in-flight work, and join the workers.
    pub async fn shutdown(&self) {
        self.inner.tx.lock().await.take();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("extraction scheduler stopped");
    }
}

async fn enqueue<E: Extract>(inner: &SchedulerInner<E>, user_id: &str) {
    let tx = inner.tx.lock().await.clone();
    if let Some(tx) = tx {
        if tx.send(user_id.to_string()).await.is_err() {
            tracing::warn!(user_id, "extraction queue closed; job dropped");
        }
    }
}

fn spawn_timer<E: Extract + 'static>(
    inner: Arc<SchedulerInner<E>>,
    user_id: String,
    fire_at: Instant,
    generation: u64,
) {
    tokio::spawn(async move {
        tokio::time::sleep_until(fire_at).await;
        let mut jobs = inner.jobs.lock().await;
        let Some(entry) = jobs.get_mut(&user_id) else {
            return;
        };
        if entry.generation != generation || entry.state != JobState::Delayed {
            return;
        }
        entry.state = JobState::Waiting;
        drop(jobs);
        enqueue(&inner, &user_id).await;
    });
}

async fn worker_loop<E: Extract + 'static>(
    inner: Arc<SchedulerInner<E>>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    worker_id: usize,
) {
    loop {
        let user_id = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(user_id) = user_id else {
            break;
        };

        inner.limiter.acquire().await;

        {
            let mut jobs = inner.jobs.lock().await;
            match jobs.get_mut(&user_id) {
                Some(entry) => entry.state = JobState::Active,
                // Canceled between firing and pickup.
                None => continue,
            }
        }

        tracing::debug!(worker_id, user_id = %user_id, "extraction run started");
        match inner.extractor.extract(&user_id).await {
            Ok(stats) => {
                // Terminal transition releases the dedup key.
                inner.jobs.lock().await.remove(&user_id);
                tracing::info!(
                    worker_id,
                    user_id = %user_id,
                    added = stats.memories_added,
                    updated = stats.memories_updated,
                    messages = stats.messages_extracted,
                    "extraction run completed"
                );
            }
            Err(err) => {
                let mut jobs = inner.jobs.lock().await;
                let Some(entry) = jobs.get_mut(&user_id) else {
                    continue;
                };
                entry.attempt += 1;
                if entry.attempt < inner.profile.max_attempts {
                    let backoff =
                        inner.profile.retry_base() * (1u32 << (entry.attempt - 1).min(16));
                    entry.state = JobState::Delayed;
                    entry.generation = entry.generation.wrapping_add(1);
                    entry.fire_at = Instant::now() + backoff;
                    let (fire_at, generation) = (entry.fire_at, entry.generation);
                    let attempt = entry.attempt;
                    drop(jobs);
                    tracing::warn!(
                        worker_id,
                        user_id = %user_id,
                        attempt,
                        error = %err,
                        "extraction run failed; retrying with backoff"
                    );
                    spawn_timer(Arc::clone(&inner), user_id.clone(), fire_at, generation);
                } else {
                    jobs.remove(&user_id);
                    drop(jobs);
                    inner
                        .failed
                        .lock()
                        .await
                        .insert(user_id.clone(), Instant::now());
                    tracing::error!(
                        worker_id,
                        user_id = %user_id,
                        error = %err,
                        "extraction run failed; attempts exhausted"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_types::error::{ExtractError, GatewayError};
    use mnemon_types::memory::ExtractionStats;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::{sleep, Duration};

    struct CountingExtractor {
        calls: std::sync::Mutex<Vec<(String, Instant)>>,
        fail_remaining: AtomicU32,
    }

    impl CountingExtractor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: std::sync::Mutex::new(Vec::new()),
                fail_remaining: AtomicU32::new(0),
            })
        }

        fn failing(times: u32) -> Arc<Self> {
            let this = Self::new();
            this.fail_remaining.store(times, Ordering::SeqCst);
            this
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn first_call_at(&self) -> Option<Instant> {
            self.calls.lock().unwrap().first().map(|(_, at)| *at)
        }

        fn users_called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(user, _)| user.clone())
                .collect()
        }
    }

    impl Extract for CountingExtractor {
        async fn extract(&self, user_id: &str) -> Result<ExtractionStats, ExtractError> {
            self.calls
                .lock()
                .unwrap()
                .push((user_id.to_string(), Instant::now()));
            let remaining = self.fail_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(GatewayError::Provider {
                    message: "synthetic failure".to_string(),
                }
                .into());
            }
            Ok(ExtractionStats::default())
        }
    }

    fn profile(debounce_ms: u64, max_wait_ms: u64) -> SchedulerProfile {
        SchedulerProfile {
            debounce_ms,
            max_wait_ms,
            ..SchedulerProfile::test_profile()
        }
    }

    #[tokio::test]
    async fn test_debounce_coalesces_burst_into_one_run() {
        let extractor = CountingExtractor::new();
        let scheduler = ExtractionScheduler::start(Arc::clone(&extractor), profile(100, 500));

        for _ in 0..3 {
            scheduler.schedule("u1").await;
            assert_eq!(scheduler.job_state("u1").await, Some(JobState::Delayed));
            assert_eq!(scheduler.pending_count().await, 1);
            sleep(Duration::from_millis(30)).await;
        }

        sleep(Duration::from_millis(400)).await;
        assert_eq!(extractor.call_count(), 1);
        assert_eq!(scheduler.job_state("u1").await, None);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_completed_job_releases_dedup_key() {
        let extractor = CountingExtractor::new();
        let scheduler = ExtractionScheduler::start(Arc::clone(&extractor), profile(50, 500));

        scheduler.schedule("u1").await;
        sleep(Duration::from_millis(200)).await;
        assert_eq!(extractor.call_count(), 1);

        scheduler.schedule("u1").await;
        sleep(Duration::from_millis(200)).await;
        assert_eq!(extractor.call_count(), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_max_wait_bounds_continuous_rescheduling() {
        let extractor = CountingExtractor::new();
        let scheduler = ExtractionScheduler::start(Arc::clone(&extractor), profile(100, 300));

        let started = Instant::now();
        for _ in 0..10 {
            scheduler.schedule("u1").await;
            sleep(Duration::from_millis(60)).await;
        }

        sleep(Duration::from_millis(200)).await;
        assert!(extractor.call_count() >= 1);
        let first = extractor.first_call_at().expect("extraction never ran");
        assert!(
            first.duration_since(started) <= Duration::from_millis(500),
            "first run must start within max_wait of the first schedule"
        );
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_retries_then_records_failed() {
        let extractor = CountingExtractor::failing(u32::MAX);
        let scheduler = ExtractionScheduler::start(Arc::clone(&extractor), profile(50, 500));

        scheduler.schedule("u1").await;
        sleep(Duration::from_millis(600)).await;

        // max_attempts = 3 in the test profile
        assert_eq!(extractor.call_count(), 3);
        assert_eq!(scheduler.job_state("u1").await, Some(JobState::Failed));
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let extractor = CountingExtractor::failing(1);
        let scheduler = ExtractionScheduler::start(Arc::clone(&extractor), profile(50, 500));

        scheduler.schedule("u1").await;
        sleep(Duration::from_millis(400)).await;

        assert_eq!(extractor.call_count(), 2);
        assert_eq!(scheduler.job_state("u1").await, None);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_record_cleared_by_fresh_cycle() {
        let extractor = CountingExtractor::failing(3);
        let scheduler = ExtractionScheduler::start(Arc::clone(&extractor), profile(50, 500));

        scheduler.schedule("u1").await;
        sleep(Duration::from_millis(600)).await;
        assert_eq!(scheduler.job_state("u1").await, Some(JobState::Failed));

        scheduler.schedule("u1").await;
        assert_eq!(scheduler.job_state("u1").await, Some(JobState::Delayed));
        sleep(Duration::from_millis(200)).await;
        assert_eq!(scheduler.job_state("u1").await, None);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_removes_delayed_job() {
        let extractor = CountingExtractor::new();
        let scheduler = ExtractionScheduler::start(Arc::clone(&extractor), profile(100, 500));

        scheduler.schedule("u1").await;
        assert!(scheduler.cancel("u1").await);
        assert_eq!(scheduler.job_state("u1").await, None);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(extractor.call_count(), 0);
        assert!(!scheduler.cancel("u1").await);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_distinct_users_both_run() {
        let extractor = CountingExtractor::new();
        let scheduler = ExtractionScheduler::start(Arc::clone(&extractor), profile(50, 500));

        scheduler.schedule("u1").await;
        scheduler.schedule("u2").await;
        assert_eq!(scheduler.pending_count().await, 2);

        sleep(Duration::from_millis(300)).await;
        let mut users = extractor.users_called();
        users.sort();
        assert_eq!(users, vec!["u1".to_string(), "u2".to_string()]);
        scheduler.shutdown().await;
    }
}
