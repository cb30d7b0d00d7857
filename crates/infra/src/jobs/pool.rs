//! Worker pool draining the job queue.
//!
//! Each worker is a long-lived tokio task that claims the oldest queued job,
//! runs the configured [`JobAction`] with the bot client and records the
//! outcome. The action runs in its own task so that a panic is reported as a
//! join error and turned into a failed job instead of killing the worker.
//!
//! Shutdown stops workers from claiming new jobs and waits for jobs that are
//! already running to finish.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use jobgate_identity::BotClient;

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobOutcome, JobStatus};

/// Operator-supplied work performed for every job.
#[async_trait]
pub trait JobAction: Send + Sync {
    async fn run(&self, job: &Job, client: &BotClient) -> anyhow::Result<()>;
}

#[async_trait]
impl<A> JobAction for Arc<A>
where
    A: JobAction + ?Sized,
{
    async fn run(&self, job: &Job, client: &BotClient) -> anyhow::Result<()> {
        (**self).run(job, client).await
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// How long an idle worker waits before polling again
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            poll_interval: Duration::from_millis(250),
            name: "worker-pool".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

/// Handle to a running pool.
#[derive(Debug)]
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<PoolStats>>,
    started: Instant,
}

impl WorkerPoolHandle {
    /// Stop claiming new jobs and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }

    /// Get current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let mut stats = lock(&self.stats).clone();
        stats.uptime_secs = self.started.elapsed().as_secs();
        stats
    }
}

fn lock(stats: &Mutex<PoolStats>) -> std::sync::MutexGuard<'_, PoolStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background job runner.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    action: Arc<dyn JobAction>,
    config: WorkerPoolConfig,
    span: Span,
}

impl WorkerPool {
    pub fn new(store: Arc<dyn JobStore>, action: Arc<dyn JobAction>) -> Self {
        let config = WorkerPoolConfig::default();
        let span = info_span!("worker_pool", pool = %config.name);
        Self {
            store,
            action,
            config,
            span,
        }
    }

    pub fn with_config(mut self, config: WorkerPoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Log events under `span` instead of the default component span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Start the workers. Jobs run with `client`.
    pub fn spawn(self, client: BotClient) -> WorkerPoolHandle {
        let WorkerPool {
            store,
            action,
            config,
            span,
        } = self;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(PoolStats::default()));
        let runner = Arc::new(Runner {
            store,
            action,
            client,
        });
        let count = config.workers.max(1);

        let workers = (0..count)
            .map(|n| {
                let worker = format!("{}-{}", config.name, n);
                let worker_span = info_span!(parent: &span, "worker", worker = %worker);
                tokio::spawn(
                    worker_loop(
                        runner.clone(),
                        config.poll_interval,
                        shutdown_rx.clone(),
                        stats.clone(),
                    )
                    .instrument(worker_span),
                )
            })
            .collect();

        info!(parent: &span, workers = count, "worker pool started");

        WorkerPoolHandle {
            shutdown: shutdown_tx,
            workers,
            stats,
            started: Instant::now(),
        }
    }

    /// Claim and execute a single job on the current task, if one is queued.
    #[cfg(test)]
    pub(crate) async fn run_once(
        &self,
        client: &BotClient,
    ) -> Result<Option<(Job, JobOutcome)>, JobStoreError> {
        let runner = Runner {
            store: self.store.clone(),
            action: self.action.clone(),
            client: client.clone(),
        };
        async {
            let Some(job) = runner.store.claim_next().await? else {
                return Ok(None);
            };
            let outcome = runner.execute(job.clone()).await;
            Ok(Some((job, outcome)))
        }
        .instrument(self.span.clone())
        .await
    }
}

struct Runner {
    store: Arc<dyn JobStore>,
    action: Arc<dyn JobAction>,
    client: BotClient,
}

impl Runner {
    /// Run the action for a claimed job and persist the outcome.
    async fn execute(&self, job: Job) -> JobOutcome {
        let job_id = job.id;
        let action = self.action.clone();
        let client = self.client.clone();

        let task = tokio::spawn(async move { action.run(&job, &client).await });
        let outcome = match task.await {
            Ok(Ok(())) => JobOutcome::Succeeded,
            Ok(Err(e)) => JobOutcome::Failed(format!("{e:#}")),
            Err(e) if e.is_panic() => {
                JobOutcome::Failed(format!("job action panicked: {}", panic_message(e.into_panic())))
            }
            Err(e) => JobOutcome::Failed(format!("job action aborted: {e}")),
        };

        match &outcome {
            JobOutcome::Succeeded => debug!(%job_id, "job succeeded"),
            JobOutcome::Failed(message) => warn!(%job_id, error = %message, "job failed"),
        }

        if let Err(e) = self.persist(job_id, &outcome).await {
            error!(%job_id, error = %e, "failed to record job outcome");
        }
        outcome
    }

    async fn persist(&self, job_id: jobgate_core::JobId, outcome: &JobOutcome) -> Result<(), JobStoreError> {
        if let JobOutcome::Failed(message) = outcome {
            self.store.record_error(job_id, message).await?;
        }
        self.store.update_status(job_id, outcome.status()).await
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn worker_loop(
    runner: Arc<Runner>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<PoolStats>>,
) {
    debug!("worker started");

    loop {
        // A dropped handle counts as shutdown.
        if *shutdown.borrow() || shutdown.has_changed().is_err() {
            break;
        }

        match runner.store.claim_next().await {
            Ok(Some(job)) => {
                debug!(job_id = %job.id, user_id = %job.user_id, "claimed job");
                lock(&stats).current_running += 1;

                let outcome = runner.execute(job).await;

                let mut s = lock(&stats);
                s.current_running = s.current_running.saturating_sub(1);
                s.jobs_processed += 1;
                match outcome.status() {
                    JobStatus::Succeeded => s.jobs_succeeded += 1,
                    _ => s.jobs_failed += 1,
                }
            }
            Ok(None) => {
                if !idle(&mut shutdown, poll_interval).await {
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "failed to claim job");
                if !idle(&mut shutdown, poll_interval).await {
                    break;
                }
            }
        }
    }

    debug!("worker stopped");
}

/// Wait for the poll interval or a shutdown signal. Returns `false` once the
/// pool should stop, including when the handle was dropped.
async fn idle(shutdown: &mut watch::Receiver<bool>, poll_interval: Duration) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        _ = tokio::time::sleep(poll_interval) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::bail;

    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::ValueMap;
    use jobgate_core::UserId;

    struct Succeed;

    #[async_trait]
    impl JobAction for Succeed {
        async fn run(&self, _job: &Job, _client: &BotClient) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FailOn(&'static str);

    #[async_trait]
    impl JobAction for FailOn {
        async fn run(&self, job: &Job, _client: &BotClient) -> anyhow::Result<()> {
            if job.value_map.contains_key(self.0) {
                bail!("refusing {}", self.0);
            }
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl JobAction for Panics {
        async fn run(&self, _job: &Job, _client: &BotClient) -> anyhow::Result<()> {
            panic!("action blew up");
        }
    }

    #[derive(Default)]
    struct Counting {
        running: AtomicUsize,
        max_running: AtomicUsize,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl JobAction for Counting {
        async fn run(&self, _job: &Job, _client: &BotClient) -> anyhow::Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn client() -> BotClient {
        BotClient::new("http://127.0.0.1:9", "testbot", "testbot-token").unwrap()
    }

    fn job(pairs: &[(&str, &str)]) -> Job {
        let map: ValueMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Job::new(UserId::from_identity("fake token"), map)
    }

    async fn wait_for_terminal(store: &InMemoryJobStore, n: usize) {
        for _ in 0..200 {
            let stats = store.stats().await.unwrap();
            if stats.succeeded + stats.failed == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("jobs did not finish in time");
    }

    #[tokio::test]
    async fn run_once_marks_success() {
        let store = InMemoryJobStore::arc();
        let pool = WorkerPool::new(store.clone(), Arc::new(Succeed));
        let job = job(&[]);
        store.insert(&job).await.unwrap();

        let (ran, outcome) = pool.run_once(&client()).await.unwrap().unwrap();

        assert_eq!(ran.id, job.id);
        assert_eq!(outcome, JobOutcome::Succeeded);
        assert_eq!(
            store.get(job.id).await.unwrap().unwrap().status,
            JobStatus::Succeeded
        );
        assert!(pool.run_once(&client()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn action_error_marks_failed_and_records_message() {
        let store = InMemoryJobStore::arc();
        let pool = WorkerPool::new(store.clone(), Arc::new(FailOn("bad")));
        let job = job(&[("bad", "1")]);
        store.insert(&job).await.unwrap();

        let (_, outcome) = pool.run_once(&client()).await.unwrap().unwrap();

        assert_eq!(outcome, JobOutcome::Failed("refusing bad".to_string()));
        let stored = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("refusing bad"));
    }

    #[tokio::test]
    async fn panicking_action_marks_failed_and_pool_survives() {
        let store = InMemoryJobStore::arc();
        let handle = WorkerPool::new(store.clone(), Arc::new(Panics))
            .with_config(WorkerPoolConfig::default().with_poll_interval(Duration::from_millis(5)))
            .spawn(client());

        let first = job(&[]);
        let second = job(&[]);
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();
        wait_for_terminal(&store, 2).await;

        for id in [first.id, second.id] {
            let stored = store.get(id).await.unwrap().unwrap();
            assert_eq!(stored.status, JobStatus::Failed);
            assert!(stored.error.unwrap().contains("action blew up"));
        }
        assert_eq!(handle.stats().jobs_failed, 2);
        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn workers_drain_queue_without_double_execution() {
        let store = InMemoryJobStore::arc();
        let action = Arc::new(Counting::default());
        for i in 0..20 {
            store.insert(&job(&[("i", &i.to_string())])).await.unwrap();
        }

        let handle = WorkerPool::new(store.clone(), action.clone())
            .with_config(
                WorkerPoolConfig::default()
                    .with_workers(4)
                    .with_poll_interval(Duration::from_millis(5)),
            )
            .spawn(client());
        wait_for_terminal(&store, 20).await;
        handle.shutdown().await;

        assert_eq!(action.runs.load(Ordering::SeqCst), 20);
        assert!(action.max_running.load(Ordering::SeqCst) <= 4);
        assert_eq!(store.stats().await.unwrap().succeeded, 20);
    }

    #[tokio::test]
    async fn shutdown_stops_claiming_new_jobs() {
        let store = InMemoryJobStore::arc();
        let handle = WorkerPool::new(store.clone(), Arc::new(Succeed))
            .with_config(WorkerPoolConfig::default().with_poll_interval(Duration::from_millis(5)))
            .spawn(client());
        handle.shutdown().await;

        let job = job(&[]);
        store.insert(&job).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(
            store.get(job.id).await.unwrap().unwrap().status,
            JobStatus::Queued
        );
    }

    /// Blocks until released, announcing when it starts.
    #[derive(Default)]
    struct Gated {
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl JobAction for Gated {
        async fn run(&self, _job: &Job, _client: &BotClient) -> anyhow::Result<()> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    /// Counts `claim_next` calls on top of the in-memory store.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryJobStore,
        claims: AtomicUsize,
    }

    #[async_trait]
    impl JobStore for CountingStore {
        async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
            self.inner.insert(job).await
        }

        async fn get(&self, id: jobgate_core::JobId) -> Result<Option<Job>, JobStoreError> {
            self.inner.get(id).await
        }

        async fn update_status(
            &self,
            id: jobgate_core::JobId,
            status: JobStatus,
        ) -> Result<(), JobStoreError> {
            self.inner.update_status(id, status).await
        }

        async fn record_error(&self, id: jobgate_core::JobId, message: &str) -> Result<(), JobStoreError> {
            self.inner.record_error(id, message).await
        }

        async fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
            self.claims.fetch_add(1, Ordering::SeqCst);
            self.inner.claim_next().await
        }

        async fn list_for_owner(&self, user_id: UserId) -> Result<Vec<Job>, JobStoreError> {
            self.inner.list_for_owner(user_id).await
        }

        async fn requeue_stranded(&self) -> Result<usize, JobStoreError> {
            self.inner.requeue_stranded().await
        }

        async fn stats(&self) -> Result<crate::jobs::store::JobStats, JobStoreError> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn shutdown_waits_for_running_job() {
        let store = InMemoryJobStore::arc();
        let action = Arc::new(Gated::default());
        let handle = WorkerPool::new(store.clone(), action.clone())
            .with_config(WorkerPoolConfig::default().with_poll_interval(Duration::from_millis(5)))
            .spawn(client());

        let job = job(&[]);
        store.insert(&job).await.unwrap();
        action.started.notified().await;

        let stopping = tokio::spawn(handle.shutdown());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!stopping.is_finished(), "shutdown returned while a job was running");
        assert_eq!(
            store.get(job.id).await.unwrap().unwrap().status,
            JobStatus::Running
        );

        action.release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), stopping)
            .await
            .expect("shutdown did not finish")
            .unwrap();
        assert_eq!(
            store.get(job.id).await.unwrap().unwrap().status,
            JobStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn dropped_handle_stops_workers() {
        let store = Arc::new(CountingStore::default());
        let handle = WorkerPool::new(store.clone(), Arc::new(Succeed))
            .with_config(
                WorkerPoolConfig::default()
                    .with_workers(2)
                    .with_poll_interval(Duration::from_millis(100)),
            )
            .spawn(client());
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(handle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_drop = store.claims.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.claims.load(Ordering::SeqCst), after_drop);
        assert!(after_drop <= 4, "workers kept polling: {after_drop} claims");
    }
}
