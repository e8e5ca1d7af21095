//! Component G: the priority queue (SS4.7).
//!
//! A bounded-concurrency worker pool pulling from a priority-ordered
//! in-memory queue and driving each job through the Progressive
//! Processor (F). This never leaves the process - there is no Redis
//! stream, no consumer group, no acknowledgement protocol. A `Job`
//! lives entirely in one of three in-memory places: pending, active,
//! or completed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{info, warn};
use vca_models::{Job, JobPriority, JobStatus, VideoId};
use vca_processor::ProgressiveProcessor;

const DEFAULT_WORKER_COUNT: usize = 2;
const DEFAULT_COMPLETED_CAPACITY: usize = 100;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
struct PendingEntry {
    job: Job,
    seq: u64,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    /// `BinaryHeap` pops the greatest element; lower `priority` values
    /// (HIGH=1) and lower `seq` (earlier arrival) must pop first, so
    /// both comparisons are reversed.
    fn cmp(&self, other: &Self) -> Ordering {
        other.job.priority.cmp(&self.job.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    pending: BinaryHeap<PendingEntry>,
    active: HashMap<VideoId, Job>,
    completed: VecDeque<Job>,
}

/// Snapshot of queue occupancy, exposed for the HTTP surface's status
/// endpoints.
#[derive(Debug, Clone, Copy, serde::Serialize, schemars::JsonSchema)]
pub struct QueueStats {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
}

pub struct PriorityQueue {
    processor: Arc<ProgressiveProcessor>,
    worker_count: usize,
    completed_capacity: usize,
    inner: Mutex<Inner>,
    notify: Notify,
    shutdown: AtomicBool,
    next_seq: AtomicU64,
    workers: Mutex<Option<JoinSet<()>>>,
}

impl PriorityQueue {
    pub fn new(processor: Arc<ProgressiveProcessor>) -> Arc<Self> {
        Self::with_capacity(processor, DEFAULT_WORKER_COUNT, DEFAULT_COMPLETED_CAPACITY)
    }

    pub fn with_capacity(processor: Arc<ProgressiveProcessor>, worker_count: usize, completed_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            processor,
            worker_count,
            completed_capacity,
            inner: Mutex::new(Inner {
                pending: BinaryHeap::new(),
                active: HashMap::new(),
                completed: VecDeque::new(),
            }),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            workers: Mutex::new(None),
        })
    }

    /// If `video_id` is already active or queued, returns the existing
    /// Job unchanged (SS4.7 `add_job`). Otherwise inserts respecting
    /// priority ordering and wakes a waiting worker.
    pub fn add_job(&self, video_id: VideoId, video_path: impl Into<String>, priority: JobPriority) -> Job {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.active.get(&video_id) {
            return existing.clone();
        }
        if let Some(entry) = inner.pending.iter().find(|e| e.job.video_id == video_id) {
            return entry.job.clone();
        }
        let job = Job::new(video_id, video_path, priority);
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        inner.pending.push(PendingEntry { job: job.clone(), seq });
        drop(inner);
        self.notify.notify_one();
        job
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        QueueStats {
            pending: inner.pending.len(),
            active: inner.active.len(),
            completed: inner.completed.len(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(AtomicOrdering::Acquire)
    }

    /// Looks in active, then pending, then the completed history, most
    /// recent first.
    pub fn get_job(&self, video_id: &VideoId) -> Option<Job> {
        let inner = self.inner.lock().unwrap();
        if let Some(job) = inner.active.get(video_id) {
            return Some(job.clone());
        }
        if let Some(entry) = inner.pending.iter().find(|e| &e.job.video_id == video_id) {
            return Some(entry.job.clone());
        }
        inner.completed.iter().rev().find(|j| &j.video_id == video_id).cloned()
    }

    pub fn spawn_workers(self: &Arc<Self>) {
        let mut guard = self.workers.lock().unwrap();
        let mut set = JoinSet::new();
        for worker_index in 0..self.worker_count {
            let queue = Arc::clone(self);
            set.spawn(async move { queue.worker_loop(worker_index).await });
        }
        *guard = Some(set);
        info!(workers = self.worker_count, "priority queue workers started");
    }

    async fn worker_loop(&self, worker_index: usize) {
        loop {
            match self.pop_next().await {
                Some(job) => self.run_job(job).await,
                None => {
                    if self.shutdown.load(AtomicOrdering::Acquire) {
                        info!(worker_index, "worker exiting, queue drained and shutdown signalled");
                        break;
                    }
                }
            }
        }
    }

    async fn pop_next(&self) -> Option<Job> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(entry) = inner.pending.pop() {
                    let started = entry.job.start();
                    inner.active.insert(started.video_id.clone(), started.clone());
                    return Some(started);
                }
            }
            if self.shutdown.load(AtomicOrdering::Acquire) {
                return None;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
            if self.shutdown.load(AtomicOrdering::Acquire) {
                let inner = self.inner.lock().unwrap();
                if inner.pending.is_empty() {
                    return None;
                }
            }
        }
    }

    async fn run_job(&self, job: Job) {
        let result = self.processor.process(job.video_id.clone(), job.video_path.clone()).await;
        let finished = match result {
            Ok(()) => job.clone().complete(),
            Err(e) => {
                warn!(video_id = %job.video_id, error = %e, "job finished with error");
                job.clone().fail(e.to_string())
            }
        };
        let mut inner = self.inner.lock().unwrap();
        inner.active.remove(&finished.video_id);
        if inner.completed.len() >= self.completed_capacity {
            inner.completed.pop_front();
        }
        inner.completed.push_back(finished);
    }

    /// Sets the shutdown flag, waits up to `timeout` for in-flight
    /// workers to drain the queue, then aborts any stragglers.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.store(true, AtomicOrdering::Release);
        self.notify.notify_waiters();

        let set_opt = self.workers.lock().unwrap().take();
        let Some(mut set) = set_opt else { return };

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                next = set.join_next() => {
                    if next.is_none() {
                        break;
                    }
                }
                _ = &mut sleep => {
                    warn!("shutdown timeout elapsed, aborting remaining workers");
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    break;
                }
            }
        }
        info!("priority queue shut down");
    }
}

/// Returns the status string a completed or active job should report
/// over the HTTP surface, mirroring `JobStatus::as_str` but folding in
/// "not found" as a distinct case at the call site.
pub fn job_status_str(status: JobStatus) -> &'static str {
    status.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vca_cache::{Cache, CacheConfig};
    use vca_persistence::PersistenceService;
    use vca_store::{PoolConfig, SqlValue, Store};
    use vca_tools::{Dispatcher, DispatcherConfig, ToolRegistry, ToolRunnerClient, ToolRunnerConfig};
    use wiremock::matchers::{method, path as wpath};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_queue(tool_runner_url: String) -> (Arc<Store>, Arc<PriorityQueue>) {
        let store = Arc::new(
            Store::open(PoolConfig {
                database_path: ":memory:".to_string(),
                pool_size: 2,
                ..PoolConfig::default()
            })
            .unwrap(),
        );
        for video_id in ["v1", "v2"] {
            store
                .execute_update(
                    "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) VALUES (?1, 'a.mp4', '/tmp/a.mp4', 60.0, ?2)",
                    &[SqlValue::Text(video_id.into()), SqlValue::Text(Utc::now().to_rfc3339())],
                )
                .unwrap();
        }

        let cache = Arc::new(Cache::new(CacheConfig::default()).unwrap());
        let persistence = Arc::new(PersistenceService::new(Arc::clone(&store)));
        let rpc = Arc::new(
            ToolRunnerClient::new(ToolRunnerConfig {
                base_url: tool_runner_url,
                ..ToolRunnerConfig::from_env()
            })
            .unwrap(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(ToolRegistry::new()),
            cache,
            persistence,
            Arc::clone(&store),
            rpc,
            DispatcherConfig::default(),
        ));
        let processor = Arc::new(ProgressiveProcessor::new(dispatcher, Arc::clone(&store)));
        (store, PriorityQueue::with_capacity(processor, 2, 10))
    }

    async fn mount_happy_path(server: &MockServer) {
        Mock::given(method("POST"))
            .and(wpath("/extract_frames"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"timestamp": 0.0, "frame_number": 0, "image_path": "/tmp/f0.jpg"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(wpath("/caption_frames"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"frame_timestamp": 0.0, "text": "a cat"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(wpath("/transcribe_audio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"start": 0.0, "end": 1.0, "text": "hi"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(wpath("/detect_objects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"frame_timestamp": 0.0, "objects": []}
            ])))
            .mount(server)
            .await;
    }

    #[test]
    fn pending_entry_orders_high_priority_and_fifo_within_priority() {
        let mut heap = BinaryHeap::new();
        heap.push(PendingEntry { job: Job::new(VideoId::from_string("low"), "p", JobPriority::Low), seq: 0 });
        heap.push(PendingEntry { job: Job::new(VideoId::from_string("high1"), "p", JobPriority::High), seq: 1 });
        heap.push(PendingEntry { job: Job::new(VideoId::from_string("high0"), "p", JobPriority::High), seq: 2 });
        heap.push(PendingEntry { job: Job::new(VideoId::from_string("normal"), "p", JobPriority::Normal), seq: 3 });

        let order: Vec<String> = std::iter::from_fn(|| heap.pop()).map(|e| e.job.video_id.as_str().to_string()).collect();
        assert_eq!(order, vec!["high1", "high0", "normal", "low"]);
    }

    #[tokio::test]
    async fn add_job_returns_existing_job_when_already_active_or_queued() {
        let mock_server = MockServer::start().await;
        mount_happy_path(&mock_server).await;
        let (_store, queue) = test_queue(mock_server.uri()).await;

        let first = queue.add_job(VideoId::from_string("v1"), "data/videos/a.mp4", JobPriority::Normal);
        let second = queue.add_job(VideoId::from_string("v1"), "data/videos/a.mp4", JobPriority::High);
        assert_eq!(first.job_id, second.job_id);
        assert_eq!(queue.stats().pending, 1);
    }

    #[tokio::test]
    async fn worker_processes_job_to_completion_and_records_history() {
        let mock_server = MockServer::start().await;
        mount_happy_path(&mock_server).await;
        let (_store, queue) = test_queue(mock_server.uri()).await;

        queue.add_job(VideoId::from_string("v1"), "data/videos/a.mp4", JobPriority::Normal);
        queue.spawn_workers();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let stats = queue.stats();
            if stats.completed >= 1 {
                break;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("job did not complete within deadline");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let job = queue.get_job(&VideoId::from_string("v1")).unwrap();
        assert_eq!(job.status, JobStatus::Complete);

        queue.shutdown(Duration::from_secs(1)).await;
    }
}
