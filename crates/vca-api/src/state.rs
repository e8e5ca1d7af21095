//! SS9: an explicit application context built at startup and passed by
//! reference into handlers, replacing module-level singletons
//! (`_db_instance`, `_cache_instance`, processor, queue) with one struct.

use std::sync::Arc;

use vca_cache::{Cache, CacheConfig};
use vca_integrity::{ConsistencyChecker, LineageQueries, Reconciler};
use vca_persistence::PersistenceService;
use vca_processor::ProgressiveProcessor;
use vca_queue::PriorityQueue;
use vca_store::{PoolConfig, Store};
use vca_tools::{Dispatcher, DispatcherConfig, ToolRegistry, ToolRunnerClient, ToolRunnerConfig};

use crate::config::ApiConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<Store>,
    pub cache: Arc<Cache>,
    pub persistence: Arc<PersistenceService>,
    pub dispatcher: Arc<Dispatcher>,
    pub processor: Arc<ProgressiveProcessor>,
    pub queue: Arc<PriorityQueue>,
    pub checker: Arc<ConsistencyChecker>,
    pub reconciler: Arc<Reconciler>,
    pub lineage: Arc<LineageQueries>,
}

impl AppState {
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(Store::open(PoolConfig::from_env())?);
        let cache = Arc::new(Cache::new(CacheConfig::from_env())?);
        let persistence = Arc::new(PersistenceService::new(Arc::clone(&store)));
        let registry = Arc::new(ToolRegistry::new());
        let rpc = Arc::new(ToolRunnerClient::new(ToolRunnerConfig::from_env())?);
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            Arc::clone(&cache),
            Arc::clone(&persistence),
            Arc::clone(&store),
            rpc,
            DispatcherConfig::from_env(),
        ));
        let processor = Arc::new(ProgressiveProcessor::new(Arc::clone(&dispatcher), Arc::clone(&store)));
        let worker_count: usize = std::env::var("QUEUE_WORKERS").ok().and_then(|s| s.parse().ok()).unwrap_or(2);
        let completed_capacity: usize =
            std::env::var("QUEUE_COMPLETED_HISTORY_CAPACITY").ok().and_then(|s| s.parse().ok()).unwrap_or(100);
        let queue = PriorityQueue::with_capacity(Arc::clone(&processor), worker_count, completed_capacity);

        let checker = Arc::new(ConsistencyChecker::new(Arc::clone(&store)));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&dispatcher), Arc::clone(&persistence), Arc::clone(&store)));
        let lineage = Arc::new(LineageQueries::new(Arc::clone(&store)));

        Ok(Self {
            config,
            store,
            cache,
            persistence,
            dispatcher,
            processor,
            queue,
            checker,
            reconciler,
            lineage,
        })
    }
}
