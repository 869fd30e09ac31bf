use std::sync::Arc;

use standings_config::WorkerConfig;
use standings_dispatcher::JobQueue;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use super::{RecalculationExecutor, RecalculationWorker};

/// 一组共享同一个队列的调度循环
pub struct WorkerPool {
    workers: Vec<Arc<RecalculationWorker>>,
}

impl WorkerPool {
    pub fn new(
        config: &WorkerConfig,
        queue: Arc<JobQueue>,
        executor: Arc<RecalculationExecutor>,
    ) -> Self {
        let prefix = config
            .worker_id_prefix
            .clone()
            .unwrap_or_else(Self::default_prefix);

        let workers = (1..=config.concurrency.max(1))
            .map(|n| {
                Arc::new(RecalculationWorker::new(
                    format!("{prefix}-{n}"),
                    queue.clone(),
                    executor.clone(),
                ))
            })
            .collect();

        Self { workers }
    }

    fn default_prefix() -> String {
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "standings-worker".to_string())
    }

    pub fn worker_ids(&self) -> Vec<String> {
        self.workers
            .iter()
            .map(|worker| worker.worker_id().to_string())
            .collect()
    }

    /// 启动所有循环，每个循环订阅同一个关闭信号
    pub fn start(&self, shutdown_rx: &broadcast::Receiver<()>) -> Vec<JoinHandle<()>> {
        info!("启动 {} 个重算 worker", self.workers.len());
        self.workers
            .iter()
            .map(|worker| {
                let worker = worker.clone();
                let rx = shutdown_rx.resubscribe();
                tokio::spawn(async move { worker.run(rx).await })
            })
            .collect()
    }
}
