use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use standings_api::{create_app, AppState};
use standings_config::AppConfig;
pub use standings_config::MEMORY_DATABASE_URL;
use standings_dispatcher::{AuditLogger, HealthMonitor, JobQueue, LeaseRecoveryService, SnapshotManager};
use standings_infrastructure::{DatabaseManager, InMemoryRepositories, Repositories, RetentionSweeper};
use standings_worker::{RecalculationExecutor, WorkerPool};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// worker、API 与维护任务全部运行
    All,
    /// 重算 worker 与租约回收
    Worker,
    /// 仅 HTTP 接口
    Api,
    /// 保留期清理与租约回收
    Maintenance,
}

/// 组装好的应用，所有组件共享同一组仓储
pub struct Application {
    config: AppConfig,
    database: Option<DatabaseManager>,
    queue: Arc<JobQueue>,
    snapshots: Arc<SnapshotManager>,
    audit: Arc<AuditLogger>,
    health: Arc<HealthMonitor>,
    sweeper: Arc<RetentionSweeper>,
    executor: Arc<RecalculationExecutor>,
}

impl Application {
    /// 按配置连接存储并组装组件
    pub async fn new(config: AppConfig) -> Result<Self> {
        if config.database.is_memory() {
            info!("使用内存存储，数据不会持久化");
            return Ok(Self::with_repositories(
                config,
                InMemoryRepositories::new().repositories(),
                None,
            ));
        }

        info!("连接数据库: {}", mask_database_url(&config.database.url));
        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("初始化数据库表结构失败")?;
        info!("数据库连接成功");

        let repositories = database.repositories();
        Ok(Self::with_repositories(config, repositories, Some(database)))
    }

    pub fn with_repositories(
        config: AppConfig,
        repositories: Repositories,
        database: Option<DatabaseManager>,
    ) -> Self {
        let audit = Arc::new(AuditLogger::new(repositories.audit_logs.clone()));
        let snapshots = Arc::new(SnapshotManager::new(
            repositories.snapshots.clone(),
            repositories.standings.clone(),
            audit.clone(),
        ));
        let queue = Arc::new(JobQueue::new(
            repositories.jobs.clone(),
            snapshots.clone(),
            audit.clone(),
            config.queue.clone(),
        ));
        let health = Arc::new(HealthMonitor::new(
            repositories.jobs.clone(),
            repositories.snapshots.clone(),
            repositories.standings.clone(),
            repositories.audit_logs.clone(),
            config.monitoring.clone(),
        ));
        let executor = Arc::new(
            RecalculationExecutor::new(
                repositories.standings.clone(),
                repositories.matches.clone(),
                snapshots.clone(),
                audit.clone(),
            )
            .with_calculation_config(&config.calculation)
            .with_calculation_timeout(Duration::from_secs(
                config.worker.calculation_timeout_seconds,
            )),
        );
        let sweeper = Arc::new(RetentionSweeper::new(repositories, config.retention.clone()));

        Self {
            config,
            database,
            queue,
            snapshots,
            audit,
            health,
            sweeper,
            executor,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn sweeper(&self) -> &Arc<RetentionSweeper> {
        &self.sweeper
    }

    pub fn api_state(&self) -> AppState {
        AppState {
            queue: self.queue.clone(),
            snapshots: self.snapshots.clone(),
            audit: self.audit.clone(),
            health: self.health.clone(),
            sweeper: self.sweeper.clone(),
        }
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, mode: AppMode, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", mode);

        match mode {
            AppMode::Worker => self.run_worker(shutdown_rx).await?,
            AppMode::Api => self.run_api(shutdown_rx).await?,
            AppMode::Maintenance => self.run_maintenance(shutdown_rx).await?,
            AppMode::All => self.run_all_components(shutdown_rx).await?,
        }

        Ok(())
    }

    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if !self.config.worker.enabled {
            info!("worker 已在配置中禁用");
            return Ok(());
        }

        let pool = WorkerPool::new(&self.config.worker, self.queue.clone(), self.executor.clone());
        info!("启动 worker: {:?}", pool.worker_ids());
        let mut handles = pool.start(&shutdown_rx);
        handles.push(self.spawn_lease_recovery(shutdown_rx.resubscribe()));

        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker 任务异常退出: {}", e);
            }
        }

        info!("Worker服务已停止");
        Ok(())
    }

    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if !self.config.api.enabled {
            info!("API 已在配置中禁用");
            return Ok(());
        }

        let app = create_app(self.api_state(), &self.config.api);
        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;

        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }

    async fn run_maintenance(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.sweeper.start().await.context("启动保留期清理失败")?;
        let recovery = self.spawn_lease_recovery(shutdown_rx.resubscribe());

        let _ = shutdown_rx.recv().await;
        info!("维护任务收到关闭信号");

        self.sweeper.stop().await.context("停止保留期清理失败")?;
        let _ = recovery.await;
        Ok(())
    }

    async fn run_all_components(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动所有组件");
        self.sweeper.start().await.context("启动保留期清理失败")?;

        let worker = self.run_worker(shutdown_rx.resubscribe());
        let api = self.run_api(shutdown_rx.resubscribe());
        let (worker_result, api_result) = tokio::join!(worker, api);

        self.sweeper.stop().await.context("停止保留期清理失败")?;
        worker_result?;
        api_result?;

        info!("所有组件已停止");
        Ok(())
    }

    fn spawn_lease_recovery(
        &self,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let recovery = LeaseRecoveryService::new(self.queue.clone());
        tokio::spawn(async move { recovery.run(shutdown_rx).await })
    }

    pub async fn close(&self) {
        if let Some(database) = &self.database {
            database.close().await;
        }
    }
}

/// 屏蔽数据库URL中的敏感信息
fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}
