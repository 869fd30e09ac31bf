use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use standings::app::{AppMode, Application};
use standings::shutdown::ShutdownManager;
use standings_config::{AppConfig, OutputFormat};
use standings_domain::Actor;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "standings", version, about = "联赛积分榜自动化计算系统")]
struct Cli {
    /// 配置文件路径，缺省时按默认位置查找
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 日志级别，覆盖配置文件；RUST_LOG 优先
    #[arg(short, long, value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    All,
    Worker,
    Api,
    Maintenance,
}

impl From<ModeArg> for AppMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::All => AppMode::All,
            ModeArg::Worker => AppMode::Worker,
            ModeArg::Api => AppMode::Api,
            ModeArg::Maintenance => AppMode::Maintenance,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 运行服务，直到收到 Ctrl+C 或 SIGTERM
    Run {
        #[arg(short, long, value_enum, default_value = "all")]
        mode: ModeArg,
    },
    /// 请求重算某个联赛赛季
    Enqueue {
        #[arg(long)]
        league: i64,
        #[arg(long)]
        season: i64,
        /// 缺省使用 queue.default_priority
        #[arg(long)]
        priority: Option<i32>,
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// 以 queue.force_priority 入队
    ForceEnqueue {
        #[arg(long)]
        league: i64,
        #[arg(long)]
        season: i64,
        #[arg(long, default_value = "force_enqueue")]
        reason: String,
    },
    /// 用指定快照覆盖当前积分榜
    Restore {
        #[arg(long)]
        snapshot: i64,
    },
    /// 立即执行一次保留期清理
    Sweep,
    /// 打印队列和系统状况
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.to_string());
    let log_format = match cli.log_format {
        Some(LogFormatArg::Json) => OutputFormat::Json,
        Some(LogFormatArg::Pretty) => OutputFormat::Pretty,
        None => config.logging.format,
    };
    init_logging(&log_level, log_format)?;

    if config.observability.metrics_enabled {
        init_metrics(&config.observability.metrics_bind_address)?;
    }

    let app = Application::new(config).await?;
    match cli.command {
        Commands::Run { mode } => run_service(app, mode.into()).await,
        command => {
            let result = run_command(&app, command).await;
            app.close().await;
            result
        }
    }
}

async fn run_service(app: Application, mode: AppMode) -> Result<()> {
    info!("启动积分榜服务，模式: {:?}", mode);

    let shutdown_manager = ShutdownManager::new();
    let app = Arc::new(app);

    let app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe().await;
        tokio::spawn(async move { app.run(mode, shutdown_rx).await })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(Ok(()))) => info!("应用已优雅关闭"),
        Ok(Ok(Err(e))) => error!("应用运行失败: {:#}", e),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    app.close().await;
    info!("积分榜服务已退出");
    Ok(())
}

async fn run_command(app: &Application, command: Commands) -> Result<()> {
    match command {
        Commands::Run { .. } => Err(anyhow::anyhow!("run 命令需要以服务方式运行")),
        Commands::Enqueue {
            league,
            season,
            priority,
            reason,
        } => {
            let priority = priority.unwrap_or(app.config().queue.default_priority);
            let outcome = app.queue().enqueue(league, season, priority, &reason).await?;
            print_json(&outcome)
        }
        Commands::ForceEnqueue {
            league,
            season,
            reason,
        } => {
            let outcome = app.queue().force_enqueue(league, season, &reason).await?;
            print_json(&outcome)
        }
        Commands::Restore { snapshot } => {
            let table = app.snapshots().restore(snapshot, Actor::Manual, None).await?;
            print_json(&table)
        }
        Commands::Sweep => {
            let report = app.sweeper().run_once().await?;
            print_json(&report)
        }
        Commands::Health => {
            let queue = app.health().queue_health().await?;
            let system = app.health().system_health().await?;
            print_json(&serde_json::json!({ "queue": queue, "system": system }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("序列化输出失败")?;
    println!("{output}");
    Ok(())
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: OutputFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        OutputFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        OutputFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
    }

    Ok(())
}

/// 安装 Prometheus 导出器
fn init_metrics(bind_address: &str) -> Result<()> {
    let address: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("安装Prometheus导出器失败")?;

    info!("Prometheus 指标地址 http://{}/metrics", address);
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
