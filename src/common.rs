use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use relay_core::AppConfig;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::{AppMode, Application};
use crate::shutdown::ShutdownManager;

/// 等待各组件退出的最长时间
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// 通用的应用启动配置
#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    pub config_path: Option<String>,
    /// 命令行指定时覆盖配置文件中的值
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl StartupConfig {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches.get_one::<String>("config").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            log_format: matches.get_one::<String>("log-format").cloned(),
        }
    }
}

/// 初始化日志系统
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 加载应用配置
pub fn load_config(startup_config: &StartupConfig) -> Result<AppConfig> {
    let path = startup_config.config_path.as_deref();
    AppConfig::load(path).with_context(|| match path {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })
}

/// 解析应用运行模式
pub fn parse_app_mode(mode_str: &str) -> Result<AppMode> {
    match mode_str {
        "producer" => Ok(AppMode::Producer),
        "consumer" => Ok(AppMode::Consumer),
        "all" => Ok(AppMode::All),
        _ => Err(anyhow::anyhow!("不支持的运行模式: {mode_str}")),
    }
}

/// 所有二进制共用的命令行参数
pub fn build_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .version(env!("CARGO_PKG_VERSION"))
        .about(about)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径（TOML）"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
}

/// 启动应用程序的通用函数
///
/// 收到 Ctrl+C / SIGTERM 时优雅关闭；任一组件失败时返回错误，进程以非零状态退出。
pub async fn start_application(
    startup_config: StartupConfig,
    app_mode: AppMode,
    service_name: &str,
) -> Result<()> {
    let config = load_config(&startup_config)?;

    let log_level = startup_config
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    let log_format = startup_config
        .log_format
        .as_deref()
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!("启动 {} 服务", service_name);
    if let Some(ref path) = startup_config.config_path {
        info!("配置文件: {}", path);
    }
    info!("运行模式: {:?}", app_mode);

    let app = Arc::new(Application::new(config, app_mode).await?);
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let shutdown_rx = shutdown_manager.subscribe();
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
        }
        result = &mut app_handle => {
            // 组件在没有关闭信号的情况下退出，只可能是出错
            let outcome = result.context("应用任务异常退出")?;
            return match outcome {
                Ok(()) => {
                    warn!("{} 服务意外停止", service_name);
                    Ok(())
                }
                Err(e) => {
                    error!("{} 服务运行失败: {:#}", service_name, e);
                    Err(e)
                }
            };
        }
    }

    shutdown_manager.shutdown();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, app_handle).await {
        Ok(Ok(Ok(()))) => info!("{} 服务已优雅关闭", service_name),
        Ok(Ok(Err(e))) => {
            error!("应用关闭时发生错误: {:#}", e);
            return Err(e);
        }
        Ok(Err(e)) => error!("应用任务异常退出: {}", e),
        Err(_) => warn!("{} 服务关闭超时，强制退出", service_name),
    }

    info!("{} 服务已退出", service_name);
    Ok(())
}

/// 单一模式二进制的入口
pub async fn run_cli(
    name: &'static str,
    about: &'static str,
    app_mode: AppMode,
    service_name: &str,
) -> Result<()> {
    let matches = build_command(name, about).get_matches();
    start_application(StartupConfig::from_matches(&matches), app_mode, service_name).await
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
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
