use anyhow::{Context, Result};
use clap::Parser;
use engine::Services;
use std::sync::Arc;
use timer::Timer;
use tokio::{signal, task::JoinSet};
use tracing::{error, info, warn};
use utils::{AppConfig, Logger, ProcessDate};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RoiAccrual::with_config();
    let _guard = Logger::new(config.cargo_env, &config.rust_log);

    let app = RoiAccrual::new(config).await?;
    app.run().await
}

pub struct RoiAccrual {
    services: Services,
    timer: Arc<Timer>,
    config: Arc<AppConfig>,
}

impl RoiAccrual {
    pub async fn new(config: Arc<AppConfig>) -> Result<Self> {
        let services = Services::from_config(config.clone())
            .await
            .context("🔴 Failed to initialize services")?;
        let timer = Arc::new(RoiAccrual::with_timer(&config, services.clone()));

        Ok(Self {
            services,
            timer,
            config,
        })
    }

    pub async fn run(self) -> Result<()> {
        // 手动补跑：执行一次后退出
        if let Some(date) = self.config.run_once.as_deref() {
            return self.run_once(date).await;
        }

        let mut set = JoinSet::new();
        let timer = self.timer.clone();
        set.spawn(async move { timer.run().await });

        tokio::select! {
            joined = set.join_next() => {
                if let Some(joined) = joined {
                    joined.context("🔴 Timer task panicked")?.context("🔴 Timer stopped")?;
                }
            },
            _ = shutdown_signal() => {
                info!("🔔 Shutdown signal received, stopping timer...");
                self.timer.shutdown();
                while let Some(joined) = set.join_next().await {
                    if let Err(e) = joined {
                        error!("❌ Timer task ended abnormally: {}", e);
                    }
                }
            },
        }

        info!("👋 roi-accrual stopped");
        Ok(())
    }

    async fn run_once(&self, date: &str) -> Result<()> {
        let process_date = ProcessDate::parse(date).context("🔴 Invalid --run-once date")?;
        info!("🔧 Manual accrual run for {}", process_date);

        let daily_accrual = self.services.daily_accrual.clone();
        let run = daily_accrual.run_daily_accrual(process_date);
        tokio::pin!(run);

        let report = tokio::select! {
            report = &mut run => report,
            _ = shutdown_signal() => {
                daily_accrual.cancel();
                run.await
            }
        }
        .context("🔴 Daily accrual failed")?;

        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.failures.is_empty() || !report.is_complete() {
            warn!(
                "⚠️ Manual run finished with {} failed and {} deferred positions",
                report.failed, report.deferred
            );
        }

        Ok(())
    }
}

impl RoiAccrual {
    fn with_config() -> Arc<AppConfig> {
        // 根据 CARGO_ENV 加载对应的环境配置文件
        utils::EnvLoader::load_env_file().ok();
        Arc::new(AppConfig::parse())
    }

    fn with_timer(config: &AppConfig, services: Services) -> Timer {
        Timer::new(Some(config.accrual_cron.clone()), services, config.accrual_max_passes)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("🔴 Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("🔔 Ctrl+C received");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("🔔 Terminate signal received");
            }
            Err(e) => {
                error!("🔴 Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("❌ Signal received, starting graceful shutdown...");
}
