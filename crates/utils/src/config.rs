use clap::Parser;
use std::time::Duration;

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
#[clap(rename_all = "lowercase")]
pub enum CargoEnv {
    Development,
    Production,
}

/// 环境配置加载器
pub struct EnvLoader;

impl EnvLoader {
    /// 根据 CARGO_ENV 加载对应的环境配置文件
    pub fn load_env_file() -> Result<(), Box<dyn std::error::Error>> {
        // 1. 获取环境变量 CARGO_ENV development
        let cargo_env = std::env::var("CARGO_ENV").unwrap_or_else(|_| "development".to_string());
        println!("cargo_env: {}", cargo_env);
        // 2. 构建配置文件路径
        let env_file = match cargo_env.as_str() {
            "production" | "Production" | "prod" => ".env.production",
            "development" | "Development" | "dev" => ".env.development",
            "test" | "Test" => ".env.test",
            _ => {
                println!("⚠️  未知的 CARGO_ENV: {}，使用默认的 .env.development", cargo_env);
                ".env.development"
            }
        };
        // 3. 检查文件是否存在
        if !std::path::Path::new(env_file).exists() {
            eprintln!("⚠️  配置文件 {} 不存在，尝试加载默认的 .env 文件", env_file);
            if std::path::Path::new(".env").exists() {
                dotenvy::from_filename(".env")?;
                println!("✅ 已加载默认配置文件: .env");
            } else {
                eprintln!("❌ 未找到任何配置文件，使用默认配置");
            }
            return Ok(());
        }

        // 4. 加载指定的环境配置文件
        dotenvy::from_filename(env_file)?;
        println!("✅ 已加载环境配置文件: {} (CARGO_ENV={})", env_file, cargo_env);

        Ok(())
    }
}

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    #[clap(long, env, default_value = "mongodb://localhost:27017")]
    pub mongo_uri: String,

    #[clap(long, env)]
    pub mongo_db: String,

    #[clap(long, env, default_value = "info")]
    pub rust_log: String,

    /// 每日计息的cron表达式（UTC），默认每天00:00:00
    #[clap(long, env, default_value = "0 0 0 * * *")]
    pub accrual_cron: String,

    /// 计息工作池并发上限
    #[clap(long, env, default_value = "8")]
    pub accrual_workers: usize,

    /// 单个仓位遇到临时存储错误时的最大尝试次数
    #[clap(long, env, default_value = "3")]
    pub accrual_max_attempts: u32,

    #[clap(long, env, default_value = "200")]
    pub accrual_retry_delay_ms: u64,

    /// 超过该时长后不再派发新的仓位，剩余部分留给下一轮；0 表示不限制
    #[clap(long, env, default_value = "600")]
    pub accrual_batch_deadline_secs: u64,

    /// 同一计息日内，定时器对遗留仓位的最大补跑轮数
    #[clap(long, env, default_value = "3")]
    pub accrual_max_passes: u32,

    /// 手动补跑某一天（YYYY-MM-DD），执行一次后退出
    #[clap(long, env)]
    pub run_once: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        EnvLoader::load_env_file().ok();
        AppConfig::parse()
    }
}

impl AppConfig {
    /// 手动创建配置实例（用于测试）
    pub fn new_for_test() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            mongo_uri: std::env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            mongo_db: std::env::var("MONGO_DB").unwrap_or_else(|_| "test_db".to_string()),
            rust_log: "info".to_string(),
            accrual_cron: "0 0 0 * * *".to_string(),
            accrual_workers: 4,
            accrual_max_attempts: 3,
            accrual_retry_delay_ms: 1,
            accrual_batch_deadline_secs: 600,
            accrual_max_passes: 3,
            run_once: None,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.accrual_retry_delay_ms)
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        match self.accrual_batch_deadline_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
