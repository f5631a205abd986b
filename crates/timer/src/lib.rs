// Timer: 每日UTC 00:00 触发计息
// - 计息日取本次调度时刻所在的自然日，而不是醒来时的墙钟
// - 一轮结束仍有未派发的仓位时，在同一计息日内继续补跑，最多 max_passes 轮
use chrono::{DateTime, Utc};
use cron::Schedule;
use engine::services::{daily_accrual::AccrualRunReport, Services};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::{sync::Notify, time::sleep_until};
use tracing::{error, info, warn};
use utils::{AppError, AppResult, ProcessDate};

pub const DEFAULT_SCHEDULE: &str = "0 0 0 * * *";

#[derive(Clone)]
pub struct Timer {
    pub time: String,
    pub services: Services,
    pub max_passes: u32,
    shutdown: Arc<Notify>,
}

impl Timer {
    // "0 0 0 * * *": 每天00:00:00执行
    pub fn new(time: Option<String>, services: Services, max_passes: u32) -> Self {
        Timer {
            time: time.unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            services,
            max_passes: max_passes.max(1),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn schedule(&self) -> AppResult<Schedule> {
        Schedule::from_str(&self.time)
            .map_err(|e| AppError::BadRequest(format!("invalid accrual cron '{}': {}", self.time, e)))
    }

    /// 停止调度，并让进行中的计息停止派发新的仓位
    pub fn shutdown(&self) {
        self.services.daily_accrual.cancel();
        self.shutdown.notify_one();
    }

    pub async fn run(self: Arc<Self>) -> AppResult<()> {
        let schedule = self.schedule()?;
        info!("⏳ Timer action at {} everyday.", self.time);

        loop {
            let Some(next_run_time) = schedule.upcoming(Utc).next() else {
                warn!("⚠️ cron '{}' 没有下一次触发时间，定时器退出", self.time);
                return Ok(());
            };

            let duration_until_next_run = (next_run_time - Utc::now()).to_std().unwrap_or(Duration::from_secs(0));

            tokio::select! {
                _ = sleep_until(tokio::time::Instant::now() + duration_until_next_run) => {}
                _ = self.shutdown.notified() => {
                    info!("🛑 定时器收到停止信号");
                    return Ok(());
                }
            }

            self.run_for(next_run_time).await;
        }
    }

    /// 对调度时刻对应的计息日执行一次，必要时补跑
    pub async fn run_for(&self, scheduled_at: DateTime<Utc>) -> Option<AccrualRunReport> {
        let process_date = ProcessDate::from_datetime(scheduled_at);
        let daily_accrual = &self.services.daily_accrual;
        let mut last_report = None;

        for pass in 1..=self.max_passes {
            if daily_accrual.is_cancelled() {
                break;
            }

            match daily_accrual.run_daily_accrual(process_date).await {
                Ok(report) => {
                    let complete = report.is_complete();
                    if !complete {
                        warn!(
                            "🔁 计息日 {} 第{}轮结束仍有 {} 个仓位未派发",
                            process_date, pass, report.deferred
                        );
                    }
                    last_report = Some(report);
                    if complete {
                        break;
                    }
                }
                Err(e) => {
                    error!("❌ 每日计息失败: date={} pass={} err={}", process_date, pass, e);
                }
            }
        }

        last_report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use database::{memory::MemoryLedger, Account, AccountRepositoryTrait, DynLedgerStore, Position, PositionRepositoryTrait};
    use engine::services::{daily_accrual::AccrualSettings, shared::RetryPolicy};
    use rust_decimal::Decimal;
    use utils::Money;

    fn day(d: u32) -> ProcessDate {
        ProcessDate::from_ymd(2024, 3, d).unwrap()
    }

    async fn seeded_ledger() -> (Arc<MemoryLedger>, mongodb::bson::oid::ObjectId) {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = ledger.create_account(&Account::new("alice", "ALICE", None)).await.unwrap();
        let position = Position::new(
            owner,
            Money::from_str("1000").unwrap(),
            "PLAN_A",
            Decimal::from_str("1.5").unwrap(),
            day(1),
            day(30),
        )
        .unwrap();
        ledger.create_position(&position).await.unwrap();
        (ledger, owner)
    }

    fn timer(ledger: &Arc<MemoryLedger>, batch_deadline: Option<Duration>) -> Timer {
        let settings = AccrualSettings {
            workers: 2,
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            batch_deadline,
            settle_batch: 500,
        };
        Timer::new(None, Services::new(ledger.clone() as DynLedgerStore, settings), 3)
    }

    #[test]
    fn test_default_schedule_is_valid() {
        let ledger = Arc::new(MemoryLedger::new());
        let timer = timer(&ledger, None);

        assert_eq!(timer.time, DEFAULT_SCHEDULE);
        assert!(timer.schedule().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_rejected() {
        let (ledger, _) = seeded_ledger().await;
        let mut timer = timer(&ledger, None);
        timer.time = "every day".to_string();

        assert!(matches!(Arc::new(timer).run().await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_run_for_uses_scheduled_day() {
        let (ledger, owner) = seeded_ledger().await;
        let timer = timer(&ledger, None);
        let scheduled_at = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

        let report = timer.run_for(scheduled_at).await.unwrap();

        assert_eq!(report.process_date, "2024-03-02");
        assert_eq!(report.accrued, 1);
        assert_eq!(ledger.accrual_records()[0].date, day(2));
        assert_eq!(ledger.account_snapshot(&owner).unwrap().wallet_balance, Money::from_str("15.00").unwrap());
    }

    #[tokio::test]
    async fn test_run_for_gives_up_after_max_passes() {
        let (ledger, _) = seeded_ledger().await;
        let timer = timer(&ledger, Some(Duration::ZERO));
        let scheduled_at = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

        let report = timer.run_for(scheduled_at).await.unwrap();

        assert_eq!(report.deferred, 1);
        assert!(ledger.accrual_records().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let (ledger, _) = seeded_ledger().await;
        let timer = Arc::new(timer(&ledger, None));

        let handle = tokio::spawn(timer.clone().run());
        timer.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
        assert!(timer.services.daily_accrual.is_cancelled());
        assert!(timer.run_for(Utc::now()).await.is_none());
    }
}
