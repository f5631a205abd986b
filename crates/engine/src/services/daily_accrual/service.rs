use super::report::{AccrualRunReport, SkipReason, UnitOutcome};
use crate::services::{
    accrual::{AccrualComputer, AccrualError, FailureKind},
    payout::{PayoutDistributor, PayoutSummary},
    shared::{retry_transient, KeyedLock, RetryPolicy},
};
use chrono::{DateTime, Utc};
use database::{AccrualCommit, AccrualCommitOutcome, AccrualRecord, DynLedgerStore, Position};
use mongodb::bson::oid::ObjectId;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};
use utils::{AppConfig, AppError, AppResult, ProcessDate};

/// 收尾阶段每页读取的待补发记录数
const SETTLE_BATCH: i64 = 500;

#[derive(Debug, Clone)]
pub struct AccrualSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
    /// 软截止时间，到点后不再派发新的仓位
    pub batch_deadline: Option<Duration>,
    pub settle_batch: i64,
}

impl Default for AccrualSettings {
    fn default() -> Self {
        Self {
            workers: 8,
            retry: RetryPolicy::default(),
            batch_deadline: Some(Duration::from_secs(600)),
            settle_batch: SETTLE_BATCH,
        }
    }
}

impl From<&AppConfig> for AccrualSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.accrual_workers.max(1),
            retry: RetryPolicy::new(config.accrual_max_attempts, config.retry_delay()),
            batch_deadline: config.batch_deadline(),
            settle_batch: SETTLE_BATCH,
        }
    }
}

/// 每日计息编排
///
/// 对计息日 D：
/// 1. 取出 D 当天有效的 ACTIVE 仓位；
/// 2. 在有界工作池里逐个处理：水位线检查、计息记录检查、读账户、计算、原子提交、层级收益分配；
/// 3. 补发历史上未发放完成的层级收益；
/// 4. 把到期仓位置为 COMPLETED。
///
/// 同一日期重复执行或并发执行都不会重复入账。单个仓位的失败只记入报告，
/// 只有加载仓位列表失败才会返回错误。
pub struct DailyAccrualService {
    ledger: DynLedgerStore,
    worker: PositionWorker,
    settings: AccrualSettings,
    cancelled: AtomicBool,
}

impl DailyAccrualService {
    pub fn new(
        ledger: DynLedgerStore,
        distributor: Arc<PayoutDistributor>,
        locks: Arc<KeyedLock>,
        settings: AccrualSettings,
    ) -> Self {
        let worker = PositionWorker {
            ledger: ledger.clone(),
            distributor,
            locks,
            retry: settings.retry,
        };

        Self {
            ledger,
            worker,
            settings,
            cancelled: AtomicBool::new(false),
        }
    }

    /// 以调度时刻所在的UTC自然日为计息日
    pub async fn run_daily_accrual_at(&self, at: DateTime<Utc>) -> AppResult<AccrualRunReport> {
        self.run_daily_accrual(ProcessDate::from_datetime(at)).await
    }

    pub async fn run_daily_accrual(&self, process_date: ProcessDate) -> AppResult<AccrualRunReport> {
        let started = Instant::now();
        let deadline = self.settings.batch_deadline.map(|limit| started + limit);
        info!("🚀 开始每日计息: date={} workers={}", process_date, self.settings.workers);

        let positions = retry_transient(&self.settings.retry, "扫描可计息仓位", || {
            self.ledger.find_active_positions(process_date)
        })
        .await
        .map_err(|e| {
            error!("❌ 扫描可计息仓位失败: date={} err={}", process_date, e);
            e
        })?;

        let mut report = AccrualRunReport::new(process_date, positions.len());
        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending = positions.into_iter();

        while let Some(position) = pending.next() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::InternalServerErrorWithContext(format!("accrual worker pool closed: {}", e)))?;

            if self.should_stop(deadline) {
                report.deferred = 1 + pending.len();
                warn!(
                    "⏸️ 停止派发新的仓位: date={} cancelled={} deferred={}",
                    process_date,
                    self.is_cancelled(),
                    report.deferred
                );
                break;
            }

            let worker = self.worker.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = worker.process(&position, process_date).await;
                (position.id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position_id, result)) => report.record(position_id, result),
                Err(e) => report.record_failure(None, FailureKind::Aborted, e.to_string()),
            }
        }

        if report.is_complete() && !self.is_cancelled() {
            self.settle_pending_payouts(&mut report).await;

            match retry_transient(&self.settings.retry, "到期仓位收尾", || {
                self.ledger.complete_matured_positions(process_date)
            })
            .await
            {
                Ok(matured) => report.matured = matured,
                Err(e) => warn!("⚠️ 到期仓位收尾失败: date={} err={}", process_date, e),
            }
        }

        self.worker.locks.prune();
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.log_summary();

        Ok(report)
    }

    /// 停止派发新的仓位；正在处理的仓位会完成。取消后该实例不再派发任何工作。
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            info!("🛑 每日计息已取消，等待进行中的仓位完成");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn should_stop(&self, deadline: Option<Instant>) -> bool {
        self.is_cancelled() || deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// 补发层级收益未完成的历史计息记录
    ///
    /// 按 (date, _id) 分页向后读取，补发失败的记录留在原处，不会挡住后面的记录。
    async fn settle_pending_payouts(&self, report: &mut AccrualRunReport) {
        let page_size = self.settings.settle_batch.max(1);
        let mut after = None;

        loop {
            let records = match retry_transient(&self.settings.retry, "查询待补发记录", || {
                self.ledger.find_unsettled_accrual_records(after, page_size)
            })
            .await
            {
                Ok(records) => records,
                Err(e) => {
                    warn!("⚠️ 查询待补发的层级收益失败: {}", e);
                    return;
                }
            };

            if records.is_empty() {
                return;
            }
            debug!("🧾 待补发层级收益的计息记录: {}", records.len());

            let last_page = (records.len() as i64) < page_size;
            after = records.last().and_then(|r| r.id.map(|id| (r.date, id)));

            for record in records {
                if self.is_cancelled() {
                    return;
                }
                match self.worker.settle(&record).await {
                    Ok(payout) => {
                        report.payouts_settled += 1;
                        report.total_level_income += payout.total_credited;
                    }
                    Err(e) => report.record_failure(Some(record.position), e.kind(), e.to_string()),
                }
            }

            if last_page || after.is_none() {
                return;
            }
        }
    }
}

/// 单个仓位的处理逻辑，可以被克隆进工作任务
#[derive(Clone)]
struct PositionWorker {
    ledger: DynLedgerStore,
    distributor: Arc<PayoutDistributor>,
    locks: Arc<KeyedLock>,
    retry: RetryPolicy,
}

impl PositionWorker {
    async fn process(&self, position: &Position, date: ProcessDate) -> Result<UnitOutcome, AccrualError> {
        let position_id = position
            .id
            .ok_or_else(|| AccrualError::DataIntegrity("position loaded without id".to_string()))?;

        // a. 水位线
        if position.is_accrued_on(date) {
            debug!("⏭️ 仓位 {} 已在 {} 计息", position_id, date);
            return Ok(UnitOutcome::Skipped(SkipReason::AlreadyAccrued));
        }

        // b. 计息记录
        let existing = retry_transient(&self.retry, "查询计息记录", || {
            self.ledger.find_accrual_record(&position.account, &position_id, date)
        })
        .await?;
        if let Some(record) = existing {
            return self.repair(position, position_id, &record, date).await;
        }

        // c. 账户
        let account = retry_transient(&self.retry, "读取账户", || self.ledger.get_account(&position.account))
            .await?
            .ok_or_else(|| missing_account(position_id, &position.account))?;

        // d. 计算
        let amount = AccrualComputer::compute(position, date)?;

        // e. 原子提交
        let commit = AccrualCommit {
            account: position.account,
            position: position_id,
            date,
            amount,
        };
        let outcome = {
            let _guard = self.locks.lock(position.account).await;
            retry_transient(&self.retry, "提交计息", || self.ledger.commit_accrual(&commit)).await?
        };
        let record = match outcome {
            AccrualCommitOutcome::Committed(record) => record,
            AccrualCommitOutcome::AlreadyApplied => {
                debug!("⏭️ 仓位 {} 在 {} 的计息已由其他执行者提交", position_id, date);
                return Ok(UnitOutcome::Skipped(SkipReason::ConcurrentlyApplied));
            }
            AccrualCommitOutcome::AccountMissing => return Err(missing_account(position_id, &position.account)),
        };
        debug!("✅ 仓位 {} 计息 {} 已提交: account={} date={}", position_id, amount, position.account, date);

        // f. 层级收益
        let payout = self
            .distributor
            .distribute(&account, position_id, amount, date)
            .await
            .map_err(|e| payout_incomplete(position_id, date, e))?;
        self.mark_settled(&record).await;

        Ok(UnitOutcome::Accrued { amount, payout })
    }

    /// 计息记录已存在：水位线落后就修复；层级收益未发放完成就补发
    async fn repair(
        &self,
        position: &Position,
        position_id: ObjectId,
        record: &AccrualRecord,
        date: ProcessDate,
    ) -> Result<UnitOutcome, AccrualError> {
        if !position.watermark_behind(date) {
            return Ok(UnitOutcome::Skipped(SkipReason::RecordExists));
        }

        let advanced = retry_transient(&self.retry, "修复水位线", || {
            self.ledger.advance_watermark(&position_id, date)
        })
        .await?;
        if advanced {
            warn!(
                "🩹 计息记录已存在但水位线落后，已修复: position={} date={} watermark={:?}",
                position_id, date, position.last_accrual_date
            );
        }

        let payout = if record.payout_settled {
            None
        } else {
            Some(self.settle(record).await?)
        };

        Ok(UnitOutcome::Repaired { payout })
    }

    /// 按计息记录重新分配层级收益；已入账的层级会被去重跳过
    async fn settle(&self, record: &AccrualRecord) -> Result<PayoutSummary, AccrualError> {
        let account = retry_transient(&self.retry, "读取账户", || self.ledger.get_account(&record.account))
            .await?
            .ok_or_else(|| missing_account(record.position, &record.account))?;

        let payout = self
            .distributor
            .distribute(&account, record.position, record.amount, record.date)
            .await
            .map_err(|e| payout_incomplete(record.position, record.date, e))?;
        self.mark_settled(record).await;

        if payout.levels_credited > 0 {
            info!(
                "🔧 补发层级收益: position={} date={} levels={} total={}",
                record.position, record.date, payout.levels_credited, payout.total_credited
            );
        }

        Ok(payout)
    }

    /// 标记失败不影响结果，下一轮收尾时重新分配会被去重
    async fn mark_settled(&self, record: &AccrualRecord) {
        let Some(record_id) = record.id else {
            return;
        };
        if let Err(e) = retry_transient(&self.retry, "标记层级收益已发放", || {
            self.ledger.mark_payout_settled(&record_id)
        })
        .await
        {
            warn!("⚠️ 标记层级收益已发放失败: record={} err={}", record_id, e);
        }
    }
}

fn missing_account(position_id: ObjectId, account_id: &ObjectId) -> AccrualError {
    AccrualError::DataIntegrity(format!(
        "position {} references missing account {}",
        position_id, account_id
    ))
}

fn payout_incomplete(position_id: ObjectId, date: ProcessDate, e: AccrualError) -> AccrualError {
    match e {
        AccrualError::InvariantViolation(_) | AccrualError::DataIntegrity(_) => e,
        other => AccrualError::PayoutIncomplete(format!(
            "accrual committed for position {} on {}, level income pending: {}",
            position_id, date, other
        )),
    }
}
