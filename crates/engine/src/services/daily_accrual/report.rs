use crate::services::{
    accrual::{AccrualError, FailureKind},
    payout::PayoutSummary,
};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use tracing::{error, info};
use utils::{Money, ProcessDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// 水位线已经等于计息日
    AlreadyAccrued,
    /// 计息记录已存在，水位线不落后
    RecordExists,
    /// 提交时发现另一个执行者已经写入
    ConcurrentlyApplied,
}

/// 单个仓位的处理结果（失败走 `Err(AccrualError)`）
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Accrued { amount: Money, payout: PayoutSummary },
    /// 计息记录已存在但水位线落后，已修复水位线；必要时补发层级收益
    Repaired { payout: Option<PayoutSummary> },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub position: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

/// 一次 `run_daily_accrual` 的汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualRunReport {
    pub process_date: String,
    pub scanned: usize,
    pub accrued: usize,
    pub repaired: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 因取消或超时未派发的仓位，下一轮补跑
    pub deferred: usize,
    /// 收尾阶段补发完成的历史计息记录
    pub payouts_settled: usize,
    /// 本轮转为 COMPLETED 的到期仓位
    pub matured: u64,
    pub total_accrued: Money,
    pub total_level_income: Money,
    pub failures: Vec<UnitFailure>,
    pub elapsed_ms: u64,
}

impl AccrualRunReport {
    pub fn new(process_date: ProcessDate, scanned: usize) -> Self {
        Self {
            process_date: process_date.to_string(),
            scanned,
            accrued: 0,
            repaired: 0,
            skipped: 0,
            failed: 0,
            deferred: 0,
            payouts_settled: 0,
            matured: 0,
            total_accrued: Money::ZERO,
            total_level_income: Money::ZERO,
            failures: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// 没有遗留未派发的仓位
    pub fn is_complete(&self) -> bool {
        self.deferred == 0
    }

    pub fn record(&mut self, position: Option<ObjectId>, result: Result<UnitOutcome, AccrualError>) {
        match result {
            Ok(UnitOutcome::Accrued { amount, payout }) => {
                self.accrued += 1;
                self.total_accrued += amount;
                self.total_level_income += payout.total_credited;
            }
            Ok(UnitOutcome::Repaired { payout }) => {
                self.repaired += 1;
                if let Some(payout) = payout {
                    self.total_level_income += payout.total_credited;
                }
            }
            Ok(UnitOutcome::Skipped(_)) => self.skipped += 1,
            Err(e) => self.record_failure(position, e.kind(), e.to_string()),
        }
    }

    pub fn record_failure(&mut self, position: Option<ObjectId>, kind: FailureKind, message: String) {
        let position = position.map(|id| id.to_hex());
        error!(
            "❌ 仓位计息失败: date={} position={} kind={:?} err={}",
            self.process_date,
            position.as_deref().unwrap_or("-"),
            kind,
            message
        );
        self.failed += 1;
        self.failures.push(UnitFailure {
            position,
            kind,
            message,
        });
    }

    pub fn log_summary(&self) {
        info!(
            "📊 每日计息完成: date={} scanned={} accrued={} repaired={} skipped={} failed={} deferred={} settled={} matured={} total_accrued={} total_level_income={} elapsed={}ms",
            self.process_date,
            self.scanned,
            self.accrued,
            self.repaired,
            self.skipped,
            self.failed,
            self.deferred,
            self.payouts_settled,
            self.matured,
            self.total_accrued,
            self.total_level_income,
            self.elapsed_ms
        );
    }
}
