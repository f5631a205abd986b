use crate::services::{
    accrual::AccrualError,
    referral::ReferralGraph,
    shared::{retry_transient, KeyedLock, RetryPolicy},
};
use database::{Account, DynLedgerStore, LevelIncomeEntry};
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use utils::{Money, ProcessDate};

/// 层级收益最多向上发放的层数
pub const MAX_LEVEL: u32 = 3;

/// (层级, 百分比)
pub const LEVEL_PERCENT: [(u32, u32); 3] = [(1, 5), (2, 3), (3, 2)];

/// 层级对应的收益百分比，超出表外的层级为0
pub fn level_percent(level: u32) -> Decimal {
    LEVEL_PERCENT
        .iter()
        .find(|(l, _)| *l == level)
        .map(|(_, percent)| Decimal::from(*percent))
        .unwrap_or(Decimal::ZERO)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PayoutSummary {
    /// 本次新入账的层数
    #[serde(rename = "levelsCredited")]
    pub levels_credited: u32,
    /// 之前已经入账过、本次跳过的层数
    #[serde(rename = "levelsAlreadyPaid")]
    pub levels_already_paid: u32,
    #[serde(rename = "totalCredited")]
    pub total_credited: Money,
}

/// 层级收益分配
///
/// 以下级当日计息金额为基数，沿推荐链向上最多 [`MAX_LEVEL`] 层，
/// 第L层上级获得 `base × LEVEL_PERCENT[L] / 100`。每层各自写入、各自去重，
/// 重复调用不会重复入账。
#[derive(Clone)]
pub struct PayoutDistributor {
    ledger: DynLedgerStore,
    graph: ReferralGraph,
    locks: Arc<KeyedLock>,
    retry: RetryPolicy,
}

impl PayoutDistributor {
    pub fn new(ledger: DynLedgerStore, graph: ReferralGraph, locks: Arc<KeyedLock>, retry: RetryPolicy) -> Self {
        Self {
            ledger,
            graph,
            locks,
            retry,
        }
    }

    pub async fn distribute(
        &self,
        origin: &Account,
        source_position: ObjectId,
        base_amount: Money,
        date: ProcessDate,
    ) -> Result<PayoutSummary, AccrualError> {
        let origin_id = origin
            .id
            .ok_or_else(|| AccrualError::DataIntegrity("payout origin account has no id".to_string()))?;

        if base_amount.is_negative() {
            return Err(AccrualError::InvariantViolation(format!(
                "negative payout base {} for position {}",
                base_amount, source_position
            )));
        }

        let mut summary = PayoutSummary::default();
        if !base_amount.is_positive() || origin.referred_by.is_none() {
            return Ok(summary);
        }

        let ancestors = retry_transient(&self.retry, "解析推荐链", || self.graph.ancestors_of(origin, MAX_LEVEL)).await?;

        for (index, parent) in ancestors.iter().enumerate() {
            let level = index as u32 + 1;
            let Some(parent_id) = parent.id else {
                return Err(AccrualError::DataIntegrity(format!("level {} parent has no id", level)));
            };

            let amount = base_amount.percent_of(level_percent(level));
            if !amount.is_positive() {
                debug!("💤 第{}层收益为0，跳过 parent={}", level, parent_id);
                continue;
            }

            let entry = LevelIncomeEntry {
                source_account: origin_id,
                source_position,
                level,
                amount,
                date,
            };

            let applied = {
                let _guard = self.locks.lock(parent_id).await;
                retry_transient(&self.retry, "发放层级收益", || self.ledger.credit_level_income(&parent_id, &entry)).await?
            };

            if applied {
                summary.levels_credited += 1;
                summary.total_credited += amount;
                debug!(
                    "💰 第{}层收益入账: parent={} source={} position={} amount={} date={}",
                    level, parent_id, origin_id, source_position, amount, date
                );
            } else {
                summary.levels_already_paid += 1;
                debug!("⏭️ 第{}层收益已入账过: parent={} position={} date={}", level, parent_id, source_position, date);
            }
        }

        if summary.levels_credited > 0 {
            info!(
                "💸 层级收益分配完成: source={} position={} base={} levels={} total={}",
                origin_id, source_position, base_amount, summary.levels_credited, summary.total_credited
            );
        }

        Ok(summary)
    }
}
