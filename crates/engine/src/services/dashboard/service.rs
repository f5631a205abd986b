use async_trait::async_trait;
use database::{DynLedgerStore, LevelIncomeEntry, PositionStatus};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use std::sync::Arc;
use utils::{AppError, AppResult, Money, ProcessDate};

pub type DynDashboardService = Arc<dyn DashboardServiceTrait + Send + Sync>;

/// 账户总览
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub account_id: String,
    pub name: String,
    pub referral_code: String,
    pub wallet_balance: Money,
    /// 全部仓位本金合计
    pub total_investments: Money,
    pub active_positions: usize,
    /// 累计投资收益
    pub total_roi: Money,
    /// 累计层级收益
    pub total_level_income: Money,
    /// 计息日等于 `today` 的收益合计
    pub today_roi: Money,
    /// 层级收益流水，按写入顺序
    pub level_income: Vec<LevelIncomeEntry>,
}

#[async_trait]
pub trait DashboardServiceTrait {
    async fn summary(&self, account_id: &ObjectId, today: ProcessDate) -> AppResult<DashboardSummary>;
}

#[derive(Clone)]
pub struct DashboardService {
    ledger: DynLedgerStore,
}

impl DashboardService {
    pub fn new(ledger: DynLedgerStore) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl DashboardServiceTrait for DashboardService {
    async fn summary(&self, account_id: &ObjectId, today: ProcessDate) -> AppResult<DashboardSummary> {
        let account = self
            .ledger
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account with id: {} not found.", account_id)))?;

        let positions = self.ledger.find_positions_by_account(account_id).await?;
        let records = self.ledger.find_accrual_records_by_account(account_id).await?;

        let total_investments: Money = positions.iter().map(|p| p.principal).sum();
        let active_positions = positions.iter().filter(|p| p.status == PositionStatus::Active).count();
        let today_roi: Money = records.iter().filter(|r| r.date == today).map(|r| r.amount).sum();

        Ok(DashboardSummary {
            account_id: account_id.to_hex(),
            name: account.name.clone(),
            referral_code: account.referral_code.clone(),
            wallet_balance: account.wallet_balance,
            total_investments,
            active_positions,
            total_roi: account.roi_balance.total_accrued,
            total_level_income: account.total_level_income(),
            today_roi,
            level_income: account.level_income,
        })
    }
}
