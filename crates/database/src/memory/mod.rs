//! 内存账本
//!
//! 与MongoDB实现语义一致的 [`LedgerStore`]，所有写操作在同一把锁内完成，
//! 因此 `commit_accrual` 天然原子。附带少量故障注入开关，方便上层测试
//! 临时错误重试和致命错误路径。

use crate::{
    accrual::{AccrualRecord, AccrualRecordRepositoryTrait},
    account::{Account, AccountRepositoryTrait, LevelIncomeEntry},
    ledger::{AccrualCommit, AccrualCommitOutcome, LedgerStore},
    position::{Position, PositionRepositoryTrait, PositionStatus},
};
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use utils::{AppError, AppResult, ProcessDate};

#[cfg(test)]
mod tests;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<ObjectId, Account>,
    positions: HashMap<ObjectId, Position>,
    records: Vec<AccrualRecord>,
}

#[derive(Default)]
struct FaultPlan {
    commit_failures: u32,
    level_income_failures: u32,
    level_income_failures_for: HashMap<ObjectId, u32>,
    position_scan_fails: bool,
    commit_calls: u64,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    faults: Mutex<FaultPlan>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, FaultPlan> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 接下来 n 次 `commit_accrual` 返回临时错误
    pub fn fail_next_commits(&self, n: u32) {
        self.faults().commit_failures = n;
    }

    /// 接下来 n 次 `credit_level_income` 返回临时错误
    pub fn fail_next_level_income_credits(&self, n: u32) {
        self.faults().level_income_failures = n;
    }

    /// 接下来 n 次给指定上级发放层级收益时返回临时错误
    pub fn fail_next_level_income_credits_for(&self, parent_id: ObjectId, n: u32) {
        self.faults().level_income_failures_for.insert(parent_id, n);
    }

    /// 仓位扫描返回不可重试的错误
    pub fn fail_position_scan(&self, fail: bool) {
        self.faults().position_scan_fails = fail;
    }

    pub fn commit_calls(&self) -> u64 {
        self.faults().commit_calls
    }

    pub fn accrual_records(&self) -> Vec<AccrualRecord> {
        self.state().records.clone()
    }

    pub fn position_snapshot(&self, id: &ObjectId) -> Option<Position> {
        self.state().positions.get(id).cloned()
    }

    pub fn account_snapshot(&self, id: &ObjectId) -> Option<Account> {
        self.state().accounts.get(id).cloned()
    }

    /// 直接删除账户，用来构造数据完整性错误
    pub fn remove_account(&self, id: &ObjectId) -> Option<Account> {
        self.state().accounts.remove(id)
    }

    /// 直接改写上级指针，用来构造环形或自指的推荐关系
    pub fn set_referred_by(&self, id: &ObjectId, parent: Option<ObjectId>) {
        if let Some(account) = self.state().accounts.get_mut(id) {
            account.referred_by = parent;
        }
    }
}

#[async_trait]
impl AccountRepositoryTrait for MemoryLedger {
    async fn create_account(&self, account: &Account) -> AppResult<ObjectId> {
        let mut state = self.state();
        if state.accounts.values().any(|a| a.referral_code == account.referral_code) {
            return Err(AppError::Conflict(format!(
                "Account with referral code: {} already exists.",
                account.referral_code
            )));
        }

        let id = ObjectId::new();
        let mut new_doc = account.clone();
        new_doc.id = Some(id);
        new_doc.version = 0;
        state.accounts.insert(id, new_doc);

        Ok(id)
    }

    async fn get_account(&self, id: &ObjectId) -> AppResult<Option<Account>> {
        Ok(self.state().accounts.get(id).cloned())
    }

    async fn save_account(&self, account: &Account) -> AppResult<()> {
        let id = account
            .id
            .ok_or_else(|| AppError::BadRequest("cannot save an account without id".to_string()))?;

        let mut state = self.state();
        let stored = state
            .accounts
            .get_mut(&id)
            .filter(|stored| stored.version == account.version)
            .ok_or_else(|| AppError::VersionConflict(format!("account {} at version {}", id, account.version)))?;

        stored.wallet_balance = account.wallet_balance;
        stored.roi_balance = account.roi_balance.clone();
        stored.level_income = account.level_income.clone();
        stored.version += 1;

        Ok(())
    }

    async fn find_referred_accounts(&self, parent_ids: &[ObjectId]) -> AppResult<Vec<Account>> {
        let state = self.state();
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.referred_by.map(|p| parent_ids.contains(&p)).unwrap_or(false))
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.id);

        Ok(accounts)
    }

    async fn credit_level_income(&self, parent_id: &ObjectId, entry: &LevelIncomeEntry) -> AppResult<bool> {
        {
            let mut faults = self.faults();
            if faults.level_income_failures > 0 {
                faults.level_income_failures -= 1;
                return Err(AppError::VersionConflict(format!("injected failure for {}", parent_id)));
            }
            if let Some(remaining) = faults.level_income_failures_for.get_mut(parent_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::VersionConflict(format!("injected failure for {}", parent_id)));
                }
            }
        }

        let mut state = self.state();
        let parent = state
            .accounts
            .get_mut(parent_id)
            .ok_or_else(|| AppError::NotFound(format!("account {} not found", parent_id)))?;

        let applied = parent.apply_level_income(entry.clone());
        if applied {
            parent.version += 1;
        }

        Ok(applied)
    }
}

#[async_trait]
impl PositionRepositoryTrait for MemoryLedger {
    async fn create_position(&self, position: &Position) -> AppResult<ObjectId> {
        let id = ObjectId::new();
        let mut new_doc = position.clone();
        new_doc.id = Some(id);
        self.state().positions.insert(id, new_doc);

        Ok(id)
    }

    async fn get_position(&self, id: &ObjectId) -> AppResult<Option<Position>> {
        Ok(self.state().positions.get(id).cloned())
    }

    async fn find_active_positions(&self, date: ProcessDate) -> AppResult<Vec<Position>> {
        if self.faults().position_scan_fails {
            return Err(AppError::InternalServerErrorWithContext("position scan unavailable".to_string()));
        }

        let state = self.state();
        let mut positions: Vec<Position> = state
            .positions
            .values()
            .filter(|p| p.is_eligible_on(date))
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.id);

        Ok(positions)
    }

    async fn find_positions_by_account(&self, account: &ObjectId) -> AppResult<Vec<Position>> {
        let state = self.state();
        let mut positions: Vec<Position> = state
            .positions
            .values()
            .filter(|p| p.account == *account)
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.id);

        Ok(positions)
    }

    async fn save_position(&self, position: &Position) -> AppResult<()> {
        let id = position
            .id
            .ok_or_else(|| AppError::BadRequest("cannot save a position without id".to_string()))?;

        let mut state = self.state();
        let stored = state
            .positions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("position {} not found", id)))?;

        let moves_backward = match (stored.last_accrual_date, position.last_accrual_date) {
            (Some(current), Some(next)) => next < current,
            (Some(_), None) => true,
            _ => false,
        };
        if moves_backward {
            return Err(AppError::Conflict(format!(
                "position {} not found or its watermark is already past {:?}",
                id, position.last_accrual_date
            )));
        }

        *stored = position.clone();
        Ok(())
    }

    async fn advance_watermark(&self, id: &ObjectId, date: ProcessDate) -> AppResult<bool> {
        let mut state = self.state();
        Ok(state
            .positions
            .get_mut(id)
            .map(|p| p.advance_watermark(date))
            .unwrap_or(false))
    }

    async fn complete_matured_positions(&self, date: ProcessDate) -> AppResult<u64> {
        let mut state = self.state();
        let mut completed = 0;
        for position in state.positions.values_mut() {
            if position.status == PositionStatus::Active
                && position.maturity_date < date
                && position.last_accrual_date >= Some(position.maturity_date)
            {
                position.status = PositionStatus::Completed;
                completed += 1;
            }
        }

        Ok(completed)
    }
}

#[async_trait]
impl AccrualRecordRepositoryTrait for MemoryLedger {
    async fn find_accrual_record(
        &self,
        account: &ObjectId,
        position: &ObjectId,
        date: ProcessDate,
    ) -> AppResult<Option<AccrualRecord>> {
        let state = self.state();
        Ok(state
            .records
            .iter()
            .find(|r| r.account == *account && r.position == *position && r.date == date)
            .cloned())
    }

    async fn save_accrual_record(&self, record: &AccrualRecord) -> AppResult<()> {
        let mut state = self.state();
        if state
            .records
            .iter()
            .any(|r| r.position == record.position && r.date == record.date)
        {
            return Err(AppError::Conflict(format!(
                "accrual record for position {} on {} already exists",
                record.position, record.date
            )));
        }

        let mut new_doc = record.clone();
        new_doc.id.get_or_insert_with(ObjectId::new);
        state.records.push(new_doc);

        Ok(())
    }

    async fn find_accrual_records_by_account(&self, account: &ObjectId) -> AppResult<Vec<AccrualRecord>> {
        let state = self.state();
        let mut records: Vec<AccrualRecord> = state.records.iter().filter(|r| r.account == *account).cloned().collect();
        records.sort_by_key(|r| r.date);

        Ok(records)
    }

    async fn find_unsettled_accrual_records(
        &self,
        after: Option<(ProcessDate, ObjectId)>,
        limit: i64,
    ) -> AppResult<Vec<AccrualRecord>> {
        let state = self.state();
        let after = after.map(|(date, id)| (date, Some(id)));
        let mut records: Vec<AccrualRecord> = state
            .records
            .iter()
            .filter(|r| !r.payout_settled)
            .filter(|r| after.map(|cursor| (r.date, r.id) > cursor).unwrap_or(true))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.date, r.id));
        records.truncate(limit.max(0) as usize);

        Ok(records)
    }

    async fn mark_payout_settled(&self, record_id: &ObjectId) -> AppResult<()> {
        let mut state = self.state();
        if let Some(record) = state.records.iter_mut().find(|r| r.id.as_ref() == Some(record_id)) {
            record.payout_settled = true;
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn commit_accrual(&self, commit: &AccrualCommit) -> AppResult<AccrualCommitOutcome> {
        {
            let mut faults = self.faults();
            faults.commit_calls += 1;
            if faults.commit_failures > 0 {
                faults.commit_failures -= 1;
                return Err(AppError::VersionConflict(format!("injected failure for {}", commit.account)));
            }
        }

        let mut state = self.state();

        if state
            .records
            .iter()
            .any(|r| r.position == commit.position && r.date == commit.date)
        {
            return Ok(AccrualCommitOutcome::AlreadyApplied);
        }

        let Some(account) = state.accounts.get_mut(&commit.account) else {
            return Ok(AccrualCommitOutcome::AccountMissing);
        };
        account.apply_accrual(commit.amount, commit.date);
        account.version += 1;

        let mut record = AccrualRecord::new(commit.account, commit.position, commit.date, commit.amount);
        record.id = Some(ObjectId::new());
        state.records.push(record.clone());

        if let Some(position) = state.positions.get_mut(&commit.position) {
            position.advance_watermark(commit.date);
        }

        Ok(AccrualCommitOutcome::Committed(record))
    }
}
