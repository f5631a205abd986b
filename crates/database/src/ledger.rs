//! 账本存储接口
//!
//! 计息核心只依赖 [`LedgerStore`]：三个实体仓库的并集，外加一次计息的原子提交。

use crate::{
    accrual::{AccrualRecord, AccrualRecordRepositoryTrait},
    account::AccountRepositoryTrait,
    position::{repository::watermark_before, PositionRepositoryTrait},
    Database,
};
use async_trait::async_trait;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson},
    ClientSession,
};
use std::sync::Arc;
use tracing::warn;
use utils::{AppError, AppResult, Money, ProcessDate};

pub type DynLedgerStore = Arc<dyn LedgerStore>;

/// 一次计息需要原子落地的三个效果：账户入账、写计息记录、推进水位线
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualCommit {
    pub account: ObjectId,
    pub position: ObjectId,
    pub date: ProcessDate,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccrualCommitOutcome {
    Committed(AccrualRecord),
    /// `(position, date)` 已有计息记录，本次什么都没写
    AlreadyApplied,
    /// 所属账户不存在，本次什么都没写
    AccountMissing,
}

#[async_trait]
pub trait LedgerStore: AccountRepositoryTrait + PositionRepositoryTrait + AccrualRecordRepositoryTrait + Send + Sync {
    async fn commit_accrual(&self, commit: &AccrualCommit) -> AppResult<AccrualCommitOutcome>;
}

#[async_trait]
impl LedgerStore for Database {
    /// MongoDB多文档事务（需要副本集）
    async fn commit_accrual(&self, commit: &AccrualCommit) -> AppResult<AccrualCommitOutcome> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        match self.commit_accrual_in_session(&mut session, commit).await {
            Ok(AccrualCommitOutcome::Committed(record)) => {
                session.commit_transaction().await?;
                Ok(AccrualCommitOutcome::Committed(record))
            }
            Ok(outcome) => {
                session.abort_transaction().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!("⚠️ 回滚计息事务失败: position={} err={}", commit.position, abort_err);
                }
                if e.is_duplicate_key() {
                    Ok(AccrualCommitOutcome::AlreadyApplied)
                } else {
                    Err(e)
                }
            }
        }
    }
}

impl Database {
    async fn commit_accrual_in_session(
        &self,
        session: &mut ClientSession,
        commit: &AccrualCommit,
    ) -> AppResult<AccrualCommitOutcome> {
        let Some(mut account) = self
            .accounts
            .find_one_with_session(doc! { "_id": commit.account }, None, session)
            .await?
        else {
            return Ok(AccrualCommitOutcome::AccountMissing);
        };

        // 1. 计息记录：唯一索引冲突说明别的执行者已经提交过
        let mut record = AccrualRecord::new(commit.account, commit.position, commit.date, commit.amount);
        let inserted = self
            .accrual_records
            .insert_one_with_session(&record, None, session)
            .await?;
        record.id = inserted.inserted_id.as_object_id();

        // 2. 账户入账（版本号校验）
        let version = account.version;
        account.apply_accrual(commit.amount, commit.date);
        let update = doc! {
            "$set": {
                "walletBalance": to_bson(&account.wallet_balance)?,
                "roiBalance": to_bson(&account.roi_balance)?,
            },
            "$inc": { "version": 1_i64 },
        };
        let updated = self
            .accounts
            .update_one_with_session(doc! { "_id": commit.account, "version": version }, update, None, session)
            .await?;
        if updated.matched_count == 0 {
            return Err(AppError::VersionConflict(format!("account {} at version {}", commit.account, version)));
        }

        // 3. 水位线只前进
        let mut filter = watermark_before(commit.date);
        filter.insert("_id", commit.position);
        self.positions
            .update_one_with_session(filter, doc! { "$set": { "lastAccrualDate": commit.date } }, None, session)
            .await?;

        Ok(AccrualCommitOutcome::Committed(record))
    }
}
