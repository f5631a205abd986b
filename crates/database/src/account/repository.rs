use crate::{
    account::model::{Account, LevelIncomeEntry},
    Database,
};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson};
use std::sync::Arc;
use tracing::debug;
use utils::{AppError, AppResult};

pub type DynAccountRepository = Arc<dyn AccountRepositoryTrait + Send + Sync>;

#[async_trait]
pub trait AccountRepositoryTrait {
    // 创建账户(由外部CRUD层调用，推荐码必须唯一)
    async fn create_account(&self, account: &Account) -> AppResult<ObjectId>;

    async fn get_account(&self, id: &ObjectId) -> AppResult<Option<Account>>;

    // 按版本号保存余额、累计收益和层级流水；版本不一致时返回VersionConflict
    async fn save_account(&self, account: &Account) -> AppResult<()>;

    // 获取被这些账户直接推荐的下级
    async fn find_referred_accounts(&self, parent_ids: &[ObjectId]) -> AppResult<Vec<Account>>;

    // 给上级追加一条层级收益并入账(单文档原子)；去重键已存在时返回false
    async fn credit_level_income(&self, parent_id: &ObjectId, entry: &LevelIncomeEntry) -> AppResult<bool>;
}

#[async_trait]
impl AccountRepositoryTrait for Database {
    async fn create_account(&self, account: &Account) -> AppResult<ObjectId> {
        let existing = self
            .accounts
            .find_one(doc! { "referralCode": &account.referral_code }, None)
            .await?;

        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "Account with referral code: {} already exists.",
                account.referral_code
            )));
        }

        let mut new_doc = account.clone();
        new_doc.id = None;
        new_doc.version = 0;

        let result = self.accounts.insert_one(new_doc, None).await?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| AppError::InternalServerErrorWithContext("inserted account id is not an ObjectId".to_string()))
    }

    async fn get_account(&self, id: &ObjectId) -> AppResult<Option<Account>> {
        let account = self.accounts.find_one(doc! { "_id": *id }, None).await?;

        Ok(account)
    }

    async fn save_account(&self, account: &Account) -> AppResult<()> {
        let id = account
            .id
            .ok_or_else(|| AppError::BadRequest("cannot save an account without id".to_string()))?;

        let filter = doc! { "_id": id, "version": account.version };
        let update = doc! {
            "$set": {
                "walletBalance": to_bson(&account.wallet_balance)?,
                "roiBalance": to_bson(&account.roi_balance)?,
                "levelIncome": to_bson(&account.level_income)?,
            },
            "$inc": { "version": 1_i64 },
        };

        let result = self.accounts.update_one(filter, update, None).await?;

        if result.matched_count == 0 {
            return Err(AppError::VersionConflict(format!("account {} at version {}", id, account.version)));
        }

        Ok(())
    }

    async fn find_referred_accounts(&self, parent_ids: &[ObjectId]) -> AppResult<Vec<Account>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let filter = doc! { "referredBy": { "$in": parent_ids.to_vec() } };
        let accounts: Vec<Account> = self.accounts.find(filter, None).await?.try_collect().await?;

        Ok(accounts)
    }

    async fn credit_level_income(&self, parent_id: &ObjectId, entry: &LevelIncomeEntry) -> AppResult<bool> {
        let mut parent = self
            .get_account(parent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {} not found", parent_id)))?;

        if !parent.apply_level_income(entry.clone()) {
            debug!("⏭️ 层级收益已存在，跳过: parent={} level={} date={}", parent_id, entry.level, entry.date);
            return Ok(false);
        }

        // 版本号过滤保证读到的流水就是最新的，去重判断因此成立
        let filter = doc! { "_id": *parent_id, "version": parent.version };
        let update = doc! {
            "$set": { "walletBalance": to_bson(&parent.wallet_balance)? },
            "$push": { "levelIncome": to_bson(entry)? },
            "$inc": { "version": 1_i64 },
        };

        let result = self.accounts.update_one(filter, update, None).await?;

        if result.matched_count == 0 {
            return Err(AppError::VersionConflict(format!(
                "account {} at version {}",
                parent_id, parent.version
            )));
        }

        Ok(true)
    }
}
