use crate::{accrual::model::AccrualRecord, Database};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    options::FindOptions,
};
use std::sync::Arc;
use utils::{AppError, AppResult, ProcessDate};

pub type DynAccrualRecordRepository = Arc<dyn AccrualRecordRepositoryTrait + Send + Sync>;

#[async_trait]
pub trait AccrualRecordRepositoryTrait {
    async fn find_accrual_record(
        &self,
        account: &ObjectId,
        position: &ObjectId,
        date: ProcessDate,
    ) -> AppResult<Option<AccrualRecord>>;

    // 单独写入一条计息记录；(position, date)已存在时返回Conflict
    async fn save_accrual_record(&self, record: &AccrualRecord) -> AppResult<()>;

    // 某账户的全部计息记录，按日期升序
    async fn find_accrual_records_by_account(&self, account: &ObjectId) -> AppResult<Vec<AccrualRecord>>;

    // 层级收益尚未发放完成的记录，按日期升序，最多 limit 条
    // 按 (date, _id) 升序分页；after 为上一页最后一条记录的 (date, _id)
    async fn find_unsettled_accrual_records(
        &self,
        after: Option<(ProcessDate, ObjectId)>,
        limit: i64,
    ) -> AppResult<Vec<AccrualRecord>>;

    async fn mark_payout_settled(&self, record_id: &ObjectId) -> AppResult<()>;
}

#[async_trait]
impl AccrualRecordRepositoryTrait for Database {
    async fn find_accrual_record(
        &self,
        account: &ObjectId,
        position: &ObjectId,
        date: ProcessDate,
    ) -> AppResult<Option<AccrualRecord>> {
        let filter = doc! { "account": *account, "position": *position, "date": date };
        let record = self.accrual_records.find_one(filter, None).await?;

        Ok(record)
    }

    async fn save_accrual_record(&self, record: &AccrualRecord) -> AppResult<()> {
        match self.accrual_records.insert_one(record, None).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = AppError::from(e);
                if err.is_duplicate_key() {
                    Err(AppError::Conflict(format!(
                        "accrual record for position {} on {} already exists",
                        record.position, record.date
                    )))
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn find_accrual_records_by_account(&self, account: &ObjectId) -> AppResult<Vec<AccrualRecord>> {
        let options = FindOptions::builder().sort(doc! { "date": 1 }).build();
        let records: Vec<AccrualRecord> = self
            .accrual_records
            .find(doc! { "account": *account }, options)
            .await?
            .try_collect()
            .await?;

        Ok(records)
    }

    async fn find_unsettled_accrual_records(
        &self,
        after: Option<(ProcessDate, ObjectId)>,
        limit: i64,
    ) -> AppResult<Vec<AccrualRecord>> {
        let mut filter = doc! { "payoutSettled": { "$ne": true } };
        if let Some((date, id)) = after {
            filter.insert(
                "$or",
                vec![
                    doc! { "date": { "$gt": date } },
                    doc! { "date": date, "_id": { "$gt": id } },
                ],
            );
        }

        let options = FindOptions::builder().sort(doc! { "date": 1, "_id": 1 }).limit(limit).build();
        let records: Vec<AccrualRecord> = self
            .accrual_records
            .find(filter, options)
            .await?
            .try_collect()
            .await?;

        Ok(records)
    }

    async fn mark_payout_settled(&self, record_id: &ObjectId) -> AppResult<()> {
        self.accrual_records
            .update_one(doc! { "_id": *record_id }, doc! { "$set": { "payoutSettled": true } }, None)
            .await?;

        Ok(())
    }
}
