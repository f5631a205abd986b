use crate::{
    position::model::{Position, PositionStatus},
    Database,
};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use std::sync::Arc;
use utils::{AppError, AppResult, ProcessDate};

pub type DynPositionRepository = Arc<dyn PositionRepositoryTrait + Send + Sync>;

/// 水位线早于 `date`（或为空）的过滤条件
pub(crate) fn watermark_before(date: ProcessDate) -> Document {
    doc! {
        "$or": [
            { "lastAccrualDate": null },
            { "lastAccrualDate": { "$lt": date } },
        ]
    }
}

#[async_trait]
pub trait PositionRepositoryTrait {
    // 创建仓位(由外部CRUD层调用)
    async fn create_position(&self, position: &Position) -> AppResult<ObjectId>;

    async fn get_position(&self, id: &ObjectId) -> AppResult<Option<Position>>;

    // status == ACTIVE && activationDate <= date <= maturityDate
    async fn find_active_positions(&self, date: ProcessDate) -> AppResult<Vec<Position>>;

    async fn find_positions_by_account(&self, account: &ObjectId) -> AppResult<Vec<Position>>;

    // 整体保存仓位；不允许水位线后退
    async fn save_position(&self, position: &Position) -> AppResult<()>;

    // 仅当水位线为空或早于date时推进到date；返回是否推进
    async fn advance_watermark(&self, id: &ObjectId, date: ProcessDate) -> AppResult<bool>;

    // 到期日早于date且水位线已到达到期日的ACTIVE仓位置为COMPLETED；返回更新数量
    async fn complete_matured_positions(&self, date: ProcessDate) -> AppResult<u64>;
}

#[async_trait]
impl PositionRepositoryTrait for Database {
    async fn create_position(&self, position: &Position) -> AppResult<ObjectId> {
        let mut new_doc = position.clone();
        new_doc.id = None;

        let result = self.positions.insert_one(new_doc, None).await?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| AppError::InternalServerErrorWithContext("inserted position id is not an ObjectId".to_string()))
    }

    async fn get_position(&self, id: &ObjectId) -> AppResult<Option<Position>> {
        let position = self.positions.find_one(doc! { "_id": *id }, None).await?;

        Ok(position)
    }

    async fn find_active_positions(&self, date: ProcessDate) -> AppResult<Vec<Position>> {
        let filter = doc! {
            "status": PositionStatus::Active.as_str(),
            "activationDate": { "$lte": date },
            "maturityDate": { "$gte": date },
        };

        let positions: Vec<Position> = self.positions.find(filter, None).await?.try_collect().await?;

        Ok(positions)
    }

    async fn find_positions_by_account(&self, account: &ObjectId) -> AppResult<Vec<Position>> {
        let positions: Vec<Position> = self
            .positions
            .find(doc! { "account": *account }, None)
            .await?
            .try_collect()
            .await?;

        Ok(positions)
    }

    async fn save_position(&self, position: &Position) -> AppResult<()> {
        let id = position
            .id
            .ok_or_else(|| AppError::BadRequest("cannot save a position without id".to_string()))?;

        let mut filter = match position.last_accrual_date {
            Some(date) => watermark_before(date.next_day()),
            None => doc! { "lastAccrualDate": null },
        };
        filter.insert("_id", id);

        let result = self.positions.replace_one(filter, position, None).await?;

        if result.matched_count == 0 {
            return Err(AppError::Conflict(format!(
                "position {} not found or its watermark is already past {:?}",
                id, position.last_accrual_date
            )));
        }

        Ok(())
    }

    async fn advance_watermark(&self, id: &ObjectId, date: ProcessDate) -> AppResult<bool> {
        let mut filter = watermark_before(date);
        filter.insert("_id", *id);

        let result = self
            .positions
            .update_one(filter, doc! { "$set": { "lastAccrualDate": date } }, None)
            .await?;

        Ok(result.modified_count > 0)
    }

    async fn complete_matured_positions(&self, date: ProcessDate) -> AppResult<u64> {
        let filter = doc! {
            "status": PositionStatus::Active.as_str(),
            "maturityDate": { "$lt": date },
            "$expr": { "$gte": ["$lastAccrualDate", "$maturityDate"] },
        };
        let update = doc! { "$set": { "status": PositionStatus::Completed.as_str() } };

        let result = self.positions.update_many(filter, update, None).await?;

        Ok(result.modified_count)
    }
}
