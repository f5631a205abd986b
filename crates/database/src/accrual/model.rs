use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use utils::{Money, ProcessDate};

/// 计息审计记录
///
/// `(position, date)` 上有唯一索引，它是独立于仓位水位线的第二道幂等保护。
/// `date` 永远是归一化后的自然日，下游按日期相等过滤依赖这一点。
/// 除 `payoutSettled` 之外写入后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub account: ObjectId,
    pub position: ObjectId,
    pub date: ProcessDate,
    pub amount: Money,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime,
    /// 该笔计息对应的层级收益是否已全部发放
    #[serde(rename = "payoutSettled", default)]
    pub payout_settled: bool,
}

impl AccrualRecord {
    pub fn new(account: ObjectId, position: ObjectId, date: ProcessDate, amount: Money) -> Self {
        Self {
            id: None,
            account,
            position,
            date,
            amount,
            created_at: DateTime::now(),
            payout_settled: false,
        }
    }
}
