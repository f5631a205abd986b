use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use utils::{Money, ProcessDate};
use validator::Validate;

/// 参与者账户
///
/// 账户由外部CRUD层创建；计息核心只修改余额、累计收益与层级收益流水。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Account {
    /// MongoDB文档ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[validate(length(min = 1))]
    pub name: String,

    /// 推荐码（唯一），其他账户注册时用它指定上级
    #[serde(rename = "referralCode")]
    #[validate(length(min = 1))]
    pub referral_code: String,

    /// 上级账户，创建后不可修改
    #[serde(rename = "referredBy", default, skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<ObjectId>,

    /// 可提现余额
    #[serde(rename = "walletBalance", default)]
    pub wallet_balance: Money,

    #[serde(rename = "roiBalance", default)]
    pub roi_balance: RoiBalance,

    /// 层级收益流水（只追加，插入顺序即展示顺序）
    #[serde(rename = "levelIncome", default)]
    pub level_income: Vec<LevelIncomeEntry>,

    /// 乐观锁版本号，每次写入递增
    #[serde(default)]
    pub version: i64,
}

/// 累计投资收益
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiBalance {
    #[serde(rename = "totalAccrued", default)]
    pub total_accrued: Money,
    #[serde(rename = "lastAccrualAt", default)]
    pub last_accrual_at: Option<ProcessDate>,
}

/// 层级收益流水
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelIncomeEntry {
    /// 产生收益的下级账户
    #[serde(rename = "sourceAccount")]
    pub source_account: ObjectId,
    /// 产生收益的下级仓位
    #[serde(rename = "sourcePosition")]
    pub source_position: ObjectId,
    pub level: u32,
    pub amount: Money,
    pub date: ProcessDate,
}

impl LevelIncomeEntry {
    /// 去重键相同（同一下级、同一仓位、同一天、同一层级）
    pub fn same_key(&self, other: &LevelIncomeEntry) -> bool {
        self.source_account == other.source_account
            && self.source_position == other.source_position
            && self.date == other.date
            && self.level == other.level
    }
}

impl Account {
    pub fn new(name: impl Into<String>, referral_code: impl Into<String>, referred_by: Option<ObjectId>) -> Self {
        Self {
            id: None,
            name: name.into(),
            referral_code: referral_code.into(),
            referred_by,
            wallet_balance: Money::ZERO,
            roi_balance: RoiBalance::default(),
            level_income: Vec::new(),
            version: 0,
        }
    }

    /// 计入某日的投资收益：钱包与累计收益同时增加
    pub fn apply_accrual(&mut self, amount: Money, date: ProcessDate) {
        self.wallet_balance += amount;
        self.roi_balance.total_accrued += amount;
        self.roi_balance.last_accrual_at = match self.roi_balance.last_accrual_at {
            Some(last) if last > date => Some(last),
            _ => Some(date),
        };
    }

    pub fn has_level_income(&self, entry: &LevelIncomeEntry) -> bool {
        self.level_income.iter().any(|e| e.same_key(entry))
    }

    /// 追加层级收益并入账；同一去重键已存在时返回false且不做任何修改
    pub fn apply_level_income(&mut self, entry: LevelIncomeEntry) -> bool {
        if self.has_level_income(&entry) {
            return false;
        }
        self.wallet_balance += entry.amount;
        self.level_income.push(entry);
        true
    }

    pub fn total_level_income(&self) -> Money {
        self.level_income.iter().map(|e| e.amount).sum()
    }
}
