use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utils::{AppError, AppResult, Money, ProcessDate};
use validator::{Validate, ValidationError};

/// 仓位生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "ACTIVE",
            PositionStatus::Completed => "COMPLETED",
            PositionStatus::Cancelled => "CANCELLED",
        }
    }
}

/// 投资仓位
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_term", skip_on_field_errors = false))]
pub struct Position {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// 所属账户
    pub account: ObjectId,

    /// 本金（> 0）
    #[validate(custom = "validate_principal")]
    pub principal: Money,

    /// 方案标识，如 "PLAN_A"
    #[validate(length(min = 1))]
    pub plan: String,

    /// 日收益率（百分比），1.5 表示每天 1.5%
    #[serde(rename = "dailyRoiPercent")]
    #[validate(custom = "validate_rate")]
    pub daily_roi_percent: Decimal,

    #[serde(rename = "activationDate")]
    pub activation_date: ProcessDate,

    #[serde(rename = "maturityDate")]
    pub maturity_date: ProcessDate,

    pub status: PositionStatus,

    /// 水位线：最后一次成功计息的日期
    #[serde(rename = "lastAccrualDate", default)]
    pub last_accrual_date: Option<ProcessDate>,
}

fn validate_principal(principal: &Money) -> Result<(), ValidationError> {
    if principal.is_positive() {
        Ok(())
    } else {
        Err(ValidationError::new("principal_must_be_positive"))
    }
}

fn validate_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() && !rate.is_zero() {
        Err(ValidationError::new("daily_roi_percent_must_not_be_negative"))
    } else {
        Ok(())
    }
}

fn validate_term(position: &Position) -> Result<(), ValidationError> {
    if position.maturity_date < position.activation_date {
        return Err(ValidationError::new("maturity_before_activation"));
    }
    Ok(())
}

impl Position {
    /// 外部CRUD层创建仓位的入口：状态为ACTIVE，水位线为空
    pub fn new(
        account: ObjectId,
        principal: Money,
        plan: impl Into<String>,
        daily_roi_percent: Decimal,
        activation_date: ProcessDate,
        maturity_date: ProcessDate,
    ) -> AppResult<Self> {
        let position = Self {
            id: None,
            account,
            principal,
            plan: plan.into(),
            daily_roi_percent,
            activation_date,
            maturity_date,
            status: PositionStatus::Active,
            last_accrual_date: None,
        };

        position
            .validate()
            .map_err(|e| AppError::BadRequest(format!("invalid position: {}", e)))?;

        Ok(position)
    }

    /// ACTIVE 且 activation <= date <= maturity
    pub fn is_eligible_on(&self, date: ProcessDate) -> bool {
        self.status == PositionStatus::Active && self.activation_date <= date && self.maturity_date >= date
    }

    pub fn is_accrued_on(&self, date: ProcessDate) -> bool {
        self.last_accrual_date == Some(date)
    }

    /// 水位线是否落后于该日期
    pub fn watermark_behind(&self, date: ProcessDate) -> bool {
        match self.last_accrual_date {
            Some(last) => last < date,
            None => true,
        }
    }

    /// 水位线只前进不后退；返回是否有变化
    pub fn advance_watermark(&mut self, date: ProcessDate) -> bool {
        if self.watermark_behind(date) {
            self.last_accrual_date = Some(date);
            true
        } else {
            false
        }
    }
}
