use super::AccrualError;
use database::Position;
use utils::{Money, ProcessDate};

/// 日收益计算
///
/// `principal × dailyRoiPercent / 100`，按银行家舍入保留两位小数。
/// 纯函数，不做任何IO。
pub struct AccrualComputer;

impl AccrualComputer {
    pub fn compute(position: &Position, date: ProcessDate) -> Result<Money, AccrualError> {
        if !position.is_eligible_on(date) {
            return Err(AccrualError::InvariantViolation(format!(
                "position {:?} is not accruable on {} (status={}, term={}..={})",
                position.id,
                date,
                position.status.as_str(),
                position.activation_date,
                position.maturity_date
            )));
        }

        if position.principal.is_negative() {
            return Err(AccrualError::InvariantViolation(format!(
                "position {:?} has negative principal {}",
                position.id, position.principal
            )));
        }

        if position.daily_roi_percent.is_sign_negative() && !position.daily_roi_percent.is_zero() {
            return Err(AccrualError::InvariantViolation(format!(
                "position {:?} has negative daily rate {}",
                position.id, position.daily_roi_percent
            )));
        }

        let amount = position.principal.percent_of(position.daily_roi_percent);
        if amount.is_negative() {
            return Err(AccrualError::InvariantViolation(format!(
                "position {:?} computed negative accrual {}",
                position.id, amount
            )));
        }

        Ok(amount)
    }
}
