#[cfg(test)]
mod tests {
    use crate::services::accrual::{AccrualComputer, AccrualError, FailureKind};
    use database::{Position, PositionStatus};
    use mongodb::bson::oid::ObjectId;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use utils::{AppError, Money, ProcessDate};

    fn day(d: u32) -> ProcessDate {
        ProcessDate::from_ymd(2024, 3, d).unwrap()
    }

    fn position(principal: &str, rate: &str) -> Position {
        Position::new(
            ObjectId::new(),
            Money::from_str(principal).unwrap(),
            "PLAN_A",
            Decimal::from_str(rate).unwrap(),
            day(1),
            day(30),
        )
        .unwrap()
    }

    #[test]
    fn test_compute_daily_amount() {
        let amount = AccrualComputer::compute(&position("1000", "1.5"), day(2)).unwrap();
        assert_eq!(amount, Money::from_str("15.00").unwrap());
        assert_eq!(amount.to_string(), "15.00");
    }

    #[test]
    fn test_compute_uses_bankers_rounding() {
        // 0.125 -> 0.12, 0.135 -> 0.14
        let down = AccrualComputer::compute(&position("12.5", "1"), day(2)).unwrap();
        let up = AccrualComputer::compute(&position("13.5", "1"), day(2)).unwrap();

        assert_eq!(down, Money::from_str("0.12").unwrap());
        assert_eq!(up, Money::from_str("0.14").unwrap());
    }

    #[test]
    fn test_compute_on_term_boundaries() {
        let p = position("200", "2");

        assert!(AccrualComputer::compute(&p, day(1)).is_ok());
        assert!(AccrualComputer::compute(&p, day(30)).is_ok());
        assert!(matches!(
            AccrualComputer::compute(&p, day(31)),
            Err(AccrualError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_zero_rate_is_allowed() {
        let amount = AccrualComputer::compute(&position("500", "0"), day(3)).unwrap();
        assert_eq!(amount, Money::ZERO);
    }

    #[test]
    fn test_negative_inputs_violate_invariants() {
        let mut negative_rate = position("1000", "1");
        negative_rate.daily_roi_percent = Decimal::from_str("-1").unwrap();
        let err = AccrualComputer::compute(&negative_rate, day(2)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvariantViolation);

        let mut negative_principal = position("1000", "1");
        negative_principal.principal = Money::from_str("-1000").unwrap();
        let err = AccrualComputer::compute(&negative_principal, day(2)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvariantViolation);
    }

    #[test]
    fn test_inactive_position_is_not_computed() {
        let mut p = position("1000", "1");
        p.status = PositionStatus::Completed;
        assert!(AccrualComputer::compute(&p, day(2)).is_err());
    }

    #[test]
    fn test_storage_errors_keep_their_kind() {
        let err: AccrualError = AppError::VersionConflict("busy".to_string()).into();
        assert_eq!(err.kind(), FailureKind::Storage);
    }
}
