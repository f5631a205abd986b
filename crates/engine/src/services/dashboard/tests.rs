#[cfg(test)]
mod tests {
    use crate::services::{
        dashboard::{DashboardService, DashboardServiceTrait},
        daily_accrual::AccrualSettings,
        shared::RetryPolicy,
        Services,
    };
    use database::{memory::MemoryLedger, Account, AccountRepositoryTrait, DynLedgerStore, Position, PositionRepositoryTrait};
    use mongodb::bson::oid::ObjectId;
    use rust_decimal::Decimal;
    use std::{str::FromStr, sync::Arc, time::Duration};
    use utils::{AppError, Money, ProcessDate};

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn day(d: u32) -> ProcessDate {
        ProcessDate::from_ymd(2024, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_summary_aggregates_accruals_and_level_income() {
        let ledger = Arc::new(MemoryLedger::new());
        let parent = ledger.create_account(&Account::new("parent", "PARENT", None)).await.unwrap();
        let child = ledger.create_account(&Account::new("child", "CHILD", Some(parent))).await.unwrap();

        for (owner, principal) in [(parent, "2000"), (child, "1000")] {
            let position = Position::new(owner, money(principal), "PLAN_A", Decimal::from_str("1.5").unwrap(), day(1), day(30)).unwrap();
            ledger.create_position(&position).await.unwrap();
        }

        let settings = AccrualSettings {
            workers: 2,
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            batch_deadline: None,
            settle_batch: 500,
        };
        let services = Services::new(ledger.clone() as DynLedgerStore, settings);
        services.daily_accrual.run_daily_accrual(day(2)).await.unwrap();
        services.daily_accrual.run_daily_accrual(day(3)).await.unwrap();

        let summary = services.dashboard.summary(&parent, day(3)).await.unwrap();

        assert_eq!(summary.total_investments, money("2000"));
        assert_eq!(summary.active_positions, 1);
        assert_eq!(summary.total_roi, money("60.00"));
        assert_eq!(summary.today_roi, money("30.00"));
        assert_eq!(summary.total_level_income, money("1.50"));
        assert_eq!(summary.level_income.len(), 2);
        assert_eq!(summary.level_income[0].date, day(2));
        assert_eq!(summary.wallet_balance, money("61.50"));
        println!("✅ 总览: {:?}", summary);
    }

    #[tokio::test]
    async fn test_summary_for_unknown_account() {
        let ledger = Arc::new(MemoryLedger::new());
        let dashboard = DashboardService::new(ledger as DynLedgerStore);

        let result = dashboard.summary(&ObjectId::new(), day(1)).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
