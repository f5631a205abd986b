use super::MemoryLedger;

#[cfg(test)]
mod memory_ledger_tests {
    use super::*;
    use crate::{
        AccountRepositoryTrait, AccrualCommit, AccrualCommitOutcome, AccrualRecord, AccrualRecordRepositoryTrait,
        Account, LedgerStore, LevelIncomeEntry, Position, PositionRepositoryTrait, PositionStatus,
    };
    use mongodb::bson::oid::ObjectId;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use utils::{AppError, Money, ProcessDate};

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn day(d: u32) -> ProcessDate {
        ProcessDate::from_ymd(2024, 3, d).unwrap()
    }

    async fn seed(ledger: &MemoryLedger) -> (ObjectId, ObjectId) {
        let account = ledger.create_account(&Account::new("alice", "ALICE1", None)).await.unwrap();
        let position = Position::new(
            account,
            money("1000"),
            "PLAN_A",
            Decimal::from_str("1.5").unwrap(),
            day(1),
            day(10),
        )
        .unwrap();
        let position = ledger.create_position(&position).await.unwrap();
        (account, position)
    }

    #[tokio::test]
    async fn test_commit_accrual_is_all_or_nothing() {
        let ledger = MemoryLedger::new();
        let (account, position) = seed(&ledger).await;
        let commit = AccrualCommit {
            account,
            position,
            date: day(2),
            amount: money("15.00"),
        };

        let first = ledger.commit_accrual(&commit).await.unwrap();
        assert!(matches!(first, AccrualCommitOutcome::Committed(_)));

        let second = ledger.commit_accrual(&commit).await.unwrap();
        assert_eq!(second, AccrualCommitOutcome::AlreadyApplied);

        let stored = ledger.get_account(&account).await.unwrap().unwrap();
        assert_eq!(stored.wallet_balance, money("15.00"));
        assert_eq!(stored.roi_balance.total_accrued, money("15.00"));
        assert_eq!(ledger.accrual_records().len(), 1);
        assert_eq!(ledger.position_snapshot(&position).unwrap().last_accrual_date, Some(day(2)));

        println!("✅ 测试通过: commit_accrual_is_all_or_nothing");
    }

    #[tokio::test]
    async fn test_commit_for_missing_account_writes_nothing() {
        let ledger = MemoryLedger::new();
        let (account, position) = seed(&ledger).await;
        ledger.remove_account(&account);

        let outcome = ledger
            .commit_accrual(&AccrualCommit {
                account,
                position,
                date: day(2),
                amount: money("15.00"),
            })
            .await
            .unwrap();

        assert_eq!(outcome, AccrualCommitOutcome::AccountMissing);
        assert!(ledger.accrual_records().is_empty());
        assert_eq!(ledger.position_snapshot(&position).unwrap().last_accrual_date, None);

        println!("✅ 测试通过: commit_for_missing_account_writes_nothing");
    }

    #[tokio::test]
    async fn test_save_account_checks_version() {
        let ledger = MemoryLedger::new();
        let (account, _) = seed(&ledger).await;

        let mut copy_a = ledger.get_account(&account).await.unwrap().unwrap();
        let mut copy_b = copy_a.clone();

        copy_a.apply_accrual(money("1.00"), day(1));
        ledger.save_account(&copy_a).await.unwrap();

        copy_b.apply_accrual(money("2.00"), day(1));
        let err = ledger.save_account(&copy_b).await.unwrap_err();
        assert!(matches!(err, AppError::VersionConflict(_)));
        assert!(err.is_transient());

        let stored = ledger.get_account(&account).await.unwrap().unwrap();
        assert_eq!(stored.wallet_balance, money("1.00"));
        assert_eq!(stored.version, 1);

        println!("✅ 测试通过: save_account_checks_version");
    }

    #[tokio::test]
    async fn test_duplicate_records_and_referral_codes_rejected() {
        let ledger = MemoryLedger::new();
        let (account, position) = seed(&ledger).await;

        let record = AccrualRecord::new(account, position, day(3), money("15.00"));
        ledger.save_accrual_record(&record).await.unwrap();
        assert!(matches!(
            ledger.save_accrual_record(&record).await,
            Err(AppError::Conflict(_))
        ));
        assert!(ledger.find_accrual_record(&account, &position, day(3)).await.unwrap().is_some());
        assert!(ledger.find_accrual_record(&account, &position, day(4)).await.unwrap().is_none());

        assert!(matches!(
            ledger.create_account(&Account::new("other", "ALICE1", None)).await,
            Err(AppError::Conflict(_))
        ));

        println!("✅ 测试通过: duplicate_records_and_referral_codes_rejected");
    }

    #[tokio::test]
    async fn test_watermark_and_housekeeping() {
        let ledger = MemoryLedger::new();
        let (_, position) = seed(&ledger).await;

        assert!(ledger.advance_watermark(&position, day(5)).await.unwrap());
        assert!(!ledger.advance_watermark(&position, day(4)).await.unwrap());

        let mut stale = ledger.get_position(&position).await.unwrap().unwrap();
        stale.last_accrual_date = Some(day(3));
        assert!(ledger.save_position(&stale).await.is_err());

        assert_eq!(ledger.complete_matured_positions(day(11)).await.unwrap(), 0);
        assert!(ledger.advance_watermark(&position, day(10)).await.unwrap());
        assert_eq!(ledger.complete_matured_positions(day(10)).await.unwrap(), 0);
        assert_eq!(ledger.complete_matured_positions(day(11)).await.unwrap(), 1);
        assert_eq!(ledger.position_snapshot(&position).unwrap().status, PositionStatus::Completed);
        assert!(ledger.find_active_positions(day(5)).await.unwrap().is_empty());

        println!("✅ 测试通过: watermark_and_housekeeping");
    }

    #[tokio::test]
    async fn test_credit_level_income_dedup() {
        let ledger = MemoryLedger::new();
        let parent = ledger.create_account(&Account::new("parent", "P1", None)).await.unwrap();
        let entry = LevelIncomeEntry {
            source_account: ObjectId::new(),
            source_position: ObjectId::new(),
            level: 1,
            amount: money("0.75"),
            date: day(1),
        };

        assert!(ledger.credit_level_income(&parent, &entry).await.unwrap());
        assert!(!ledger.credit_level_income(&parent, &entry).await.unwrap());

        let stored = ledger.get_account(&parent).await.unwrap().unwrap();
        assert_eq!(stored.level_income.len(), 1);
        assert_eq!(stored.wallet_balance, money("0.75"));

        println!("✅ 测试通过: credit_level_income_dedup");
    }

    #[tokio::test]
    async fn test_unsettled_records_queue() {
        let ledger = MemoryLedger::new();
        let (account, position) = seed(&ledger).await;
        for d in [3, 2] {
            let commit = AccrualCommit {
                account,
                position,
                date: day(d),
                amount: money("15.00"),
            };
            ledger.commit_accrual(&commit).await.unwrap();
        }

        let pending = ledger.find_unsettled_accrual_records(None, 10).await.unwrap();
        assert_eq!(pending.iter().map(|r| r.date).collect::<Vec<_>>(), vec![day(2), day(3)]);

        let first_page = ledger.find_unsettled_accrual_records(None, 1).await.unwrap();
        assert_eq!(first_page.len(), 1);
        let cursor = (first_page[0].date, first_page[0].id.unwrap());
        let second_page = ledger.find_unsettled_accrual_records(Some(cursor), 1).await.unwrap();
        assert_eq!(second_page[0].date, day(3));
        assert!(ledger
            .find_unsettled_accrual_records(Some((day(3), second_page[0].id.unwrap())), 1)
            .await
            .unwrap()
            .is_empty());

        ledger.mark_payout_settled(&pending[0].id.unwrap()).await.unwrap();

        let pending = ledger.find_unsettled_accrual_records(None, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].date, day(3));
    }
}
