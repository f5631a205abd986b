use super::model::{Account, LevelIncomeEntry};

#[cfg(test)]
mod account_tests {
    use super::*;
    use mongodb::bson::{self, oid::ObjectId};
    use std::str::FromStr;
    use utils::{Money, ProcessDate};

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn day(d: u32) -> ProcessDate {
        ProcessDate::from_ymd(2024, 3, d).unwrap()
    }

    fn entry(source: ObjectId, position: ObjectId, level: u32, amount: &str, date: ProcessDate) -> LevelIncomeEntry {
        LevelIncomeEntry {
            source_account: source,
            source_position: position,
            level,
            amount: money(amount),
            date,
        }
    }

    #[test]
    fn test_apply_accrual_credits_wallet_and_accumulator() {
        let mut account = Account::new("alice", "ALICE1", None);

        account.apply_accrual(money("15.00"), day(1));
        account.apply_accrual(money("15.00"), day(2));

        assert_eq!(account.wallet_balance, money("30.00"));
        assert_eq!(account.roi_balance.total_accrued, money("30.00"));
        assert_eq!(account.roi_balance.last_accrual_at, Some(day(2)));

        // 补跑更早的日期不会让最后计息日回退
        account.apply_accrual(money("1.00"), day(1));
        assert_eq!(account.roi_balance.last_accrual_at, Some(day(2)));

        println!("✅ 测试通过: apply_accrual");
    }

    #[test]
    fn test_level_income_dedup_key() {
        let mut parent = Account::new("parent", "PARENT", None);
        let child = ObjectId::new();
        let position = ObjectId::new();

        assert!(parent.apply_level_income(entry(child, position, 1, "0.75", day(1))));
        assert!(!parent.apply_level_income(entry(child, position, 1, "0.75", day(1))));
        // 不同层级、不同日期、不同仓位都算新的流水
        assert!(parent.apply_level_income(entry(child, position, 2, "0.45", day(1))));
        assert!(parent.apply_level_income(entry(child, position, 1, "0.75", day(2))));
        assert!(parent.apply_level_income(entry(child, ObjectId::new(), 1, "0.75", day(1))));

        assert_eq!(parent.level_income.len(), 4);
        assert_eq!(parent.wallet_balance, money("2.70"));
        assert_eq!(parent.total_level_income(), parent.wallet_balance);
        assert_eq!(parent.level_income[1].level, 2);

        println!("✅ 测试通过: level_income_dedup_key");
    }

    #[test]
    fn test_bson_field_names() {
        let mut account = Account::new("bob", "BOB123", Some(ObjectId::new()));
        account.apply_accrual(money("1.5"), day(3));

        let doc = bson::to_document(&account).unwrap();
        assert!(doc.get("_id").is_none());
        assert_eq!(doc.get_str("referralCode").unwrap(), "BOB123");
        assert_eq!(doc.get_str("walletBalance").unwrap(), "1.50");
        assert!(doc.get_object_id("referredBy").is_ok());

        let roi = doc.get_document("roiBalance").unwrap();
        assert_eq!(roi.get_str("totalAccrued").unwrap(), "1.50");
        assert_eq!(
            roi.get_datetime("lastAccrualAt").unwrap().timestamp_millis(),
            day(3).start_of_day_millis()
        );

        let restored: Account = bson::from_document(doc).unwrap();
        assert_eq!(restored.wallet_balance, account.wallet_balance);
        assert_eq!(restored.roi_balance, account.roi_balance);

        println!("✅ 测试通过: bson_field_names");
    }
}
