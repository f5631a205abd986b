////////////////////////////////////////////////////////////////////////
//
// 1. 每个Domain(Entity)单独一个文件夹
// 2. 每个Domain由两部分组成:
//    - model: 定义Schema
//    - repository: 实际的数据库底层操作
// 3. ledger: 计息核心消费的存储接口(三个仓库的并集 + 原子提交)
//
//////////////////////////////////////////////////////////////////////

use mongodb::{
    bson::doc,
    options::{ClientOptions, IndexOptions},
    Client, Collection, IndexModel,
};
use std::sync::Arc;
use tracing::{error, info};
use utils::{AppConfig, AppResult};

pub mod account;
pub mod accrual;
pub mod ledger;
pub mod position;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use account::{Account, AccountRepositoryTrait, LevelIncomeEntry, RoiBalance};
pub use accrual::{AccrualRecord, AccrualRecordRepositoryTrait};
pub use ledger::{AccrualCommit, AccrualCommitOutcome, DynLedgerStore, LedgerStore};
pub use position::{Position, PositionRepositoryTrait, PositionStatus};

#[derive(Clone, Debug)]
pub struct Database {
    pub client: Client,
    pub accounts: Collection<account::model::Account>,
    pub positions: Collection<position::model::Position>,
    pub accrual_records: Collection<accrual::model::AccrualRecord>,
}

impl Database {
    pub async fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let mut options = ClientOptions::parse(&config.mongo_uri).await?;
        options.app_name = Some("roi-accrual".to_string());

        let client = Client::with_options(options)?;
        let db: mongodb::Database = client.database(&config.mongo_db);

        let accounts = db.collection("Account");
        let positions = db.collection("Position");
        let accrual_records = db.collection("AccrualRecord");

        info!("🧱 database({:#}) connected.", &config.mongo_db);

        Ok(Database {
            client,
            accounts,
            positions,
            accrual_records,
        })
    }

    /// 初始化索引；(position, date) 的唯一索引是计息幂等的最后一道防线，失败时直接返回错误
    pub async fn init_indexes(&self) -> AppResult<()> {
        info!("🔧 初始化账本集合索引...");

        let accrual_indexes = vec![
            IndexModel::builder()
                .keys(doc! { "position": 1, "date": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name("position_date_unique".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "account": 1, "date": 1 })
                .options(IndexOptions::builder().name("account_date".to_string()).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "payoutSettled": 1, "date": 1, "_id": 1 })
                .options(IndexOptions::builder().name("payout_settled_date".to_string()).build())
                .build(),
        ];

        if let Err(e) = self.accrual_records.create_indexes(accrual_indexes, None).await {
            error!("❌ 计息记录索引创建失败: {}", e);
            return Err(e.into());
        }

        let account_indexes = vec![
            IndexModel::builder()
                .keys(doc! { "referralCode": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name("referralCode_unique".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "referredBy": 1 })
                .options(IndexOptions::builder().name("referredBy".to_string()).build())
                .build(),
        ];
        self.accounts.create_indexes(account_indexes, None).await?;

        let position_indexes = vec![
            IndexModel::builder()
                .keys(doc! { "status": 1, "activationDate": 1, "maturityDate": 1 })
                .options(IndexOptions::builder().name("status_term".to_string()).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "account": 1 })
                .options(IndexOptions::builder().name("account".to_string()).build())
                .build(),
        ];
        self.positions.create_indexes(position_indexes, None).await?;

        info!("✅ 账本索引初始化完成");
        Ok(())
    }
}
