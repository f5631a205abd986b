////////////////////////////////////////////////////////////////////////
//
// 1. 每个Domain单独一个文件夹
// 2. 所有存储访问都经由 LedgerStore，MongoDB 与内存实现可互换
//
//////////////////////////////////////////////////////////////////////

pub mod accrual;
pub mod daily_accrual;
pub mod dashboard;
pub mod payout;
pub mod referral;
pub mod shared;

use daily_accrual::{AccrualSettings, DailyAccrualService};
use dashboard::{DashboardService, DynDashboardService};
use database::{Database, DynLedgerStore};
use payout::PayoutDistributor;
use referral::ReferralGraph;
use shared::KeyedLock;
use std::sync::Arc;
use tracing::info;
use utils::{AppConfig, AppResult};

#[derive(Clone)]
pub struct Services {
    pub ledger: DynLedgerStore,
    pub daily_accrual: Arc<DailyAccrualService>,
    pub referral: ReferralGraph,
    pub payout: Arc<PayoutDistributor>,
    pub dashboard: DynDashboardService,
}

impl Services {
    pub fn new(ledger: DynLedgerStore, settings: AccrualSettings) -> Self {
        let locks = Arc::new(KeyedLock::new());
        let referral = ReferralGraph::new(ledger.clone());
        let payout = Arc::new(PayoutDistributor::new(
            ledger.clone(),
            referral.clone(),
            locks.clone(),
            settings.retry,
        ));
        let daily_accrual = Arc::new(DailyAccrualService::new(ledger.clone(), payout.clone(), locks, settings));
        let dashboard = Arc::new(DashboardService::new(ledger.clone())) as DynDashboardService;

        Self {
            ledger,
            daily_accrual,
            referral,
            payout,
            dashboard,
        }
    }

    /// 连接MongoDB、建索引并装配全部服务
    pub async fn from_config(config: Arc<AppConfig>) -> AppResult<Self> {
        let settings = AccrualSettings::from(config.as_ref());
        let db = Database::new(config).await?;
        db.init_indexes().await?;

        info!(
            "🧠 Services initialized: workers={} max_attempts={} deadline={:?}",
            settings.workers, settings.retry.max_attempts, settings.batch_deadline
        );

        Ok(Self::new(Arc::new(db) as DynLedgerStore, settings))
    }
}
