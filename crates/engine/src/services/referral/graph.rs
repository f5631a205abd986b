use database::{Account, DynLedgerStore};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};
use utils::AppResult;

/// 下级列表中的一个成员
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralMember {
    pub id: ObjectId,
    pub name: String,
    #[serde(rename = "referralCode")]
    pub referral_code: String,
}

impl ReferralMember {
    fn new(id: ObjectId, account: &Account) -> Self {
        Self {
            id,
            name: account.name.clone(),
            referral_code: account.referral_code.clone(),
        }
    }
}

/// 某一层的全部下级
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralLevel {
    pub level: u32,
    pub members: Vec<ReferralMember>,
}

/// 推荐关系图
///
/// 每个账户至多一个上级（`referredBy`）。所有遍历都带深度上限，
/// 数据中即使存在环也不会无限循环。
#[derive(Clone)]
pub struct ReferralGraph {
    ledger: DynLedgerStore,
}

impl ReferralGraph {
    pub fn new(ledger: DynLedgerStore) -> Self {
        Self { ledger }
    }

    /// 直接上级；账户不存在或没有上级时返回 None
    pub async fn parent_of(&self, account_id: &ObjectId) -> AppResult<Option<ObjectId>> {
        Ok(self
            .ledger
            .get_account(account_id)
            .await?
            .and_then(|account| account.referred_by))
    }

    /// 从 `account_id` 向上最多 `max_depth` 层的上级账户，按层级排序
    pub async fn ancestors(&self, account_id: &ObjectId, max_depth: u32) -> AppResult<Vec<Account>> {
        match self.ledger.get_account(account_id).await? {
            Some(account) => self.ancestors_of(&account, max_depth).await,
            None => Ok(Vec::new()),
        }
    }

    /// 与 [`ancestors`](Self::ancestors) 相同，起点账户已经读出
    ///
    /// 每解析一跳先检查深度，指向不存在账户的上级指针视为链条终点。
    pub async fn ancestors_of(&self, origin: &Account, max_depth: u32) -> AppResult<Vec<Account>> {
        let mut chain = Vec::new();
        let mut next = origin.referred_by;

        while let Some(parent_id) = next {
            if chain.len() as u32 >= max_depth {
                break;
            }
            match self.ledger.get_account(&parent_id).await? {
                Some(parent) => {
                    next = parent.referred_by;
                    chain.push(parent);
                }
                None => {
                    warn!("⚠️ 推荐链指向不存在的账户 {}，停止向上遍历 (起点 {:?})", parent_id, origin.id);
                    break;
                }
            }
        }

        debug!("🔗 账户 {:?} 向上解析到 {} 层上级", origin.id, chain.len());
        Ok(chain)
    }

    /// 按层级列出下级，最多 `max_depth` 层；每个账户只出现一次
    pub async fn downline(&self, account_id: &ObjectId, max_depth: u32) -> AppResult<Vec<ReferralLevel>> {
        let mut levels = Vec::new();
        let mut visited = HashSet::from([*account_id]);
        let mut frontier = vec![*account_id];

        for level in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }

            let children = self.ledger.find_referred_accounts(&frontier).await?;
            let mut members = Vec::new();
            let mut next_frontier = Vec::new();
            for child in &children {
                let Some(child_id) = child.id else {
                    continue;
                };
                if visited.insert(child_id) {
                    members.push(ReferralMember::new(child_id, child));
                    next_frontier.push(child_id);
                }
            }

            if members.is_empty() {
                break;
            }
            levels.push(ReferralLevel { level, members });
            frontier = next_frontier;
        }

        Ok(levels)
    }
}
