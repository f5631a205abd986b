use dashmap::DashMap;
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 按账户串行化写操作
///
/// 同一时刻一个任务只持有一个账户的锁，不会出现跨账户嵌套加锁。
#[derive(Default)]
pub struct KeyedLock {
    locks: DashMap<ObjectId, Arc<Mutex<()>>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: ObjectId) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        mutex.lock_owned().await
    }

    /// 清理当前无人持有的锁
    pub fn prune(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
