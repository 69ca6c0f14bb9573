use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;

/// Per-`asset_id` mutex over a fixed number of shards, so a rotation
/// run and an ad-hoc scoreTicker call can never race on the same
/// asset's bar file (spec §9 "Per-asset locking").
pub struct StripedLock {
    shards: Vec<Arc<AsyncMutex<()>>>,
}

impl StripedLock {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count).map(|_| Arc::new(AsyncMutex::new(()))).collect();
        Self { shards }
    }

    fn shard_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        self.shards[idx].clone()
    }

    pub async fn lock(&self, asset_id: &str) -> OwnedMutexGuard<()> {
        self.shard_for(asset_id).lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_serializes() {
        let lock = StripedLock::new(4);
        let g1 = lock.lock("AAPL.US").await;
        drop(g1);
        let _g2 = lock.lock("AAPL.US").await;
    }
}
