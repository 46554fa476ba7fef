use async_trait::async_trait;
use dashmap::DashMap;
use ecochain_types::{DistributionRecord, PlanId, RecordKey};

use crate::error::StoreResult;

/// Persistence for distribution records, keyed by (plan, operation).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<DistributionRecord>>;

    /// Insert or overwrite.
    async fn put(&self, record: DistributionRecord) -> StoreResult<()>;

    /// Insert `record` unless its key is taken; returns whichever record is
    /// stored afterwards.
    async fn insert_if_absent(&self, record: DistributionRecord) -> StoreResult<DistributionRecord>;

    /// Records of one plan, ordered by operation id.
    async fn list_for_plan(&self, plan_id: &PlanId) -> StoreResult<Vec<DistributionRecord>>;

    async fn list_all(&self) -> StoreResult<Vec<DistributionRecord>>;
}

/// In-memory record store
pub struct InMemoryRecordStore {
    records: DashMap<RecordKey, DistributionRecord>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<DistributionRecord>> {
        Ok(self.records.get(key).map(|r| r.clone()))
    }

    async fn put(&self, record: DistributionRecord) -> StoreResult<()> {
        self.records.insert(record.key(), record);
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        record: DistributionRecord,
    ) -> StoreResult<DistributionRecord> {
        let stored = self.records.entry(record.key()).or_insert(record);
        Ok(stored.clone())
    }

    async fn list_for_plan(&self, plan_id: &PlanId) -> StoreResult<Vec<DistributionRecord>> {
        let mut records: Vec<DistributionRecord> = self
            .records
            .iter()
            .filter(|r| &r.plan_id == plan_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
        Ok(records)
    }

    async fn list_all(&self) -> StoreResult<Vec<DistributionRecord>> {
        let mut records: Vec<DistributionRecord> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecochain_types::{DistributionStatus, OperationId, TxHandle};

    fn pending(plan: &str, op: &str, amount: i64) -> DistributionRecord {
        DistributionRecord::pending(PlanId::new(plan), OperationId::new(op), amount)
    }

    #[tokio::test]
    async fn insert_if_absent_keeps_existing() {
        let store = InMemoryRecordStore::new();
        let mut first = pending("p", "op-1", 10);
        first.mark_submitted(TxHandle::new("tx")).unwrap();
        store.put(first.clone()).await.unwrap();

        let stored = store.insert_if_absent(pending("p", "op-1", 10)).await.unwrap();
        assert_eq!(stored.status, DistributionStatus::Submitted);
        assert_eq!(stored, first);
    }

    #[tokio::test]
    async fn lists_are_scoped_and_sorted() {
        let store = InMemoryRecordStore::new();
        store.put(pending("p1", "b", 1)).await.unwrap();
        store.put(pending("p1", "a", 1)).await.unwrap();
        store.put(pending("p2", "c", 1)).await.unwrap();

        let p1 = store.list_for_plan(&PlanId::new("p1")).await.unwrap();
        let ids: Vec<_> = p1.iter().map(|r| r.operation_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.list_all().await.unwrap().len(), 3);
        assert!(store
            .get(&RecordKey {
                plan_id: PlanId::new("p2"),
                operation_id: OperationId::new("a"),
            })
            .await
            .unwrap()
            .is_none());
    }
}
