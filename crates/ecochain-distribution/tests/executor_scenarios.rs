//! End-to-end executor behaviour against a scripted ledger.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ecochain_distribution::{
    DistributionExecutor, ExecutorConfig, InMemoryRecordStore, Ledger, LedgerError, LedgerTxStatus,
    RecordStore, StoreError, StoreResult,
};
use ecochain_types::{
    AllocationPolicy, BackoffConfig, DistributionPlan, DistributionRecord, DistributionStatus,
    Epoch, OperationId, PlanId, RecordKey, RetryPolicy, TxHandle,
};

/// Ledger double. Transfers consume `script` first; recipients in `rejected`
/// are always refused; a transaction is final after `polls_to_finality` polls.
struct ScriptedLedger {
    script: Mutex<VecDeque<LedgerError>>,
    rejected: HashSet<OperationId>,
    polls_to_finality: u32,
    fail_on_ledger: HashSet<OperationId>,
    transfer_delay: Duration,
    transfers: AtomicUsize,
    polls: Mutex<HashMap<TxHandle, u32>>,
    recipients: Mutex<HashMap<TxHandle, OperationId>>,
}

impl ScriptedLedger {
    fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            rejected: HashSet::new(),
            polls_to_finality: 1,
            fail_on_ledger: HashSet::new(),
            transfer_delay: Duration::ZERO,
            transfers: AtomicUsize::new(0),
            polls: Mutex::new(HashMap::new()),
            recipients: Mutex::new(HashMap::new()),
        }
    }

    fn failing_first(self, errors: Vec<LedgerError>) -> Self {
        *self.script.lock().unwrap() = errors.into();
        self
    }

    fn rejecting(mut self, recipient: &str) -> Self {
        self.rejected.insert(OperationId::new(recipient));
        self
    }

    fn failing_after_submit(mut self, recipient: &str) -> Self {
        self.fail_on_ledger.insert(OperationId::new(recipient));
        self
    }

    fn final_after(mut self, polls: u32) -> Self {
        self.polls_to_finality = polls;
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.transfer_delay = delay;
        self
    }

    fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn transfer(
        &self,
        recipient: &OperationId,
        _amount: i64,
    ) -> Result<TxHandle, LedgerError> {
        let n = self.transfers.fetch_add(1, Ordering::SeqCst);
        if !self.transfer_delay.is_zero() {
            tokio::time::sleep(self.transfer_delay).await;
        }
        if self.rejected.contains(recipient) {
            return Err(LedgerError::Rejected(format!("invalid recipient {recipient}")));
        }
        if let Some(err) = self.script.lock().unwrap().pop_front() {
            return Err(err);
        }
        let tx = TxHandle::new(format!("tx-{n}-{recipient}"));
        self.recipients.lock().unwrap().insert(tx.clone(), recipient.clone());
        Ok(tx)
    }

    async fn get_status(&self, tx: &TxHandle) -> Result<LedgerTxStatus, LedgerError> {
        let recipient = self.recipients.lock().unwrap().get(tx).cloned();
        if recipient.map_or(false, |r| self.fail_on_ledger.contains(&r)) {
            return Ok(LedgerTxStatus::Failed);
        }
        let mut polls = self.polls.lock().unwrap();
        let seen = polls.entry(tx.clone()).or_insert(0);
        *seen += 1;
        if *seen >= self.polls_to_finality {
            Ok(LedgerTxStatus::Confirmed)
        } else {
            Ok(LedgerTxStatus::Pending)
        }
    }
}

/// Store double that refuses writes of Submitted records for chosen
/// recipients, a fixed number of times.
struct FlakyStore {
    inner: InMemoryRecordStore,
    refusals: Mutex<HashMap<OperationId, usize>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            refusals: Mutex::new(HashMap::new()),
        }
    }

    fn refuse_submitted(&self, recipient: &str, times: usize) {
        self.refusals
            .lock()
            .unwrap()
            .insert(OperationId::new(recipient), times);
    }

    fn heal(&self) {
        self.refusals.lock().unwrap().clear();
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<DistributionRecord>> {
        self.inner.get(key).await
    }

    async fn put(&self, record: DistributionRecord) -> StoreResult<()> {
        if record.status == DistributionStatus::Submitted {
            let mut refusals = self.refusals.lock().unwrap();
            if let Some(left) = refusals.get_mut(&record.operation_id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(StoreError::Backend("write timeout".into()));
                }
            }
        }
        self.inner.put(record).await
    }

    async fn insert_if_absent(
        &self,
        record: DistributionRecord,
    ) -> StoreResult<DistributionRecord> {
        self.inner.insert_if_absent(record).await
    }

    async fn list_for_plan(&self, plan_id: &PlanId) -> StoreResult<Vec<DistributionRecord>> {
        self.inner.list_for_plan(plan_id).await
    }

    async fn list_all(&self) -> StoreResult<Vec<DistributionRecord>> {
        self.inner.list_all().await
    }
}

fn config() -> ExecutorConfig {
    ExecutorConfig {
        retry: RetryPolicy::new(5, BackoffConfig::immediate()),
        call_timeout_ms: 100,
        confirmation_workers: 4,
        confirmation_interval_ms: 1,
        max_confirmation_rounds: 10,
    }
}

fn plan(id: &str, allocations: &[(&str, i64)]) -> DistributionPlan {
    let allocations: BTreeMap<OperationId, i64> = allocations
        .iter()
        .map(|(op, amount)| (OperationId::new(*op), *amount))
        .collect();
    let total: i64 = allocations.values().sum();
    DistributionPlan {
        plan_id: PlanId::new(id),
        epoch: Epoch(1),
        policy: AllocationPolicy::Proportional,
        total_pool: total,
        allocations,
        residual: 0,
        zero_allocations: vec![],
    }
}

fn executor(
    ledger: Arc<ScriptedLedger>,
    config: ExecutorConfig,
) -> (DistributionExecutor, Arc<InMemoryRecordStore>) {
    let store = Arc::new(InMemoryRecordStore::new());
    (DistributionExecutor::new(ledger, store.clone(), config), store)
}

fn transient() -> LedgerError {
    LedgerError::Transient("503 from ledger".into())
}

#[tokio::test]
async fn transient_error_then_success_ends_confirmed_after_two_attempts() {
    let ledger = Arc::new(ScriptedLedger::new().failing_first(vec![transient()]));
    let (exec, _) = executor(ledger.clone(), config());

    let outcome = exec.run_plan(&plan("p1", &[("op-1", 500)])).await.unwrap();

    assert!(outcome.complete);
    let record = &outcome.records[0];
    assert_eq!(record.status, DistributionStatus::Confirmed);
    assert_eq!(record.attempts, 2);
    assert!(record.tx_handle.is_some());
    assert_eq!(ledger.transfers(), 2);
}

#[tokio::test]
async fn rerunning_a_confirmed_plan_makes_no_new_transfers() {
    let ledger = Arc::new(ScriptedLedger::new());
    let (exec, _) = executor(ledger.clone(), config());
    let p = plan("p1", &[("a", 10), ("b", 20), ("c", 30)]);

    let first = exec.run_plan(&p).await.unwrap();
    assert_eq!(first.count(DistributionStatus::Confirmed), 3);
    assert_eq!(ledger.transfers(), 3);

    let second = exec.run_plan(&p).await.unwrap();
    assert_eq!(second.records, first.records);
    assert_eq!(ledger.transfers(), 3);
}

#[tokio::test]
async fn restart_with_fresh_executor_and_same_store_does_not_resubmit() {
    let ledger = Arc::new(ScriptedLedger::new().final_after(100));
    let store = Arc::new(InMemoryRecordStore::new());
    let mut cfg = config();
    cfg.max_confirmation_rounds = 1;
    let p = plan("p1", &[("a", 10), ("b", 20)]);

    let before = DistributionExecutor::new(ledger.clone(), store.clone(), cfg.clone());
    let outcome = before.run_plan(&p).await.unwrap();
    assert!(!outcome.complete);
    assert_eq!(outcome.count(DistributionStatus::Submitted), 2);

    let after = DistributionExecutor::new(ledger.clone(), store.clone(), cfg);
    after.run_plan(&p).await.unwrap();
    assert_eq!(ledger.transfers(), 2);
}

#[tokio::test]
async fn stale_pending_copy_cannot_trigger_second_transfer() {
    let ledger = Arc::new(ScriptedLedger::new());
    let (exec, _) = executor(ledger.clone(), config());
    let p = plan("p1", &[("a", 10)]);

    let records = exec.submit(&p).await.unwrap();
    let stale = records[0].clone();
    let advanced = exec.advance(&stale).await.unwrap();
    assert_eq!(advanced.status, DistributionStatus::Submitted);

    let again = exec.advance(&stale).await.unwrap();
    assert_eq!(again, advanced);
    assert_eq!(ledger.transfers(), 1);
}

#[tokio::test]
async fn concurrent_advances_of_one_record_transfer_once() {
    let ledger = Arc::new(ScriptedLedger::new().slow(Duration::from_millis(10)));
    let (exec, _) = executor(ledger.clone(), config());
    let exec = Arc::new(exec);
    let records = exec.submit(&plan("p1", &[("a", 10)])).await.unwrap();

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let exec = exec.clone();
            let record = records[0].clone();
            tokio::spawn(async move { exec.advance(&record).await })
        })
        .collect();
    for task in futures::future::join_all(tasks).await {
        assert_eq!(task.unwrap().unwrap().status, DistributionStatus::Submitted);
    }
    assert_eq!(ledger.transfers(), 1);
}

#[tokio::test]
async fn rejection_fails_one_record_without_blocking_others() {
    let ledger = Arc::new(ScriptedLedger::new().rejecting("bad"));
    let (exec, _) = executor(ledger.clone(), config());

    let outcome = exec
        .run_plan(&plan("p1", &[("bad", 10), ("good-1", 20), ("good-2", 30)]))
        .await
        .unwrap();

    assert!(outcome.complete);
    assert_eq!(outcome.count(DistributionStatus::Confirmed), 2);
    let bad = outcome
        .records
        .iter()
        .find(|r| r.operation_id.as_str() == "bad")
        .unwrap();
    assert_eq!(bad.status, DistributionStatus::Failed);
    assert_eq!(bad.attempts, 1);
    assert!(bad.last_error.as_deref().unwrap().contains("invalid recipient"));
    assert_eq!(ledger.transfers(), 3);
}

#[tokio::test]
async fn exhausting_transient_budget_fails_the_record() {
    let errors = (0..10).map(|_| transient()).collect();
    let ledger = Arc::new(ScriptedLedger::new().failing_first(errors));
    let mut cfg = config();
    cfg.retry = RetryPolicy::new(3, BackoffConfig::immediate());
    let (exec, _) = executor(ledger.clone(), cfg);

    let outcome = exec.run_plan(&plan("p1", &[("a", 10)])).await.unwrap();

    assert!(outcome.complete);
    assert_eq!(outcome.records[0].status, DistributionStatus::Failed);
    assert_eq!(outcome.records[0].attempts, 3);
    assert_eq!(ledger.transfers(), 3);
}

#[tokio::test]
async fn slow_ledger_times_out_as_transient() {
    let ledger = Arc::new(ScriptedLedger::new().slow(Duration::from_millis(200)));
    let mut cfg = config();
    cfg.call_timeout_ms = 20;
    cfg.retry = RetryPolicy::new(2, BackoffConfig::immediate());
    let (exec, _) = executor(ledger.clone(), cfg);

    let outcome = exec.run_plan(&plan("p1", &[("a", 10)])).await.unwrap();
    let record = &outcome.records[0];
    assert_eq!(record.status, DistributionStatus::Failed);
    assert_eq!(record.attempts, 2);
    assert!(record.last_error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn ledger_side_failure_after_submission() {
    let ledger = Arc::new(ScriptedLedger::new().failing_after_submit("a"));
    let (exec, _) = executor(ledger.clone(), config());

    let outcome = exec.run_plan(&plan("p1", &[("a", 10), ("b", 10)])).await.unwrap();
    assert!(outcome.complete);
    assert_eq!(outcome.count(DistributionStatus::Failed), 1);
    assert_eq!(outcome.count(DistributionStatus::Confirmed), 1);
}

#[tokio::test]
async fn confirmation_rounds_can_run_out() {
    let ledger = Arc::new(ScriptedLedger::new().final_after(50));
    let mut cfg = config();
    cfg.max_confirmation_rounds = 3;
    let (exec, _) = executor(ledger.clone(), cfg);

    let outcome = exec.run_plan(&plan("p1", &[("a", 10)])).await.unwrap();
    assert!(!outcome.complete);
    assert_eq!(outcome.records[0].status, DistributionStatus::Submitted);
}

#[tokio::test]
async fn finality_after_several_polls() {
    let ledger = Arc::new(ScriptedLedger::new().final_after(3));
    let (exec, _) = executor(ledger.clone(), config());

    let outcome = exec.run_plan(&plan("p1", &[("a", 10), ("b", 5)])).await.unwrap();
    assert!(outcome.complete);
    assert_eq!(outcome.count(DistributionStatus::Confirmed), 2);
}

#[tokio::test]
async fn cancellation_suppresses_pending_but_confirms_submitted() {
    let ledger = Arc::new(ScriptedLedger::new().final_after(1));
    let (exec, store) = executor(ledger.clone(), config());
    let p = plan("p1", &[("a", 10), ("b", 20)]);

    let records = exec.submit(&p).await.unwrap();
    let submitted = exec.advance(&records[0]).await.unwrap();
    assert_eq!(submitted.status, DistributionStatus::Submitted);

    exec.cancel(&p.plan_id);
    assert!(exec.is_cancelled(&p.plan_id));
    let outcome = exec.run_plan(&p).await.unwrap();

    assert!(!outcome.complete);
    assert_eq!(outcome.count(DistributionStatus::Confirmed), 1);
    assert_eq!(outcome.count(DistributionStatus::Pending), 1);
    assert_eq!(ledger.transfers(), 1);

    let stored = store.list_for_plan(&p.plan_id).await.unwrap();
    assert_eq!(stored, outcome.records);
}

#[tokio::test]
async fn empty_plan_is_trivially_complete() {
    let ledger = Arc::new(ScriptedLedger::new());
    let (exec, _) = executor(ledger.clone(), config());

    let outcome = exec.run_plan(&plan("p0", &[])).await.unwrap();
    assert!(outcome.complete);
    assert!(outcome.records.is_empty());
    assert_eq!(ledger.transfers(), 0);
}

#[tokio::test]
async fn store_error_after_transfer_is_retried_without_paying_again() {
    let ledger = Arc::new(ScriptedLedger::new());
    let store = Arc::new(FlakyStore::new());
    store.refuse_submitted("a", 1);
    let exec = DistributionExecutor::new(ledger.clone(), store.clone(), config());
    let p = plan("p1", &[("a", 10)]);

    let first = exec.run_plan(&p).await.unwrap();
    assert!(first.complete);
    assert_eq!(first.records[0].status, DistributionStatus::Confirmed);

    exec.run_plan(&p).await.unwrap();
    assert_eq!(ledger.transfers(), 1);
}

#[tokio::test]
async fn unacknowledged_transfer_is_failed_instead_of_resubmitted() {
    let ledger = Arc::new(ScriptedLedger::new());
    let store = Arc::new(FlakyStore::new());
    store.refuse_submitted("a", usize::MAX);
    let exec = DistributionExecutor::new(ledger.clone(), store.clone(), config());
    let p = plan("p1", &[("a", 10), ("b", 20)]);

    // The write for "a" never lands; "b" still completes.
    let first = exec.run_plan(&p).await.unwrap();
    assert!(!first.complete);
    let a = &first.records[0];
    assert_eq!(a.status, DistributionStatus::Pending);
    assert!(a.transfer_in_flight);
    assert_eq!(first.records[1].status, DistributionStatus::Confirmed);
    assert_eq!(ledger.transfers(), 2);

    store.heal();
    let restarted = DistributionExecutor::new(ledger.clone(), store.clone(), config());
    let second = restarted.run_plan(&p).await.unwrap();
    assert!(second.complete);
    let a = &second.records[0];
    assert_eq!(a.status, DistributionStatus::Failed);
    assert!(a.last_error.as_deref().unwrap().contains("never acknowledged"));
    assert_eq!(ledger.transfers(), 2);
}

#[tokio::test]
async fn interrupted_run_resumes_submitted_records() {
    let ledger = Arc::new(ScriptedLedger::new().final_after(4));
    let mut cfg = config();
    cfg.max_confirmation_rounds = 1;
    let (exec, _) = executor(ledger.clone(), cfg);
    let p = plan("p1", &[("a", 10)]);

    let mut outcome = exec.run_plan(&p).await.unwrap();
    assert!(exec.needs_resume(&outcome));
    let mut passes = 1;
    while exec.needs_resume(&outcome) {
        outcome = exec.run_plan(&p).await.unwrap();
        passes += 1;
        assert!(passes < 10);
    }
    assert!(outcome.complete);
    assert_eq!(outcome.records[0].status, DistributionStatus::Confirmed);
    assert_eq!(ledger.transfers(), 1);
}

#[tokio::test]
async fn cancelled_plan_with_only_pending_records_needs_no_resume() {
    let ledger = Arc::new(ScriptedLedger::new());
    let (exec, _) = executor(ledger.clone(), config());
    let p = plan("p1", &[("a", 10)]);

    exec.cancel(&p.plan_id);
    let outcome = exec.run_plan(&p).await.unwrap();
    assert_eq!(outcome.count(DistributionStatus::Pending), 1);
    assert!(!exec.needs_resume(&outcome));
    assert_eq!(ledger.transfers(), 0);
}

#[tokio::test]
async fn record_locks_are_released_once_terminal() {
    let ledger = Arc::new(ScriptedLedger::new().rejecting("bad"));
    let (exec, _) = executor(ledger.clone(), config());

    let outcome = exec
        .run_plan(&plan("p1", &[("bad", 10), ("a", 20), ("b", 30)]))
        .await
        .unwrap();
    assert!(outcome.complete);
    assert_eq!(exec.lock_count(), 0);
}
