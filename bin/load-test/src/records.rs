use std::{
    collections::VecDeque,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Result, ensure};
use htlc_bench_client::types::{Chain, TxKey};
use tokio::sync::Notify;

/// Number of cross-chain transactions
pub const TX_NUM: u64 = 2000;
/// Starting balance of every organization on both chains
pub const INITIAL_BALANCE: i64 = 10_000_000;
/// Default HTLC secret
pub const PREIMAGE: &str = "rootroot";

/// Unit of work picked from the queue by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestRecord {
    /// Full swap: lock on both chains, then withdraw on both
    Htlc {
        tx_key: TxKey,
        value1: String,
        value2: String,
    },
    /// Audit and verify every transaction `1..tx_key`
    Audit { tx_key: TxKey },
    /// Verify a transaction on both chains as every organization
    VerifyAll { tx_key: TxKey },
    /// Smoke-test request
    Ping { tx_key: TxKey },
}

impl TestRecord {
    pub fn htlc(tx_key: TxKey) -> Self {
        let password = format!("pwd{tx_key:04}");
        TestRecord::Htlc {
            tx_key,
            value1: password.clone(),
            value2: password,
        }
    }

    pub fn tx_key(&self) -> TxKey {
        match self {
            TestRecord::Htlc { tx_key, .. }
            | TestRecord::Audit { tx_key }
            | TestRecord::VerifyAll { tx_key }
            | TestRecord::Ping { tx_key } => *tx_key,
        }
    }
}

/// Swap records for transactions `1..=tx_num`
pub fn htlc_records(tx_num: u64) -> Vec<TestRecord> {
    (1..=tx_num).map(TestRecord::htlc).collect()
}

/// The single record auditing all `tx_num` transactions
pub fn audit_record(tx_num: u64) -> TestRecord {
    TestRecord::Audit { tx_key: tx_num + 1 }
}

/// FIFO of records shared by all users
///
/// Also tracks the swaps that have not completed yet, so audits can wait for them.
#[derive(Debug, Default)]
pub struct WorkQueue {
    records: Mutex<VecDeque<TestRecord>>,
    pending_swaps: AtomicUsize,
    swaps_done: Notify,
}

impl WorkQueue {
    pub fn new(records: impl IntoIterator<Item = TestRecord>) -> Self {
        let records: VecDeque<_> = records.into_iter().collect();
        let swaps = records.iter().filter(|r| matches!(r, TestRecord::Htlc { .. })).count();
        Self {
            records: Mutex::new(records),
            pending_swaps: AtomicUsize::new(swaps),
            swaps_done: Notify::new(),
        }
    }

    /// Next record, `None` once the data has run out
    pub fn pop(&self) -> Option<TestRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark one swap as completed, successful or not
    pub fn finish_swap(&self) {
        let previous = self
            .pending_swaps
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous == 1 {
            self.swaps_done.notify_waiters();
        }
    }

    /// Wait until every swap of the queue has completed
    pub async fn swaps_finished(&self) {
        loop {
            let notified = self.swaps_done.notified();
            if self.pending_swaps.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Initial balances of every organization on both chains
///
/// Must agree with what the service was initialized with, audits prove balances against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    chain1: Vec<i64>,
    chain2: Vec<i64>,
}

impl Ledger {
    /// Two-party swaps need at least two organizations.
    pub fn new(org_num: usize, initial_balance: i64) -> Result<Self> {
        ensure!(org_num >= 2, "at least 2 organizations are required, got {org_num}");
        Ok(Self {
            chain1: vec![initial_balance; org_num],
            chain2: vec![initial_balance; org_num],
        })
    }

    pub fn org_num(&self) -> usize {
        self.chain1.len()
    }

    /// Balance of `org` on `chain` after it spent `value` in each of `n` transactions
    pub fn balance_after(&self, chain: Chain, org: usize, value: u64, n: u64) -> Option<i64> {
        let initial = match chain {
            Chain::Chain1 => self.chain1.get(org)?,
            Chain::Chain2 => self.chain2.get(org)?,
        };
        let spent = i64::try_from(value.checked_mul(n)?).ok()?;
        initial.checked_sub(spent)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            chain1: vec![INITIAL_BALANCE; 2],
            chain2: vec![INITIAL_BALANCE; 2],
        }
    }
}
