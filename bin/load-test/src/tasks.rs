//! Request sequences run for every kind of [`TestRecord`]

use std::time::{Duration, Instant};

use htlc_bench_client::{
    HtlcService, Reply, Result,
    types::{
        AuditRequest, Chain, HtlcRequest, LockFlag, LockRequest, TestInvokeRequest, TxKey, VerifyTwoAllRequest,
        VerifyTwoRequest, WithdrawRequest,
    },
};
use tracing::{info, warn};

use crate::records::{Ledger, TestRecord};

/// Initiator of every swap, spends on chain 1
const INITIATOR: usize = 0;
/// Counter-party of every swap, spends on chain 2
const COUNTERPARTY: usize = 1;

/// Parameters shared by every task
#[derive(Debug, Clone)]
pub struct Workload {
    /// Number of cross-chain transactions
    pub tx_num: u64,
    /// Amount the initiator transfers on chain 1
    pub value1: u64,
    /// Amount the counter-party transfers on chain 2
    pub value2: u64,
    pub preimage: String,
    pub hash_lock: String,
    pub ledger: Ledger,
}

/// Run the request sequence of `record`
///
/// Long-running records stop between transactions once `deadline` has passed.
pub async fn run_record<S>(
    service: &mut S,
    workload: &Workload,
    record: TestRecord,
    deadline: Option<Instant>,
) where
    S: HtlcService + ?Sized,
{
    match record {
        TestRecord::Htlc { tx_key, value1, value2 } => {
            tracing::debug!(tx_key, %value1, %value2, "Cross-chain tx");
            if !swap(service, workload, tx_key).await {
                tracing::debug!(tx_key, "Swap incomplete");
            }
        },
        TestRecord::Audit { tx_key } => {
            info!(tx_key, transactions = workload.tx_num, "Auditing previous transactions");
            let audited = audit_all(service, workload, deadline).await;
            if audited < workload.tx_num {
                info!(audited, "Run time elapsed, audit interrupted");
            }
        },
        TestRecord::VerifyAll { tx_key } => verify_all(service, tx_key).await,
        TestRecord::Ping { tx_key } => {
            let request = TestInvokeRequest { id: tx_key.to_string() };
            let name = request.name();
            settled(&name, service.test_invoke(request).await);
        },
    }
}

/// Lock on both chains, then withdraw both locks with the preimage
///
/// A withdrawal is skipped when the lock it depends on failed. Returns whether both assets were
/// withdrawn.
pub async fn swap<S>(service: &mut S, workload: &Workload, tx_key: TxKey) -> bool
where
    S: HtlcService + ?Sized,
{
    let lock1 = LockRequest {
        hash_value: workload.preimage.clone(),
        time_lock: 1000 + 2 * tx_key,
        value: workload.value1,
        tx_key,
        flag: LockFlag::Preimage,
        spender_idx: INITIATOR,
        receiver_idx: COUNTERPARTY,
    };
    let id1 = settled(&lock1.name(), service.lock(lock1).await);

    let lock2 = LockRequest {
        hash_value: workload.hash_lock.clone(),
        time_lock: 500 + tx_key,
        value: workload.value2,
        tx_key,
        flag: LockFlag::HashValue,
        spender_idx: COUNTERPARTY,
        receiver_idx: INITIATOR,
    };
    let id2 = settled(&lock2.name(), service.lock(lock2).await);

    let mut withdrawn = 0;
    // The initiator claims on chain 2 first, revealing the preimage to the counter-party.
    for (id, chain, org_idx) in [(id2, Chain::Chain2, INITIATOR), (id1, Chain::Chain1, COUNTERPARTY)]
    {
        let Some(id) = id else {
            warn!(tx_key, %chain, "Lock failed, skipping withdrawal");
            continue;
        };
        let request = WithdrawRequest {
            preimage: workload.preimage.clone(),
            id: id.0,
            tx_key,
            chain,
            org_idx,
        };
        let name = request.name();
        match settled(&name, service.withdraw(request).await) {
            Some(true) => withdrawn += 1,
            Some(false) => warn!(tx_key, %chain, "Withdrawal refused"),
            None => {},
        }
    }
    withdrawn == 2
}

/// Audit transactions `1..=tx_num` in order, returning how many were audited
pub async fn audit_all<S>(service: &mut S, workload: &Workload, deadline: Option<Instant>) -> u64
where
    S: HtlcService + ?Sized,
{
    for tx_i in 1..=workload.tx_num {
        if past(deadline) {
            return tx_i - 1;
        }
        audit(service, workload, tx_i).await;
    }
    workload.tx_num
}

/// Compute and verify the audit proofs of transaction `tx_i` on both chains
pub async fn audit<S>(service: &mut S, workload: &Workload, tx_i: TxKey)
where
    S: HtlcService + ?Sized,
{
    let legs = [
        (Chain::Chain1, INITIATOR, COUNTERPARTY, workload.value1),
        (Chain::Chain2, COUNTERPARTY, INITIATOR, workload.value2),
    ];
    for (chain, spender_idx, receiver_idx, value) in legs {
        let Some(balance) = workload.ledger.balance_after(chain, spender_idx, value, tx_i) else {
            warn!(tx_key = tx_i, %chain, "Balance out of range, skipping audit");
            continue;
        };
        let request = AuditRequest {
            balance,
            value,
            tx_key: tx_i,
            chain,
            spender_idx,
            receiver_idx,
        };
        let name = request.name();
        settled(&name, service.audit(request).await);
    }

    // Each chain's proofs are verified by the receiving organization.
    for (chain, org_idx) in [(Chain::Chain1, COUNTERPARTY), (Chain::Chain2, INITIATOR)] {
        let request = VerifyTwoRequest { tx_key: tx_i, chain, org_idx, receiver_idx: org_idx };
        let name = request.name();
        settled(&name, service.verify_two(request).await);
    }
}

/// Verify the proofs of `tx_key` on both chains as every organization
pub async fn verify_all<S>(service: &mut S, tx_key: TxKey)
where
    S: HtlcService + ?Sized,
{
    for (chain, receiver_idx) in [(Chain::Chain1, COUNTERPARTY), (Chain::Chain2, INITIATOR)] {
        let request = VerifyTwoAllRequest { tx_key, chain, receiver_idx };
        let name = request.name();
        settled(&name, service.verify_two_all(request).await);
    }
}

/// Reply data of a request, logging the failure otherwise
fn settled<T>(request: &str, result: Result<Reply<T>>) -> Option<T> {
    match result {
        Ok(reply) => Some(reply.data),
        Err(e) => {
            warn!(request, error = %e, "Request failed");
            None
        },
    }
}

pub fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Sleep for what is left of `period` since `start`
pub async fn pace(start: Instant, period: Option<Duration>) {
    if let Some(period) = period {
        let elapsed = start.elapsed();
        if elapsed < period {
            tokio::time::sleep(period - elapsed).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use htlc_bench_client::{
        Error,
        types::{LockId, hash_lock},
    };
    use serde_json::Value;

    use super::*;

    /// In-memory service recording every request as JSON
    #[derive(Clone, Default)]
    pub struct RecordingService {
        pub requests: Arc<Mutex<Vec<(String, Value)>>>,
        /// `txKey`s whose chain-1 lock fails
        pub failing_locks: Vec<TxKey>,
    }

    impl RecordingService {
        fn push<R: HtlcRequest>(&self, request: &R) {
            let body = serde_json::to_value(request).unwrap();
            self.requests.lock().unwrap().push((request.name(), body));
        }

        pub fn names(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
        }

        pub fn bodies(&self, name: &str) -> Vec<Value> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, b)| b.clone())
                .collect()
        }
    }

    fn reply<T>(data: T) -> Result<Reply<T>> {
        Ok(Reply { data, size: 8 })
    }

    #[async_trait::async_trait]
    impl HtlcService for RecordingService {
        async fn lock(&mut self, request: LockRequest) -> Result<Reply<LockId>> {
            self.push(&request);
            if request.flag == LockFlag::Preimage && self.failing_locks.contains(&request.tx_key) {
                return Err(Error::Internal("lock rejected".to_string()));
            }
            reply(LockId(format!("id-{}-{}", request.flag.chain(), request.tx_key)))
        }

        async fn withdraw(&mut self, request: WithdrawRequest) -> Result<Reply<bool>> {
            self.push(&request);
            reply(request.preimage == "rootroot")
        }

        async fn audit(&mut self, request: AuditRequest) -> Result<Reply<String>> {
            self.push(&request);
            reply("audit triggered".to_string())
        }

        async fn verify_two(&mut self, request: VerifyTwoRequest) -> Result<Reply<String>> {
            self.push(&request);
            reply("verified".to_string())
        }

        async fn verify_two_all(&mut self, request: VerifyTwoAllRequest) -> Result<Reply<String>> {
            self.push(&request);
            reply("verified".to_string())
        }

        async fn test_invoke(&mut self, request: TestInvokeRequest) -> Result<Reply<String>> {
            self.push(&request);
            reply("mock backend".to_string())
        }
    }

    pub fn workload(tx_num: u64) -> Workload {
        Workload {
            tx_num,
            value1: 1,
            value2: 1,
            preimage: "rootroot".to_string(),
            hash_lock: hash_lock("rootroot"),
            ledger: Ledger::default(),
        }
    }

    #[tokio::test]
    async fn swap_locks_then_withdraws() {
        let mut service = RecordingService::default();

        assert!(swap(&mut service, &workload(10), 7).await);

        assert_eq!(
            service.names(),
            [
                "Lock asset on chain1",
                "Lock asset on chain2",
                "Withdraw asset on chain2",
                "Withdraw asset on chain1",
            ]
        );

        let lock1 = &service.bodies("Lock asset on chain1")[0];
        assert_eq!(lock1["hashValue"], "rootroot");
        assert_eq!(lock1["timeLock"], "1014");
        assert_eq!(lock1["spenderIdx"], "0");
        assert_eq!(lock1["receiverIdx"], "1");

        let lock2 = &service.bodies("Lock asset on chain2")[0];
        assert_eq!(lock2["hashValue"], hash_lock("rootroot"));
        assert_eq!(lock2["timeLock"], "507");
        assert_eq!(lock2["flag"], "hashValue");

        let withdraw2 = &service.bodies("Withdraw asset on chain2")[0];
        assert_eq!(withdraw2["id"], "id-chain2-7");
        assert_eq!(withdraw2["org_idx"], "0");
        let withdraw1 = &service.bodies("Withdraw asset on chain1")[0];
        assert_eq!(withdraw1["id"], "id-chain1-7");
        assert_eq!(withdraw1["org_idx"], "1");
    }

    #[tokio::test]
    async fn failed_lock_skips_its_withdrawal() {
        let mut service = RecordingService { failing_locks: vec![3], ..Default::default() };

        assert!(!swap(&mut service, &workload(10), 3).await);

        assert_eq!(
            service.names(),
            ["Lock asset on chain1", "Lock asset on chain2", "Withdraw asset on chain2"]
        );
    }

    #[tokio::test]
    async fn refused_withdrawal_leaves_swap_incomplete() {
        let mut service = RecordingService::default();
        let mut workload = workload(1);
        workload.preimage = "wrong".to_string();

        assert!(!swap(&mut service, &workload, 1).await);
        assert_eq!(service.bodies("Withdraw asset on chain1").len(), 1);
    }

    #[tokio::test]
    async fn audit_record_covers_every_transaction() {
        let mut service = RecordingService::default();

        run_record(&mut service, &workload(3), TestRecord::Audit { tx_key: 4 }, None).await;

        assert_eq!(service.names().len(), 12);
        assert_eq!(
            &service.names()[..4],
            [
                "Compute proof on chain1",
                "Compute proof on chain2",
                "Verify proof on chain1",
                "Verify proof on chain2",
            ]
        );

        let audits1 = service.bodies("Compute proof on chain1");
        let balances: Vec<_> = audits1.iter().map(|b| b["balance"].clone()).collect();
        assert_eq!(balances, ["9999999", "9999998", "9999997"]);
        assert_eq!(audits1[2]["txKey"], "3");

        let audits2 = service.bodies("Compute proof on chain2");
        assert_eq!(audits2[0]["spenderIdx"], "1");
        assert_eq!(audits2[0]["channelIdx"], "1");

        let verify1 = &service.bodies("Verify proof on chain1")[0];
        assert_eq!(verify1["org_idx"], "1");
        assert_eq!(verify1["receiverIdx"], "1");
        let verify2 = &service.bodies("Verify proof on chain2")[0];
        assert_eq!(verify2["org_idx"], "0");
        assert_eq!(verify2["receiverIdx"], "0");
    }

    #[tokio::test]
    async fn audit_stops_at_deadline() {
        let mut service = RecordingService::default();

        let audited = audit_all(&mut service, &workload(5), Some(Instant::now())).await;

        assert_eq!(audited, 0);
        assert!(service.names().is_empty());
    }

    #[tokio::test]
    async fn verify_all_and_ping() {
        let mut service = RecordingService::default();

        run_record(&mut service, &workload(1), TestRecord::VerifyAll { tx_key: 1 }, None).await;
        run_record(&mut service, &workload(1), TestRecord::Ping { tx_key: 1 }, None).await;

        assert_eq!(
            service.names(),
            ["Verify all proofs on chain1", "Verify all proofs on chain2", "Test invoke"]
        );
    }
}
