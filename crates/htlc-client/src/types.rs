use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Key identifying a cross-chain transaction on both chains
pub type TxKey = u64;

/// Chain (Fabric channel) targeted by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {
    /// First chain, channel index `0`
    Chain1,
    /// Second chain, channel index `1`
    Chain2,
}

impl Chain {
    /// Channel index as understood by the service
    pub fn index(self) -> u8 {
        match self {
            Chain::Chain1 => 0,
            Chain::Chain2 => 1,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Chain1 => write!(f, "chain1"),
            Chain::Chain2 => write!(f, "chain2"),
        }
    }
}

/// What the `hashValue` field of a lock request carries
///
/// The initiator locks on chain 1 with the preimage; the counter-party locks on chain 2 with the
/// hash of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockFlag {
    Preimage,
    HashValue,
}

impl LockFlag {
    /// Chain the lock lands on
    pub fn chain(self) -> Chain {
        match self {
            LockFlag::Preimage => Chain::Chain1,
            LockFlag::HashValue => Chain::Chain2,
        }
    }
}

/// HTTP routes exposed by the HTLC service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    TestInvoke,
    Lock,
    Withdraw,
    Audit,
    VerifyTwo,
    VerifyTwoAll,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::TestInvoke => "/htlc/testinvoke",
            Endpoint::Lock => "/htlc/lock",
            Endpoint::Withdraw => "/htlc/withdraw",
            Endpoint::Audit => "/htlc/audit",
            Endpoint::VerifyTwo => "/htlc/verifytwo",
            Endpoint::VerifyTwoAll => "/htlc/verifytwoall",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Identifier of a locked HTLC, as returned by the lock endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockId(pub String);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock `value` from `spender_idx` to `receiver_idx`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockRequest {
    /// Preimage or hash lock, depending on `flag`
    #[serde(rename = "hashValue")]
    pub hash_value: String,
    #[serde(rename = "timeLock", serialize_with = "as_string")]
    pub time_lock: u64,
    #[serde(serialize_with = "as_string")]
    pub value: u64,
    #[serde(rename = "txKey", serialize_with = "as_string")]
    pub tx_key: TxKey,
    pub flag: LockFlag,
    #[serde(rename = "spenderIdx", serialize_with = "as_string")]
    pub spender_idx: usize,
    #[serde(rename = "receiverIdx", serialize_with = "as_string")]
    pub receiver_idx: usize,
}

/// Withdraw a locked HTLC by revealing the preimage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawRequest {
    #[serde(rename = "preImage")]
    pub preimage: String,
    pub id: String,
    #[serde(rename = "txKey", serialize_with = "as_string")]
    pub tx_key: TxKey,
    #[serde(rename = "channel_idx", serialize_with = "chain_index")]
    pub chain: Chain,
    #[serde(rename = "org_idx", serialize_with = "as_string")]
    pub org_idx: usize,
}

/// Compute the audit proofs for a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRequest {
    /// Spender balance after the transaction
    #[serde(serialize_with = "as_string")]
    pub balance: i64,
    #[serde(serialize_with = "as_string")]
    pub value: u64,
    #[serde(rename = "txKey", serialize_with = "as_string")]
    pub tx_key: TxKey,
    #[serde(rename = "channelIdx", serialize_with = "chain_index")]
    pub chain: Chain,
    #[serde(rename = "spenderIdx", serialize_with = "as_string")]
    pub spender_idx: usize,
    #[serde(rename = "receiverIdx", serialize_with = "as_string")]
    pub receiver_idx: usize,
}

/// Verify the audit proofs of a transaction as one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyTwoRequest {
    #[serde(rename = "txKey", serialize_with = "as_string")]
    pub tx_key: TxKey,
    #[serde(rename = "channel_idx", serialize_with = "chain_index")]
    pub chain: Chain,
    #[serde(rename = "org_idx", serialize_with = "as_string")]
    pub org_idx: usize,
    #[serde(rename = "receiverIdx", serialize_with = "as_string")]
    pub receiver_idx: usize,
}

/// Verify the audit proofs of a transaction as every organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyTwoAllRequest {
    #[serde(rename = "txKey", serialize_with = "as_string")]
    pub tx_key: TxKey,
    #[serde(rename = "channel_idx", serialize_with = "chain_index")]
    pub chain: Chain,
    #[serde(rename = "receiverIdx", serialize_with = "as_string")]
    pub receiver_idx: usize,
}

/// Smoke-test request served without touching the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestInvokeRequest {
    pub id: String,
}

/// Response envelope of every endpoint
///
/// Failures carry `message` instead of `msg`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
}

/// Request that can be issued against the HTLC service
pub trait HtlcRequest: Serialize {
    /// Route the request is posted to
    fn endpoint(&self) -> Endpoint;

    /// Name under which the request is reported
    fn name(&self) -> String;
}

impl HtlcRequest for LockRequest {
    fn endpoint(&self) -> Endpoint {
        Endpoint::Lock
    }

    fn name(&self) -> String {
        format!("Lock asset on {}", self.flag.chain())
    }
}

impl HtlcRequest for WithdrawRequest {
    fn endpoint(&self) -> Endpoint {
        Endpoint::Withdraw
    }

    fn name(&self) -> String {
        format!("Withdraw asset on {}", self.chain)
    }
}

impl HtlcRequest for AuditRequest {
    fn endpoint(&self) -> Endpoint {
        Endpoint::Audit
    }

    fn name(&self) -> String {
        format!("Compute proof on {}", self.chain)
    }
}

impl HtlcRequest for VerifyTwoRequest {
    fn endpoint(&self) -> Endpoint {
        Endpoint::VerifyTwo
    }

    fn name(&self) -> String {
        format!("Verify proof on {}", self.chain)
    }
}

impl HtlcRequest for VerifyTwoAllRequest {
    fn endpoint(&self) -> Endpoint {
        Endpoint::VerifyTwoAll
    }

    fn name(&self) -> String {
        format!("Verify all proofs on {}", self.chain)
    }
}

impl HtlcRequest for TestInvokeRequest {
    fn endpoint(&self) -> Endpoint {
        Endpoint::TestInvoke
    }

    fn name(&self) -> String {
        "Test invoke".to_string()
    }
}

/// Hash lock matching a preimage (hex-encoded SHA-256)
pub fn hash_lock(preimage: &str) -> String {
    hex::encode(Sha256::digest(preimage.as_bytes()))
}

fn as_string<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn chain_index<S: Serializer>(chain: &Chain, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&chain.index())
}
