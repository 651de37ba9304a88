//! Client for the HTLC cross-chain transaction service

pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
#[cfg(feature = "testing")]
pub mod test_utils;
pub mod types;

use self::types::{
    AuditRequest, LockId, LockRequest, TestInvokeRequest, VerifyTwoAllRequest, VerifyTwoRequest,
    WithdrawRequest,
};
pub use self::{
    error::{Error, Result},
    http::{HttpClient, decode_reply, parse_withdrawn},
};

/// Successful reply of the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    /// Decoded `data` field of the response envelope
    pub data: T,
    /// Size of the response body in bytes
    pub size: usize,
}

impl<T> Reply<T> {
    /// Map the decoded data, keeping the body size
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply { data: f(self.data), size: self.size }
    }
}

/// Operations offered by the HTLC service
///
/// Methods take `&mut self` so implementations can drive a per-user connection.
#[async_trait::async_trait]
pub trait HtlcService: Send {
    /// Lock an asset on one chain, returning the HTLC id
    async fn lock(&mut self, request: LockRequest) -> Result<Reply<LockId>>;

    /// Withdraw a locked asset by revealing the preimage
    async fn withdraw(&mut self, request: WithdrawRequest) -> Result<Reply<bool>>;

    /// Compute the audit proofs of a transaction
    async fn audit(&mut self, request: AuditRequest) -> Result<Reply<String>>;

    /// Verify the audit proofs of a transaction as one organization
    async fn verify_two(&mut self, request: VerifyTwoRequest) -> Result<Reply<String>>;

    /// Verify the audit proofs of a transaction as every organization
    async fn verify_two_all(&mut self, request: VerifyTwoAllRequest) -> Result<Reply<String>>;

    /// Smoke-test endpoint
    async fn test_invoke(&mut self, request: TestInvokeRequest) -> Result<Reply<String>>;
}
