use std::time::Duration;

use crate::{
    Error, HtlcService, Reply, Result,
    types::{
        ApiResponse, AuditRequest, Endpoint, HtlcRequest, LockId, LockRequest, TestInvokeRequest,
        VerifyTwoAllRequest, VerifyTwoRequest, WithdrawRequest,
    },
};

/// HTTP client of the HTLC service
///
/// Cloning is cheap, clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// HTTP client constructor
    ///
    /// `base_url` is the scheme and authority of the service, e.g. `http://127.0.0.1:9192`.
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Internal(format!("Invalid base URL: {base_url}")));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Service base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Post a request and decode the response envelope
    #[tracing::instrument(skip_all, fields(endpoint = %request.endpoint()))]
    pub async fn post<R>(&self, request: &R) -> Result<Reply<String>>
    where
        R: HtlcRequest + Sync,
    {
        let endpoint = request.endpoint();
        let url = format!("{}{}", self.base_url, endpoint.path());

        let response = self.client.post(url).json(request).send().await?;
        let code = response.status().as_u16();
        let body = response.bytes().await?;

        decode_reply(endpoint, code, &body)
    }
}

/// Decode the response of `endpoint` into its `data`
///
/// Non-2xx statuses and envelopes without `data` are errors. The reply carries the size of the
/// whole body.
pub fn decode_reply(endpoint: Endpoint, code: u16, body: &[u8]) -> Result<Reply<String>> {
    if !(200..300).contains(&code) {
        tracing::debug!(%endpoint, code, "Request rejected");
        return Err(Error::Status {
            endpoint,
            code,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }

    let envelope: ApiResponse = serde_json::from_slice(body)?;
    match envelope.data {
        Some(data) => Ok(Reply { data, size: body.len() }),
        None => Err(Error::MissingData { endpoint, msg: envelope.msg }),
    }
}

/// Interpret the `"true"`/`"false"` data of a withdrawal
pub fn parse_withdrawn(reply: Reply<String>) -> Result<Reply<bool>> {
    let withdrawn = reply
        .data
        .parse::<bool>()
        .map_err(|_| Error::InvalidData(format!("Expected a boolean, got {:?}", reply.data)))?;
    Ok(Reply { data: withdrawn, size: reply.size })
}

#[async_trait::async_trait]
impl HtlcService for HttpClient {
    async fn lock(&mut self, request: LockRequest) -> Result<Reply<LockId>> {
        let reply = self.post(&request).await?;
        Ok(reply.map(LockId))
    }

    async fn withdraw(&mut self, request: WithdrawRequest) -> Result<Reply<bool>> {
        parse_withdrawn(self.post(&request).await?)
    }

    async fn audit(&mut self, request: AuditRequest) -> Result<Reply<String>> {
        self.post(&request).await
    }

    async fn verify_two(&mut self, request: VerifyTwoRequest) -> Result<Reply<String>> {
        self.post(&request).await
    }

    async fn verify_two_all(&mut self, request: VerifyTwoAllRequest) -> Result<Reply<String>> {
        self.post(&request).await
    }

    async fn test_invoke(&mut self, request: TestInvokeRequest) -> Result<Reply<String>> {
        self.post(&request).await
    }
}
