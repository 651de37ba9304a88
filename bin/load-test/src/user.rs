//! [`HtlcService`] issuing its requests through a goose user

use goose::{
    goose::GooseResponse,
    metrics::GooseRequestMetric,
    prelude::{GooseMethod, GooseRequest, GooseUser},
};
use htlc_bench_client::{
    Error, HtlcService, Reply, Result, decode_reply,
    metrics::Metrics,
    parse_withdrawn,
    types::{
        AuditRequest, HtlcRequest, LockId, LockRequest, TestInvokeRequest, VerifyTwoAllRequest,
        VerifyTwoRequest, WithdrawRequest,
    },
};

/// Virtual user talking to the HTLC service
///
/// Requests are reported to goose under their request name. Replies goose considers successful
/// but that carry no usable data are marked as failures.
pub struct HtlcUser<'a> {
    user: &'a mut GooseUser,
    metrics: &'a Metrics,
}

impl<'a> HtlcUser<'a> {
    pub fn new(user: &'a mut GooseUser, metrics: &'a Metrics) -> Self {
        Self { user, metrics }
    }

    /// Post `request` and decode its reply
    ///
    /// Returns the goose request metric along with the reply so callers can still fail it.
    async fn send<R>(&mut self, request: &R) -> Result<(Reply<String>, GooseRequestMetric)>
    where
        R: HtlcRequest + Sync,
    {
        let metrics = self.metrics;
        let endpoint = request.endpoint();
        let name = request.name();
        let timer = metrics.request(&name);

        let builder = self
            .user
            .get_request_builder(&GooseMethod::Post, endpoint.path())
            .map_err(|e| Error::Internal(e.to_string()))?
            .json(request);
        let goose_request = GooseRequest::builder()
            .method(GooseMethod::Post)
            .path(endpoint.path())
            .name(name.as_str())
            .set_request_builder(builder)
            .build();

        let GooseResponse { request: mut metric, response } = self
            .user
            .request(goose_request)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let decoded = match response {
            Ok(response) => {
                let code = response.status().as_u16();
                match response.bytes().await {
                    Ok(body) => decode_reply(endpoint, code, &body),
                    Err(e) => Err(Error::Internal(format!("reading {endpoint} response: {e}"))),
                }
            },
            Err(e) => Err(Error::Internal(format!("sending {endpoint} request: {e}"))),
        };

        match decoded {
            Ok(reply) => {
                timer.finish(true, reply.size);
                Ok((reply, metric))
            },
            Err(e) => {
                timer.finish(false, 0);
                // Non-2xx statuses and transport errors are already failures in goose.
                if metric.success {
                    self.fail(&e.to_string(), &mut metric);
                }
                Err(e)
            },
        }
    }

    async fn send_data<R>(&mut self, request: &R) -> Result<Reply<String>>
    where
        R: HtlcRequest + Sync,
    {
        self.send(request).await.map(|(reply, _)| reply)
    }

    fn fail(&mut self, tag: &str, metric: &mut GooseRequestMetric) {
        // `set_failure` hands the updated metric to goose and always reports an error.
        let _ = self.user.set_failure(tag, metric, None, None);
    }
}

#[async_trait::async_trait]
impl HtlcService for HtlcUser<'_> {
    async fn lock(&mut self, request: LockRequest) -> Result<Reply<LockId>> {
        let reply = self.send_data(&request).await?;
        Ok(reply.map(LockId))
    }

    async fn withdraw(&mut self, request: WithdrawRequest) -> Result<Reply<bool>> {
        let (reply, mut metric) = self.send(&request).await?;
        let withdrawn = match parse_withdrawn(reply) {
            Ok(withdrawn) => withdrawn,
            Err(e) => {
                self.fail(&e.to_string(), &mut metric);
                return Err(e);
            },
        };
        if !withdrawn.data {
            self.fail("withdrawal refused", &mut metric);
        }
        Ok(withdrawn)
    }

    async fn audit(&mut self, request: AuditRequest) -> Result<Reply<String>> {
        self.send_data(&request).await
    }

    async fn verify_two(&mut self, request: VerifyTwoRequest) -> Result<Reply<String>> {
        self.send_data(&request).await
    }

    async fn verify_two_all(&mut self, request: VerifyTwoAllRequest) -> Result<Reply<String>> {
        self.send_data(&request).await
    }

    async fn test_invoke(&mut self, request: TestInvokeRequest) -> Result<Reply<String>> {
        self.send_data(&request).await
    }
}
