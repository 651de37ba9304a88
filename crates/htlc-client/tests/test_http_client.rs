use anyhow::Result;
use htlc_bench_client::{
    Error, HtlcService, HttpClient,
    test_utils::MockService,
    types::{
        AuditRequest, Chain, Endpoint, LockFlag, LockRequest, TestInvokeRequest,
        VerifyTwoAllRequest, VerifyTwoRequest, WithdrawRequest, hash_lock,
    },
};

const PREIMAGE: &str = "rootroot";

fn lock_request(tx_key: u64, flag: LockFlag) -> LockRequest {
    let hash_value = match flag {
        LockFlag::Preimage => PREIMAGE.to_string(),
        LockFlag::HashValue => hash_lock(PREIMAGE),
    };
    LockRequest {
        hash_value,
        time_lock: 500 + tx_key,
        value: 1,
        tx_key,
        flag,
        spender_idx: 1,
        receiver_idx: 0,
    }
}

#[tokio::test]
async fn test_lock_then_withdraw() -> Result<()> {
    let service = MockService::spawn(PREIMAGE).await;
    let mut client = HttpClient::new(service.url.clone(), 1000)?;

    let reply = client.lock(lock_request(3, LockFlag::HashValue)).await?;
    assert_eq!(reply.data.0, "hashValue-3");
    assert!(reply.size > 0);

    let withdrawn = client
        .withdraw(WithdrawRequest {
            preimage: PREIMAGE.to_string(),
            id: reply.data.0.clone(),
            tx_key: 3,
            chain: Chain::Chain2,
            org_idx: 0,
        })
        .await?;
    assert!(withdrawn.data);

    let locks = service.received_on(Endpoint::Lock);
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0]["timeLock"], "503");
    assert_eq!(locks[0]["hashValue"], hash_lock(PREIMAGE));

    let withdrawals = service.received_on(Endpoint::Withdraw);
    assert_eq!(withdrawals[0]["id"], "hashValue-3");
    assert_eq!(withdrawals[0]["channel_idx"], "1");
    Ok(())
}

#[tokio::test]
async fn test_withdraw_with_wrong_preimage_is_refused() -> Result<()> {
    let service = MockService::spawn(PREIMAGE).await;
    let mut client = HttpClient::new(service.url.clone(), 1000)?;

    let withdrawn = client
        .withdraw(WithdrawRequest {
            preimage: "not-the-preimage".to_string(),
            id: "preimage-1".to_string(),
            tx_key: 1,
            chain: Chain::Chain1,
            org_idx: 1,
        })
        .await?;
    assert!(!withdrawn.data);
    Ok(())
}

#[tokio::test]
async fn test_audit_and_verify() -> Result<()> {
    let service = MockService::spawn(PREIMAGE).await;
    let mut client = HttpClient::new(service.url.clone(), 1000)?;

    let audited = client
        .audit(AuditRequest {
            balance: 9_999_999,
            value: 1,
            tx_key: 1,
            chain: Chain::Chain1,
            spender_idx: 0,
            receiver_idx: 1,
        })
        .await?;
    assert_eq!(audited.data, "audit triggered");

    client
        .verify_two(VerifyTwoRequest { tx_key: 1, chain: Chain::Chain1, org_idx: 1, receiver_idx: 1 })
        .await?;
    client
        .verify_two_all(VerifyTwoAllRequest { tx_key: 1, chain: Chain::Chain2, receiver_idx: 0 })
        .await?;
    client.test_invoke(TestInvokeRequest { id: "1".to_string() }).await?;

    assert_eq!(service.received_on(Endpoint::VerifyTwo).len(), 1);
    assert_eq!(service.received_on(Endpoint::VerifyTwoAll).len(), 1);
    assert_eq!(service.received_on(Endpoint::TestInvoke).len(), 1);
    assert_eq!(service.received().len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_verify_routes_are_recorded_by_path() -> Result<()> {
    let service = MockService::spawn(PREIMAGE).await;
    let client = HttpClient::new(service.url.clone(), 1000)?;

    // A body without `org_idx` posted to the per-organization route stays on that route.
    let reply = client
        .post(&VerifyTwoAllRequest { tx_key: 2, chain: Chain::Chain1, receiver_idx: 1 })
        .await?;
    assert_eq!(reply.data, "verified");
    let raw = reqwest::Client::new()
        .post(format!("{}{}", service.url, Endpoint::VerifyTwo.path()))
        .json(&serde_json::json!({ "txKey": "2", "channel_idx": "0", "receiverIdx": "1" }))
        .send()
        .await?;
    assert!(raw.status().is_success());

    assert_eq!(service.received_on(Endpoint::VerifyTwoAll).len(), 1);
    let verified = service.received_on(Endpoint::VerifyTwo);
    assert_eq!(verified.len(), 1);
    assert!(verified[0].get("org_idx").is_none());
    Ok(())
}

#[tokio::test]
async fn test_server_error_maps_to_status() -> Result<()> {
    let service = MockService::spawn(PREIMAGE).await;
    let mut client = HttpClient::new(service.url.clone(), 1000)?;

    let err = client.lock(lock_request(0, LockFlag::Preimage)).await.unwrap_err();
    match &err {
        Error::Status { endpoint, code, body } => {
            assert_eq!(*endpoint, Endpoint::Lock);
            assert_eq!(*code, 500);
            assert!(body.contains("ledger unavailable"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.status_code(), Some(500));
    Ok(())
}

#[tokio::test]
async fn test_missing_data_is_an_error() -> Result<()> {
    let service = MockService::spawn(PREIMAGE).await;
    let mut client = HttpClient::new(service.url.clone(), 1000)?;

    let err = client
        .audit(AuditRequest {
            balance: -1,
            value: 1,
            tx_key: 1,
            chain: Chain::Chain2,
            spender_idx: 1,
            receiver_idx: 0,
        })
        .await
        .unwrap_err();
    match err {
        Error::MissingData { endpoint, msg } => {
            assert_eq!(endpoint, Endpoint::Audit);
            assert_eq!(msg.as_deref(), Some("insufficient balance"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_unreachable_service() -> Result<()> {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let mut client = HttpClient::new(format!("http://{addr}"), 500)?;
    let err = client.test_invoke(TestInvokeRequest { id: "1".to_string() }).await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
    assert_eq!(err.status_code(), None);
    Ok(())
}
