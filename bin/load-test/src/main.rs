//! Load Testing Tool for the HTLC cross-chain transaction service

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use htlc_bench_client::{
    logging::{TracingConfig, setup_tracing},
    types::hash_lock,
};
use tracing::{info, warn};

pub mod attack;
pub mod records;
pub mod tasks;
pub mod user;

use attack::StressConfig;
use records::{INITIAL_BALANCE, Ledger, PREIMAGE, TX_NUM, TestRecord, audit_record, htlc_records};
use tasks::Workload;

#[derive(Parser)]
#[command(name = "htlc-bench-load-test")]
#[command(about = "Load testing tool for the HTLC cross-chain transaction service")]
struct Args {
    /// Service base URL
    #[arg(long, env = "HTLC_HOST", default_value = "http://10.200.5.122:9192")]
    host: String,

    /// Number of concurrent goose users
    #[arg(long, default_value = "10")]
    workers: usize,

    /// Number of cross-chain transactions
    #[arg(long, default_value_t = TX_NUM)]
    tx_num: u64,

    /// Amount transferred on chain 1 in every transaction
    #[arg(long, default_value = "1")]
    value1: u64,

    /// Amount transferred on chain 2 in every transaction
    #[arg(long, default_value = "1")]
    value2: u64,

    /// Number of organizations; must match the service's setup
    #[arg(long, default_value = "2")]
    org_num: usize,

    /// Initial balance of every organization; must match the service's setup
    #[arg(long, default_value_t = INITIAL_BALANCE)]
    initial_balance: i64,

    /// HTLC secret revealed on withdrawal
    #[arg(long, env = "HTLC_PREIMAGE", default_value = PREIMAGE)]
    preimage: String,

    /// Hash lock; defaults to the SHA-256 of the preimage
    #[arg(long)]
    hash_lock: Option<String>,

    /// Stop after this many seconds
    #[arg(long)]
    run_time: Option<u64>,

    /// Records started per second per user
    #[arg(long)]
    rate: Option<f64>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Test scenario to run
    #[command(subcommand)]
    scenario: Scenario,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Subcommand)]
enum Scenario {
    /// Every cross-chain swap, then audit all of them
    Full,
    /// Cross-chain swaps only
    Swap,
    /// Audit previously executed swaps
    Audit,
    /// Verify previously audited swaps as every organization
    VerifyAll,
    /// Smoke-test endpoint only
    Ping,
}

impl Scenario {
    /// Records to drain, in queue order
    fn records(self, tx_num: u64) -> Vec<TestRecord> {
        match self {
            Scenario::Full => {
                let mut records = htlc_records(tx_num);
                records.push(audit_record(tx_num));
                records
            },
            Scenario::Swap => htlc_records(tx_num),
            Scenario::Audit => vec![audit_record(tx_num)],
            Scenario::VerifyAll => (1..=tx_num).map(|tx_key| TestRecord::VerifyAll { tx_key }).collect(),
            Scenario::Ping => (1..=tx_num).map(|tx_key| TestRecord::Ping { tx_key }).collect(),
        }
    }
}

impl Args {
    fn workload(&self) -> Result<Workload> {
        let expected = hash_lock(&self.preimage);
        let hash_lock = match &self.hash_lock {
            Some(given) => {
                if !given.eq_ignore_ascii_case(&expected) {
                    warn!(
                        given = %given,
                        expected = %expected,
                        "Hash lock does not match the preimage, withdrawals will be refused"
                    );
                }
                given.clone()
            },
            None => expected,
        };

        Ok(Workload {
            tx_num: self.tx_num,
            value1: self.value1,
            value2: self.value2,
            preimage: self.preimage.clone(),
            hash_lock,
            ledger: Ledger::new(self.org_num, self.initial_balance)?,
        })
    }

    fn stress_config(&self) -> StressConfig {
        StressConfig {
            host: self.host.clone(),
            workers: self.workers,
            rate: self.rate,
            run_time: self.run_time.map(Duration::from_secs),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing(TracingConfig::from_env("htlc-bench-load-test"))?;

    let workload = args.workload()?;
    let config = args.stress_config();

    info!(
        host = %config.host,
        scenario = ?args.scenario,
        workers = config.workers,
        tx_num = workload.tx_num,
        orgs = workload.ledger.org_num(),
        "Starting load test"
    );

    // Goose prints its request, transaction and error tables once the attack is over.
    attack::run(&config, workload, args.scenario.records(args.tx_num)).await?;
    info!(scenario = ?args.scenario, "Load test finished");

    Ok(())
}
