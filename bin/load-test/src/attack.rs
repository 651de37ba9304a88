//! Goose attack draining a [`WorkQueue`] of test records

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, ensure};
use goose::{
    config::{GooseConfiguration, GooseDefaultType},
    goose::TransactionFunction,
    metrics::GooseMetrics,
    prelude::{GooseAttack, GooseDefault, GooseUser, Scenario, Transaction, TransactionResult},
};
use htlc_bench_client::metrics::Metrics;
use tracing::{debug, info, warn};

use crate::{
    records::{TestRecord, WorkQueue},
    tasks::{Workload, pace, past, run_record},
    user::HtlcUser,
};

/// How virtual users are scheduled
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Service base URL
    pub host: String,
    /// Number of concurrent users
    pub workers: usize,
    /// Records started per second per user
    pub rate: Option<f64>,
    /// Stop picking up new records after this long
    pub run_time: Option<Duration>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl StressConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.workers > 0, "at least one worker is required");
        self.period()?;
        Ok(())
    }

    /// Minimum duration of one record, from `rate`
    pub fn period(&self) -> Result<Option<Duration>> {
        let Some(rate) = self.rate else {
            return Ok(None);
        };
        ensure!(rate.is_finite() && rate > 0.0, "rate must be positive, got {rate}");
        let period = Duration::try_from_secs_f64(1.0 / rate)
            .with_context(|| format!("rate {rate} is too low"))?;
        Ok(Some(period))
    }

    /// Instant after which no record is started
    ///
    /// A run time too long to be represented means the run is not limited.
    pub fn deadline(&self, start: Instant) -> Option<Instant> {
        let run_time = self.run_time?;
        let deadline = start.checked_add(run_time);
        if deadline.is_none() {
            warn!(run_time = run_time.as_secs(), "Run time out of range, running until data runs out");
        }
        deadline
    }

    /// Run time in whole seconds as goose takes it, `0` meaning unlimited
    fn goose_run_time(&self, deadline: Option<Instant>) -> usize {
        match (self.run_time, deadline) {
            (Some(run_time), Some(_)) => {
                usize::try_from(run_time.as_secs().max(1)).unwrap_or(0)
            },
            _ => 0,
        }
    }
}

/// State shared by every user of an attack
struct LoadTest {
    queue: WorkQueue,
    workload: Workload,
    metrics: Metrics,
    period: Option<Duration>,
    deadline: Option<Instant>,
}

impl LoadTest {
    /// Pick the next record and run it
    ///
    /// Audits wait for all swaps of the queue to complete first.
    async fn run_next(&self, user: &mut GooseUser) -> TransactionResult {
        if past(self.deadline) {
            return Ok(());
        }
        let Some(record) = self.queue.pop() else {
            debug!(user = user.weighted_users_index, "Data ran out");
            return Ok(());
        };

        let start = Instant::now();
        debug!(
            user = user.weighted_users_index,
            tx_key = record.tx_key(),
            remaining = self.queue.len(),
            "Picked record"
        );

        let is_swap = matches!(record, TestRecord::Htlc { .. });
        if matches!(record, TestRecord::Audit { .. }) {
            self.queue.swaps_finished().await;
        }

        let mut service = HtlcUser::new(user, &self.metrics);
        run_record(&mut service, &self.workload, record, self.deadline).await;
        if is_swap {
            self.queue.finish_swap();
        }

        pace(start, self.period).await;
        Ok(())
    }
}

/// Drain `records` with `config.workers` goose users, returning goose's metrics
///
/// Every user runs enough iterations for the users together to pop each record once; users
/// finding the queue drained return right away.
pub async fn run(config: &StressConfig, workload: Workload, records: Vec<TestRecord>) -> Result<GooseMetrics> {
    config.validate()?;
    ensure!(!records.is_empty(), "no records to run");

    let users = config.workers.min(records.len());
    let iterations = records.len().div_ceil(users);
    let deadline = config.deadline(Instant::now());
    info!(records = records.len(), users, iterations, "Starting attack");

    let load = Arc::new(LoadTest {
        queue: WorkQueue::new(records),
        workload,
        metrics: Metrics::default(),
        period: config.period()?,
        deadline,
    });
    let shared = Arc::clone(&load);
    let run_next: TransactionFunction = Arc::new(move |user| {
        let load = Arc::clone(&load);
        Box::pin(async move { load.run_next(user).await })
    });

    let hatch_rate = users.to_string();
    let timeout = config.timeout.as_secs_f64().to_string();
    let metrics = GooseAttack::initialize_with_config(GooseConfiguration::default())?
        .register_scenario(
            Scenario::new("HtlcUser")
                .register_transaction(Transaction::new(run_next).set_name("Run next record")),
        )
        .set_default(GooseDefault::Host, config.host.as_str())?
        .set_default(GooseDefault::Users, users)?
        .set_default(GooseDefault::HatchRate, hatch_rate.as_str())?
        .set_default(GooseDefault::Iterations, iterations)?
        .set_default(GooseDefault::RunTime, config.goose_run_time(deadline))?
        .set_default(GooseDefault::Timeout, timeout.as_str())?
        .set_default(GooseDefault::NoResetMetrics, true)?
        .set_default(GooseDefault::NoTelnet, true)?
        .set_default(GooseDefault::NoWebSocket, true)?
        .execute()
        .await?;

    if !shared.queue.is_empty() {
        info!(remaining = shared.queue.len(), "Attack ended with unprocessed records");
    }
    Ok(metrics)
}
