use std::sync::Arc;

use chrono::{ DateTime, Utc };
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{ interval, Duration, MissedTickBehavior };

use crate::db::UserRepository;
use crate::services::{ AccrualOutcome, AccrualStream, FarmingService };

#[derive(Debug, Clone)]
pub struct AccrualFailure {
    /// `None` when the scan for active users itself failed.
    pub user_id: Option<i64>,
    pub stream: AccrualStream,
    pub error: String,
    pub retryable: bool,
}

/// Aggregate result of one pass over all active positions.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub processed: usize,
    pub paid: usize,
    pub skipped: usize,
    pub paid_uni: Decimal,
    pub paid_ton: Decimal,
    pub commissions: usize,
    pub commission_failures: usize,
    pub failures: Vec<AccrualFailure>,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            processed: 0,
            paid: 0,
            skipped: 0,
            paid_uni: Decimal::ZERO,
            paid_ton: Decimal::ZERO,
            commissions: 0,
            commission_failures: 0,
            failures: Vec::new(),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record(&mut self, stream: AccrualStream, outcome: AccrualOutcome) {
        match outcome {
            AccrualOutcome::Paid { amount, commissions, commission_failures, .. } => {
                self.paid += 1;
                self.commissions += commissions;
                self.commission_failures += commission_failures;
                match stream {
                    AccrualStream::UniFarming => {
                        self.paid_uni += amount;
                    }
                    AccrualStream::TonBoost => {
                        self.paid_ton += amount;
                    }
                }
            }
            _ => {
                self.skipped += 1;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another pass was still running. Nothing was done.
    Skipped,
}

/// Periodic accrual over every user with an active farming or boost
/// position. Passes never overlap.
pub struct AccrualScheduler {
    users: Arc<UserRepository>,
    farming: Arc<FarmingService>,
    period: Duration,
    pass: Mutex<()>,
}

impl AccrualScheduler {
    pub fn new(users: Arc<UserRepository>, farming: Arc<FarmingService>, period: Duration) -> Self {
        Self {
            users,
            farming,
            period,
            pass: Mutex::new(()),
        }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            // A slow pass drops the ticks it overran instead of bursting
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(period_secs = self.period.as_secs(), "accrual scheduler started");

            loop {
                ticker.tick().await;
                self.run_tick().await;
            }
        })
    }

    pub async fn run_tick(&self) -> TickOutcome {
        self.run_tick_at(Utc::now()).await
    }

    /// One pass with an explicit clock. Per-user errors are collected in the
    /// report and never stop the pass.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let Ok(_guard) = self.pass.try_lock() else {
            tracing::warn!("accrual pass still running, tick skipped");
            return TickOutcome::Skipped;
        };

        let mut report = TickReport::new(now);

        for stream in [AccrualStream::UniFarming, AccrualStream::TonBoost] {
            let scan = match stream {
                AccrualStream::UniFarming => self.users.active_farming_ids().await,
                AccrualStream::TonBoost => self.users.active_boost_ids().await,
            };
            let user_ids = match scan {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::error!(stream = %stream, error = %e, "failed to load active positions");
                    report.failures.push(AccrualFailure {
                        user_id: None,
                        stream,
                        retryable: e.is_retryable(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            for user_id in user_ids {
                report.processed += 1;
                match self.farming.accrue(user_id, stream, now).await {
                    Ok(outcome) => report.record(stream, outcome),
                    Err(e) => {
                        tracing::error!(user_id, stream = %stream, error = %e, "accrual failed");
                        report.failures.push(AccrualFailure {
                            user_id: Some(user_id),
                            stream,
                            retryable: e.is_retryable(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            paid = report.paid,
            skipped = report.skipped,
            failed = report.failed(),
            paid_uni = %report.paid_uni,
            paid_ton = %report.paid_ton,
            commissions = report.commissions,
            "accrual pass finished"
        );

        TickOutcome::Completed(report)
    }
}
