//! Cron-driven runs of an executable.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::context::Context;
use crate::task::Executable;

/// Runs `job` on every fire of `schedule` until the root context is cancelled.
///
/// Each fire is followed by a random extra wait of 1..=`delay_range` units
/// (minutes by default) so runs do not hit upstream services on the dot.
pub struct CronJob {
    schedule: cron::Schedule,
    delay_range: u64,
    delay_unit: Duration,
    run_timeout: Duration,
    job: Arc<dyn Executable>,
}

impl CronJob {
    pub fn new(config: &SchedulerConfig, job: Arc<dyn Executable>) -> Self {
        Self {
            schedule: config.schedule.clone(),
            delay_range: config.delay_range_minutes,
            delay_unit: Duration::from_secs(60),
            run_timeout: config.run_timeout,
            job,
        }
    }

    /// Change the unit of the random delay.
    pub fn with_delay_unit(mut self, unit: Duration) -> Self {
        self.delay_unit = unit;
        self
    }

    fn random_delay(&self) -> Duration {
        if self.delay_range == 0 {
            return Duration::ZERO;
        }
        let units = rand::thread_rng().gen_range(1..=self.delay_range);
        self.delay_unit.saturating_mul(units.min(u32::MAX as u64) as u32)
    }

    fn until_next_fire(&self) -> Option<Duration> {
        let next = self.schedule.upcoming(Utc).next()?;
        Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Start the loop on the runtime.
    pub fn spawn(self, root: Context) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(root).await })
    }

    async fn run(self, root: Context) {
        let name = self.job.name().to_string();
        info!(job = %name, "Cron job started");

        loop {
            let Some(wait) = self.until_next_fire() else {
                warn!(job = %name, "Schedule has no upcoming fire time");
                return;
            };
            if !sleep_unless_cancelled(&root, wait).await {
                break;
            }

            let delay = self.random_delay();
            if !delay.is_zero() {
                info!(job = %name, delay_secs = delay.as_secs(), "Delaying scheduled run");
                if !sleep_unless_cancelled(&root, delay).await {
                    break;
                }
            }

            let run_ctx = root.with_timeout(self.run_timeout);
            let run_id = Uuid::new_v4();
            info!(job = %name, %run_id, "Scheduled run started");
            match self.job.execute(&run_ctx).await {
                Ok(()) => info!(job = %name, %run_id, "Scheduled run finished"),
                Err(e) => error!(job = %name, %run_id, error = %e, "Scheduled run failed"),
            }
        }

        info!(job = %name, cause = ?root.cause(), "Cron job stopped");
    }
}

/// Sleep for `duration`. Returns `false` if `ctx` was cancelled first.
async fn sleep_unless_cancelled(ctx: &Context, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::error::{CancelCause, TaskError};

    fn config(schedule: &str, delay_range_minutes: u64, run_timeout: Duration) -> SchedulerConfig {
        SchedulerConfig {
            schedule: cron::Schedule::from_str(schedule).unwrap(),
            delay_range_minutes,
            run_timeout,
            pool_size: 1,
        }
    }

    fn shutdown() -> CancelCause {
        CancelCause::Shutdown {
            signal: "SIGTERM".into(),
        }
    }

    #[derive(Default)]
    struct Counter {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Executable for Counter {
        async fn execute(&self, _ctx: &Context) -> Result<(), TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Err(TaskError::provider("counter", "upstream down"))
        }
    }

    #[derive(Default)]
    struct Overrun {
        causes: Mutex<Vec<CancelCause>>,
    }

    #[async_trait]
    impl Executable for Overrun {
        async fn execute(&self, ctx: &Context) -> Result<(), TaskError> {
            let cause = ctx.cancelled().await;
            self.causes.lock().await.push(cause.clone());
            Err(TaskError::Cancelled(cause))
        }
    }

    #[tokio::test]
    async fn fires_repeatedly_and_survives_failures() {
        let counter = Arc::new(Counter::default());
        let root = Context::new();
        let handle = CronJob::new(&config("* * * * * *", 0, Duration::from_secs(5)), counter.clone())
            .spawn(root.clone());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        root.cancel(shutdown());
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cron job should stop after cancel")
            .unwrap();

        assert!(counter.runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn cancel_while_waiting_stops_promptly() {
        let counter = Arc::new(Counter::default());
        let root = Context::new();
        let handle = CronJob::new(&config("0 0 0 1 1 *", 0, Duration::from_secs(5)), counter.clone())
            .spawn(root.clone());

        root.cancel(shutdown());
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cron job should stop after cancel")
            .unwrap();
        assert_eq!(counter.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn runs_are_bounded_by_the_run_timeout() {
        let overrun = Arc::new(Overrun::default());
        let root = Context::new();
        let handle = CronJob::new(
            &config("* * * * * *", 0, Duration::from_millis(50)),
            overrun.clone(),
        )
        .spawn(root.clone());

        let first = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                if let Some(cause) = overrun.causes.lock().await.first().cloned() {
                    return cause;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("a scheduled run should have timed out");
        root.cancel(shutdown());
        handle.await.unwrap();

        assert_eq!(
            first,
            CancelCause::DeadlineExceeded {
                after: Duration::from_millis(50)
            }
        );
    }

    #[test]
    fn random_delay_stays_in_range() {
        let job = CronJob::new(&config("* * * * * *", 3, Duration::from_secs(1)), Arc::new(Counter::default()))
            .with_delay_unit(Duration::from_millis(10));
        for _ in 0..100 {
            let delay = job.random_delay();
            assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(30));
        }

        let none = CronJob::new(&config("* * * * * *", 0, Duration::from_secs(1)), Arc::new(Counter::default()));
        assert_eq!(none.random_delay(), Duration::ZERO);
    }
}
