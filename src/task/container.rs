//! Bounded fan-out over independent executables.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::context::Context;
use crate::error::{AggregateError, TaskError, UnitFailure};
use crate::task::pipeline::Executable;

/// Default number of executables allowed to run at once.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Runs a batch of executables with at most `pool_size` running at once.
///
/// Every unit runs to completion regardless of sibling failures. Failures are
/// collected into one [`AggregateError`] that keeps each unit's own error.
pub struct ExecutableContainer {
    name: String,
    tasks: Vec<Arc<dyn Executable>>,
    pool_size: usize,
}

impl ExecutableContainer {
    pub fn new(tasks: Vec<Arc<dyn Executable>>) -> Self {
        Self {
            name: "container".to_string(),
            tasks,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Set the concurrency limit. Zero is treated as one.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl Executable for ExecutableContainer {
    async fn execute(&self, ctx: &Context) -> Result<(), TaskError> {
        let total = self.tasks.len();
        info!(
            container = %self.name,
            total,
            pool_size = self.pool_size,
            "Executing task batch"
        );

        let slots = Arc::new(Semaphore::new(self.pool_size));
        let mut running = JoinSet::new();
        let mut units = HashMap::with_capacity(total);
        let mut failures = Vec::new();

        for (index, task) in self.tasks.iter().enumerate() {
            // Waits here while the pool is full, like a blocking submit.
            let permit = match Arc::clone(&slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(container = %self.name, "Task pool closed: {}", e);
                    break;
                }
            };

            let task = Arc::clone(task);
            let name = task.name().to_string();
            let ctx = ctx.clone();
            let handle = running.spawn(async move {
                let _permit = permit;
                task.execute(&ctx).await
            });
            units.insert(handle.id(), (index, name));
        }

        while let Some(joined) = running.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(join_error) => {
                    let id = join_error.id();
                    let name = units.get(&id).map_or("unknown", |(_, name)| name.as_str());
                    error!(container = %self.name, task = %name, "Task panicked: {}", join_error);
                    let reason = join_error.to_string();
                    (
                        id,
                        Err(TaskError::Panicked {
                            name: name.to_string(),
                            reason,
                        }),
                    )
                }
            };

            let Some((index, name)) = units.remove(&id) else {
                continue;
            };
            if let Err(error) = result {
                debug!(container = %self.name, index, task = %name, %error, "Task failed");
                failures.push(UnitFailure { index, name, error });
            }
        }

        info!(
            container = %self.name,
            total,
            failed = failures.len(),
            "Task batch finished"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TaskError::Aggregate(AggregateError::new(failures)))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::CancelCause;

    struct Sleepy {
        name: String,
        delay: Duration,
        outcome: Result<(), TaskError>,
        finished: Arc<AtomicUsize>,
    }

    impl Sleepy {
        fn new(name: &str, outcome: Result<(), TaskError>, finished: &Arc<AtomicUsize>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                delay: Duration::from_millis(5),
                outcome,
                finished: Arc::clone(finished),
            })
        }
    }

    #[async_trait]
    impl Executable for Sleepy {
        async fn execute(&self, _ctx: &Context) -> Result<(), TaskError> {
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct Panics;

    #[async_trait]
    impl Executable for Panics {
        async fn execute(&self, _ctx: &Context) -> Result<(), TaskError> {
            panic!("unit exploded");
        }

        fn name(&self) -> &str {
            "panics"
        }
    }

    struct WaitForCancel;

    #[async_trait]
    impl Executable for WaitForCancel {
        async fn execute(&self, ctx: &Context) -> Result<(), TaskError> {
            Err(TaskError::Cancelled(ctx.cancelled().await))
        }
    }

    #[tokio::test]
    async fn empty_batch_succeeds() {
        let container = ExecutableContainer::new(Vec::new());
        assert!(container.is_empty());
        container.execute(&Context::new()).await.unwrap();
    }

    #[tokio::test]
    async fn pool_size_zero_is_clamped() {
        let container = ExecutableContainer::new(Vec::new()).with_pool_size(0);
        assert_eq!(container.pool_size(), 1);
        assert_eq!(
            ExecutableContainer::new(Vec::new()).pool_size(),
            DEFAULT_POOL_SIZE
        );
    }

    #[tokio::test]
    async fn failures_do_not_stop_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Arc<dyn Executable>> = vec![
            Sleepy::new("first", Err(TaskError::provider("first", "down")), &finished),
            Sleepy::new("second", Ok(()), &finished),
            Sleepy::new("third", Err(TaskError::handler("third", "smtp")), &finished),
            Sleepy::new("fourth", Ok(()), &finished),
        ];
        let container = ExecutableContainer::new(tasks).with_pool_size(1);

        let err = container.execute(&Context::new()).await.unwrap_err();
        assert_eq!(finished.load(Ordering::SeqCst), 4);

        let TaskError::Aggregate(aggregate) = err else {
            panic!("expected aggregate error, got {err:?}");
        };
        let failed: Vec<(usize, &str)> = aggregate
            .failures()
            .iter()
            .map(|f| (f.index, f.name.as_str()))
            .collect();
        assert_eq!(failed, vec![(0, "first"), (2, "third")]);
        assert_eq!(
            aggregate.failures()[1].error,
            TaskError::handler("third", "smtp")
        );
    }

    #[tokio::test]
    async fn panicking_unit_is_reported_with_its_identity() {
        let finished = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Arc<dyn Executable>> =
            vec![Sleepy::new("ok", Ok(()), &finished), Arc::new(Panics)];
        let err = ExecutableContainer::new(tasks)
            .execute(&Context::new())
            .await
            .unwrap_err();

        let TaskError::Aggregate(aggregate) = err else {
            panic!("expected aggregate error");
        };
        assert_eq!(aggregate.len(), 1);
        let failure = &aggregate.failures()[0];
        assert_eq!(failure.index, 1);
        assert_eq!(failure.name, "panics");
        assert!(matches!(failure.error, TaskError::Panicked { .. }));
    }

    #[tokio::test]
    async fn shared_cancellation_reaches_every_unit() {
        let tasks: Vec<Arc<dyn Executable>> = vec![Arc::new(WaitForCancel), Arc::new(WaitForCancel)];
        let container = ExecutableContainer::new(tasks).with_pool_size(2);
        let ctx = Context::new();
        let cause = CancelCause::Shutdown {
            signal: "SIGINT".into(),
        };

        let canceller = {
            let ctx = ctx.clone();
            let cause = cause.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ctx.cancel(cause);
            })
        };

        let err = container.execute(&ctx).await.unwrap_err();
        canceller.await.unwrap();

        let TaskError::Aggregate(aggregate) = err else {
            panic!("expected aggregate error");
        };
        assert_eq!(aggregate.len(), 2);
        assert!(aggregate.errors().all(|e| e.cancel_cause() == Some(&cause)));
    }

    #[tokio::test]
    async fn containers_nest() {
        let finished = Arc::new(AtomicUsize::new(0));
        let inner: Arc<dyn Executable> = Arc::new(
            ExecutableContainer::new(vec![
                Sleepy::new("a", Ok(()), &finished),
                Sleepy::new("b", Err(TaskError::provider("b", "empty page")), &finished),
            ])
            .with_name("inner"),
        );
        let outer = ExecutableContainer::new(vec![inner, Sleepy::new("c", Ok(()), &finished)]);

        let err = outer.execute(&Context::new()).await.unwrap_err();
        assert_eq!(finished.load(Ordering::SeqCst), 3);

        let TaskError::Aggregate(outer_agg) = err else {
            panic!("expected aggregate error");
        };
        assert_eq!(outer_agg.failures()[0].name, "inner");
        let TaskError::Aggregate(ref inner_agg) = outer_agg.failures()[0].error else {
            panic!("expected nested aggregate");
        };
        assert_eq!(inner_agg.failures()[0].error, TaskError::provider("b", "empty page"));
    }
}
