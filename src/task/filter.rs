//! Intercepting filters and the chain that drives them.
//!
//! Modeled on the intercepting-filter pattern: each filter may inspect or
//! replace the in-flight value, then either hand it on with
//! [`FilterChain::proceed`], return `Ok(())` to silently stop the chain, or
//! return an error to abort it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::TaskError;
use crate::task::pipeline::Handler;

/// One step of a filter chain.
#[async_trait]
pub trait Filter<T: Send + Sync>: Send + Sync {
    async fn do_filter(
        &self,
        ctx: &Context,
        data: &mut T,
        chain: &mut (dyn FilterChain<T> + Send),
    ) -> Result<(), TaskError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "filter"
    }
}

/// The view of the chain a filter gets: it can only move forward.
#[async_trait]
pub trait FilterChain<T: Send + Sync> {
    async fn proceed(&mut self, ctx: &Context, data: &mut T) -> Result<(), TaskError>;
}

/// Drives one run of a filter chain and ends it at the handler.
///
/// The cursor only moves forward. A manager serves a single run; build a new
/// one for every value.
pub struct FilterChainManager<T: Send + Sync> {
    filters: Arc<[Arc<dyn Filter<T>>]>,
    handler: Arc<dyn Handler<T>>,
    index: usize,
    handled: bool,
}

impl<T: Send + Sync> FilterChainManager<T> {
    pub fn new(filters: Arc<[Arc<dyn Filter<T>>]>, handler: Arc<dyn Handler<T>>) -> Self {
        Self {
            filters,
            handler,
            index: 0,
            handled: false,
        }
    }

    /// Number of filters that have been entered so far.
    pub fn visited(&self) -> usize {
        self.index
    }

    fn next_filter(&mut self) -> Option<Arc<dyn Filter<T>>> {
        let filter = self.filters.get(self.index).cloned()?;
        self.index += 1;
        Some(filter)
    }
}

#[async_trait]
impl<T: Send + Sync> FilterChain<T> for FilterChainManager<T> {
    async fn proceed(&mut self, ctx: &Context, data: &mut T) -> Result<(), TaskError> {
        if let Some(filter) = self.next_filter() {
            tracing::trace!(filter = filter.name(), position = self.index, "Entering filter");
            return filter.do_filter(ctx, data, self).await;
        }

        if self.handled {
            tracing::warn!(handler = self.handler.name(), "Chain already reached its handler");
            return Ok(());
        }
        self.handled = true;
        tracing::trace!(handler = self.handler.name(), "Chain reached handler");
        self.handler.execute(ctx, data).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records its label, bumps the value, then proceeds.
    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Filter<i32> for Recording {
        async fn do_filter(
            &self,
            ctx: &Context,
            data: &mut i32,
            chain: &mut (dyn FilterChain<i32> + Send),
        ) -> Result<(), TaskError> {
            self.log.lock().unwrap().push(self.label);
            *data += 1;
            chain.proceed(ctx, data).await
        }
    }

    /// Calls proceed twice; the handler must still run once.
    struct Greedy;

    #[async_trait]
    impl Filter<i32> for Greedy {
        async fn do_filter(
            &self,
            ctx: &Context,
            data: &mut i32,
            chain: &mut (dyn FilterChain<i32> + Send),
        ) -> Result<(), TaskError> {
            chain.proceed(ctx, data).await?;
            chain.proceed(ctx, data).await
        }
    }

    struct Collect {
        seen: Arc<Mutex<Vec<i32>>>,
    }

    #[async_trait]
    impl Handler<i32> for Collect {
        async fn execute(&self, _ctx: &Context, data: &i32) -> Result<(), TaskError> {
            self.seen.lock().unwrap().push(*data);
            Ok(())
        }
    }

    #[tokio::test]
    async fn filters_run_in_order_then_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let filters: Vec<Arc<dyn Filter<i32>>> = ["a", "b", "c"]
            .into_iter()
            .map(|label| {
                Arc::new(Recording {
                    label,
                    log: Arc::clone(&log),
                }) as Arc<dyn Filter<i32>>
            })
            .collect();

        let mut chain = FilterChainManager::new(
            filters.into(),
            Arc::new(Collect {
                seen: Arc::clone(&seen),
            }),
        );
        let mut value = 0;
        chain.proceed(&Context::new(), &mut value).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(*seen.lock().unwrap(), vec![3]);
        assert_eq!(chain.visited(), 3);
    }

    #[tokio::test]
    async fn empty_chain_goes_straight_to_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChainManager::new(
            Vec::<Arc<dyn Filter<i32>>>::new().into(),
            Arc::new(Collect {
                seen: Arc::clone(&seen),
            }),
        );
        let mut value = 41;
        chain.proceed(&Context::new(), &mut value).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![41]);
    }

    #[tokio::test]
    async fn repeated_proceed_runs_handler_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChainManager::new(
            vec![Arc::new(Greedy) as Arc<dyn Filter<i32>>].into(),
            Arc::new(Collect {
                seen: Arc::clone(&seen),
            }),
        );
        let mut value = 1;
        chain.proceed(&Context::new(), &mut value).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
