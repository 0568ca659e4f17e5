//! Tasks: one provider bound to one filter chain.
//!
//! `Task::execute` starts the provider and waits for the first of
//! cancellation, a value, or an error:
//! - cancellation returns the context's cause
//! - a value is passed through a fresh [`FilterChainManager`] and the chain's
//!   result is returned
//! - an error is returned as is; filters and handler never run
//!
//! A delivery that closes without a value is not an event. The task keeps
//! waiting and ends with the context's cause once it is cancelled.
//!
//! Only the first value is consumed. A provider cannot send twice through a
//! [`Delivery`], so there is nothing left to drain afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::TaskError;
use crate::task::filter::{Filter, FilterChain, FilterChainManager};
use crate::task::provider::{Delivered, Provider};

/// Terminal step of a chain. Performs the side effect for the final value.
#[async_trait]
pub trait Handler<T: Send + Sync>: Send + Sync {
    async fn execute(&self, ctx: &Context, data: &T) -> Result<(), TaskError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "handler"
    }
}

/// Anything that can be run to completion against a context.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn execute(&self, ctx: &Context) -> Result<(), TaskError>;

    /// Name used in logs and in batch failure reports.
    fn name(&self) -> &str {
        "task"
    }
}

/// One provider plus the filters and handler its value runs through.
pub struct Task<T: Send + Sync> {
    name: String,
    provider: Arc<dyn Provider<T>>,
    filters: Arc<[Arc<dyn Filter<T>>]>,
    handler: Arc<dyn Handler<T>>,
}

impl<T: Send + Sync + 'static> Task<T> {
    /// Bind a provider, a handler and an ordered list of filters.
    pub fn new(
        provider: Arc<dyn Provider<T>>,
        handler: Arc<dyn Handler<T>>,
        filters: Vec<Arc<dyn Filter<T>>>,
    ) -> Self {
        Self {
            name: provider.name().to_string(),
            provider,
            filters: filters.into(),
            handler,
        }
    }

    pub fn builder(provider: Arc<dyn Provider<T>>, handler: Arc<dyn Handler<T>>) -> TaskBuilder<T> {
        TaskBuilder {
            name: None,
            provider,
            filters: Vec::new(),
            handler,
        }
    }

    /// Rename the task for logs and batch failure reports.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Executable for Task<T> {
    async fn execute(&self, ctx: &Context) -> Result<(), TaskError> {
        debug!(task = %self.name, filters = self.filters.len(), "Task started");
        let delivery = self.provider.provide(ctx);

        let delivered = tokio::select! {
            biased;
            cause = ctx.cancelled() => {
                warn!(task = %self.name, %cause, "Task cancelled before delivery");
                return Err(TaskError::Cancelled(cause));
            }
            delivered = delivery => delivered,
        };

        let result = match delivered {
            Delivered::Value(mut value) => {
                let mut chain =
                    FilterChainManager::new(Arc::clone(&self.filters), Arc::clone(&self.handler));
                chain.proceed(ctx, &mut value).await
            }
            Delivered::Failed(error) => {
                warn!(task = %self.name, error = %error, "Provider failed");
                Err(error)
            }
            // Closed without a value: cancellation is the only event left.
            Delivered::Closed => {
                if !ctx.is_cancelled() {
                    debug!(task = %self.name, "Provider closed without delivering, waiting for cancel");
                }
                let cause = ctx.cancelled().await;
                warn!(task = %self.name, %cause, "Task cancelled before delivery");
                Err(TaskError::Cancelled(cause))
            }
        };

        debug!(task = %self.name, ok = result.is_ok(), "Task finished");
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Builds a [`Task`] with filters in the order they are added.
pub struct TaskBuilder<T: Send + Sync> {
    name: Option<String>,
    provider: Arc<dyn Provider<T>>,
    filters: Vec<Arc<dyn Filter<T>>>,
    handler: Arc<dyn Handler<T>>,
}

impl<T: Send + Sync + 'static> TaskBuilder<T> {
    /// Override the task name (defaults to the provider's name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a filter to the chain.
    pub fn filter(mut self, filter: Arc<dyn Filter<T>>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn build(self) -> Task<T> {
        let task = Task::new(self.provider, self.handler, self.filters);
        match self.name {
            Some(name) => task.with_name(name),
            None => task,
        }
    }
}
