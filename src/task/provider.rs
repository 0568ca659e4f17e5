//! Providers and their single-use delivery handle.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use tokio::sync::oneshot;

use crate::context::Context;
use crate::error::TaskError;

/// Produces one value asynchronously.
///
/// Implementations must do their work off the caller's path (usually by
/// spawning onto the runtime, see [`Delivery::spawn`]) and report the
/// outcome only through the returned [`Delivery`]. They should watch `ctx`
/// and abandon in-flight work once it is cancelled.
pub trait Provider<T>: Send + Sync {
    fn provide(&self, ctx: &Context) -> Delivery<T>;

    /// Name used in logs and error reports.
    fn name(&self) -> &str {
        "provider"
    }
}

/// Outcome observed on a [`Delivery`].
#[derive(Debug)]
pub enum Delivered<T> {
    /// The provider produced a value.
    Value(T),
    /// The provider failed.
    Failed(TaskError),
    /// The provider finished without delivering anything.
    Closed,
}

/// Receiving half of a provider's output.
///
/// Resolves at most once. A provider that drops its [`Resolver`] without
/// resolving is observed as [`Delivered::Closed`].
#[derive(Debug)]
pub struct Delivery<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

/// Sending half of a provider's output. Consumed by the single resolution.
#[derive(Debug)]
pub struct Resolver<T> {
    tx: oneshot::Sender<Result<T, TaskError>>,
}

impl<T> Delivery<T> {
    /// Create a connected resolver/delivery pair.
    pub fn channel() -> (Resolver<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Resolver { tx }, Self { rx })
    }

    /// A delivery that is already resolved with `value`.
    pub fn ready(value: T) -> Self {
        let (resolver, delivery) = Self::channel();
        resolver.resolve(Ok(value));
        delivery
    }

    /// A delivery that has already failed with `error`.
    pub fn failed(error: TaskError) -> Self {
        let (resolver, delivery) = Self::channel();
        resolver.resolve(Err(error));
        delivery
    }
}

impl<T: Send + 'static> Delivery<T> {
    /// Run `work` on the runtime and deliver its result.
    ///
    /// When `ctx` is cancelled first, the work is dropped and the delivery
    /// closes without a value.
    pub fn spawn<F>(ctx: &Context, work: F) -> Self
    where
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let (resolver, delivery) = Self::channel();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                cause = ctx.cancelled() => {
                    tracing::debug!(%cause, "Provider work abandoned");
                }
                result = work => {
                    if !resolver.resolve(result) {
                        tracing::debug!("Provider result dropped, nobody is waiting");
                    }
                }
            }
        });
        delivery
    }
}

impl<T> Resolver<T> {
    /// Deliver the outcome. Returns `false` if nobody is waiting anymore.
    pub fn resolve(self, result: Result<T, TaskError>) -> bool {
        self.tx.send(result).is_ok()
    }
}

impl<T> Future for Delivery<T> {
    type Output = Delivered<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(Ok(value)) => Delivered::Value(value),
            Ok(Err(error)) => Delivered::Failed(error),
            Err(_) => Delivered::Closed,
        })
    }
}
