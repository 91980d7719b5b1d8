//! Units of scheduled work and the advice that wraps them.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use conduit_core::MessagingResult;

/// A unit of work the scheduler can run repeatedly.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn run(&self) -> MessagingResult<()>;
}

/// Adapts an async closure into a [`Runnable`].
pub struct FnRunnable<F> {
    f: F,
}

impl<F, Fut> FnRunnable<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = MessagingResult<()>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Runnable for FnRunnable<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = MessagingResult<()>> + Send,
{
    async fn run(&self) -> MessagingResult<()> {
        (self.f)().await
    }
}

/// Wraps a unit of work in another one (interceptor, retry, timing...).
///
/// Closures of shape `Fn(Arc<dyn Runnable>) -> Arc<dyn Runnable>` are advice.
pub trait Advice: Send + Sync {
    fn wrap(&self, work: Arc<dyn Runnable>) -> Arc<dyn Runnable>;
}

impl<F> Advice for F
where
    F: Fn(Arc<dyn Runnable>) -> Arc<dyn Runnable> + Send + Sync,
{
    fn wrap(&self, work: Arc<dyn Runnable>) -> Arc<dyn Runnable> {
        self(work)
    }
}

/// Apply an advice chain. The first advice becomes the outermost wrapper.
pub fn apply_advice(work: Arc<dyn Runnable>, chain: &[Arc<dyn Advice>]) -> Arc<dyn Runnable> {
    chain
        .iter()
        .rev()
        .fold(work, |inner, advice| advice.wrap(inner))
}
