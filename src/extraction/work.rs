//! Unit of Work
//!
//! The operation the executor gates. Anything that takes arguments and
//! asynchronously yields a payload or an error qualifies; async closures
//! get an implementation for free.

use async_trait::async_trait;
use std::future::Future;

/// An opaque, fallible, possibly slow operation
#[async_trait]
pub trait UnitOfWork<A, T>: Send + Sync
where
    A: Send + 'static,
    T: Send + 'static,
{
    /// Perform one attempt
    async fn perform(&self, args: A) -> anyhow::Result<T>;
}

#[async_trait]
impl<A, T, F, Fut> UnitOfWork<A, T> for F
where
    A: Send + 'static,
    T: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    async fn perform(&self, args: A) -> anyhow::Result<T> {
        (self)(args).await
    }
}
