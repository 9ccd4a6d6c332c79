//! Runs work through a shared constraint.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::{Constraint, RateLimitError};

/// Queues operations behind a [`Constraint`].
///
/// Clones share the constraint and therefore the budget. Use
/// [`Dispatcher::isolated`] for a separate budget.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    constraint: Constraint,
}

impl Dispatcher {
    pub fn new(constraint: Constraint) -> Self {
        Self { constraint }
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// A dispatcher with the same constraint shape and none of its history.
    pub fn isolated(&self) -> Self {
        Self {
            constraint: self.constraint.fresh(),
        }
    }

    /// Wait for the constraint, then run `operation`.
    ///
    /// The permit is held for the duration of the operation and released on
    /// every exit path, including the operation failing or this future being
    /// dropped. Errors from the operation pass through untouched.
    pub async fn enqueue<F, T, E>(
        &self,
        operation: F,
        cancel: &CancellationToken,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<RateLimitError>,
    {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled.into());
        }

        let _permit = self.constraint.acquire(cancel).await?;
        operation.await
    }
}
