use std::future::Future;

use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

use crate::errors::Failure;

/// Task spawned for one request.
///
/// Dropping the handle before the task finishes aborts it, so request work
/// never outlives the request future axum is driving.
pub(crate) struct ScopedTask<T> {
    handle: JoinHandle<T>,
    joined: bool,
}

impl<T: Send + 'static> ScopedTask<T> {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
            joined: false,
        }
    }

    pub(crate) async fn join(mut self) -> Result<T, JoinError> {
        let result = (&mut self.handle).await;
        self.joined = true;
        result
    }
}

impl<T> Drop for ScopedTask<T> {
    fn drop(&mut self) {
        if !self.joined && !self.handle.is_finished() {
            debug!("Request dropped before handler finished, aborting task");
            self.handle.abort();
        }
    }
}

/// Run `work` on its own task and fold every way it can go wrong into a
/// [`Failure`]: returned errors, panics and cancellation.
pub(crate) async fn dispatch<T, F>(work: F) -> Result<T, Failure>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    match ScopedTask::spawn(work).join().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Failure::from_error(error)),
        Err(join_error) if join_error.is_panic() => Err(Failure::from_panic(join_error.into_panic())),
        Err(join_error) => Err(Failure::from_error(anyhow::anyhow!(
            "handler task cancelled: {}",
            join_error
        ))),
    }
}
