//! Scoped background tasks
//!
//! A [`ScopedTask`] is cancelled when its owner calls [`ScopedTask::stop`] or
//! drops it, so a background job never outlives the scope that started it.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ScopedTask {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScopedTask {
    /// Spawn `job` with a token that is cancelled when the scope ends
    pub fn spawn<F, Fut>(name: &'static str, job: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(job(token.clone()));
        debug!("Started scoped task {}", name);
        Self {
            name,
            token,
            handle: Some(handle),
        }
    }

    /// Cancel the task and wait for it to wind down
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    debug!("Scoped task {} failed: {}", self.name, e);
                }
            }
        }
        debug!("Stopped scoped task {}", self.name);
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
