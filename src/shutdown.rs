//! Operator stop requests: SIGINT/SIGTERM on unix, Ctrl+C elsewhere.

use std::future::Future;
use std::pin::Pin;

type StopFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Resolves once the process has been asked to stop.
///
/// Signal handlers are registered when the value is created, so a signal that
/// arrives while startup is still fetching or logging in is not lost.
pub struct Shutdown {
    stop: Option<StopFuture>,
}

impl Shutdown {
    /// Registers the OS signal handlers. Must be called inside the tokio runtime.
    pub fn install() -> Self {
        Self {
            stop: Some(os_signal()),
        }
    }

    /// Stops when `stop` resolves.
    pub fn from_future<F>(stop: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            stop: Some(Box::pin(stop)),
        }
    }

    /// Waits for the stop request. Once seen, later calls return immediately.
    pub async fn recv(&mut self) {
        if let Some(stop) = self.stop.as_mut() {
            stop.await;
            self.stop = None;
        }
    }

    /// Runs `task` to completion unless a stop request comes first.
    ///
    /// Returns `None` when interrupted; `task` is dropped at its current await point.
    pub async fn guard<T, F>(&mut self, task: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            value = task => Some(value),
            _ = self.recv() => None,
        }
    }
}

#[cfg(unix)]
fn os_signal() -> StopFuture {
    use tokio::signal::unix::{signal, SignalKind};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => Box::pin(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        }),
        _ => {
            tracing::warn!("Failed to install unix signal handlers, falling back to Ctrl+C");
            Box::pin(ctrl_c())
        }
    }
}

#[cfg(not(unix))]
fn os_signal() -> StopFuture {
    Box::pin(ctrl_c())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_returns_value_when_task_finishes_first() {
        let mut shutdown = Shutdown::from_future(tokio::time::sleep(Duration::from_secs(10)));

        let value = shutdown.guard(async { 42 }).await;
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn test_guard_interrupts_slow_task() {
        let mut shutdown = Shutdown::from_future(tokio::time::sleep(Duration::from_millis(20)));

        let value = shutdown
            .guard(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                1
            })
            .await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_stop_request_is_remembered() {
        let mut shutdown = Shutdown::from_future(async {});
        shutdown.recv().await;

        // A second wait and a later guard both see the same stop request
        tokio::time::timeout(Duration::from_millis(100), shutdown.recv())
            .await
            .unwrap();
        assert_eq!(shutdown.guard(std::future::pending::<()>()).await, None);
    }
}
