// src/server/shutdown.rs
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting new connections.
    Running,
    /// Listener closed; in-flight sessions finishing on their own.
    Draining,
    /// Every session has returned.
    Stopped,
}

/// Coordinates the Running -> Draining -> Stopped lifecycle.
///
/// Draining never cancels sessions. They end through their own EOF, error
/// or idle timeout, and `wait_drained` simply waits for all of them.
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state,
            sessions: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Begin draining. Calling it again, or after Stopped, does nothing.
    pub fn trigger(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        });

        if changed {
            self.sessions.close();
            info!(
                in_flight = self.sessions.len(),
                "Shutdown triggered, draining connections"
            );
        }
    }

    /// Resolves once the coordinator has left Running.
    pub async fn draining(&self) {
        let mut state = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = state.wait_for(|s| *s != ShutdownState::Running).await;
    }

    /// Run a session task that draining will wait for.
    pub fn spawn<F>(&self, session: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.sessions.spawn(session)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Wait for the drain to start and every tracked session to return.
    pub async fn wait_drained(&self) {
        self.draining().await;
        self.sessions.wait().await;
        self.state.send_replace(ShutdownState::Stopped);
        info!("All connections drained");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn trigger_moves_to_draining_once() {
        let coordinator = ShutdownCoordinator::new();
        let mut updates = coordinator.subscribe();
        assert_eq!(coordinator.state(), ShutdownState::Running);

        coordinator.trigger();
        assert_eq!(coordinator.state(), ShutdownState::Draining);
        assert!(updates.has_changed().unwrap());
        let _ = updates.borrow_and_update();

        coordinator.trigger();
        assert!(!updates.has_changed().unwrap());
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_sessions() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let (finish_tx, finish_rx) = oneshot::channel::<()>();
        coordinator.spawn(async move {
            let _ = finish_rx.await;
        });
        assert_eq!(coordinator.active_sessions(), 1);

        coordinator.trigger();
        let drained = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.wait_drained().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!drained.is_finished());
        assert_eq!(coordinator.state(), ShutdownState::Draining);

        finish_tx.send(()).unwrap();
        drained.await.unwrap();
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
        assert_eq!(coordinator.active_sessions(), 0);
    }

    #[tokio::test]
    async fn stopped_is_not_reverted_by_trigger() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger();
        coordinator.wait_drained().await;
        coordinator.trigger();
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
    }

    #[tokio::test]
    async fn draining_resolves_after_trigger() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.draining().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        coordinator.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
