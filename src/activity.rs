//! Idle policy and the background idle poller.
//!
//! Sessions flip to idle when their last activity (or creation, when no
//! activity was ever recorded) is older than the configured threshold. The
//! poller adapts its cadence to the registry's recommendation so a fully
//! idle server wakes up less often.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::manager::SessionManager;

/// Timing knobs for idle detection.
#[derive(Debug, Clone, Copy)]
pub struct IdlePolicy {
    /// Inactivity span after which a session is considered idle.
    pub idle_threshold: Duration,
    /// Poll interval while at least one session is active.
    pub active_check_interval: Duration,
    /// Poll interval while every session is idle (or none exist).
    pub idle_check_interval: Duration,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(60),
            active_check_interval: Duration::from_secs(1),
            idle_check_interval: Duration::from_secs(5),
        }
    }
}

/// Run the idle poller until `cancel` fires.
///
/// Each round sleeps for the registry's recommended interval, then flips
/// idle flags. The recommendation is advisory; honoring it only saves
/// wakeups, it is not required for correctness.
pub async fn run_idle_poller(manager: SessionManager, cancel: CancellationToken) {
    loop {
        let interval = manager.recommended_idle_check_interval();
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("idle poller stopping");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        if manager.check_idle_state() {
            tracing::debug!("idle state changed on at least one session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> IdlePolicy {
        IdlePolicy {
            idle_threshold: Duration::from_millis(30),
            active_check_interval: Duration::from_millis(5),
            idle_check_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn poller_flips_sessions_idle() {
        let manager = SessionManager::with_policy(fast_policy());
        manager.create_session("bg", "0", 80, 24).unwrap();

        let cancel = CancellationToken::new();
        let poller = tokio::spawn(run_idle_poller(manager.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(manager.get_session("bg").unwrap().is_idle);

        cancel.cancel();
        poller.await.unwrap();
    }

    #[tokio::test]
    async fn poller_stops_on_cancel() {
        let manager = SessionManager::with_policy(fast_policy());
        let cancel = CancellationToken::new();
        let poller = tokio::spawn(run_idle_poller(manager, cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .expect("poller should exit promptly on cancel")
            .unwrap();
    }
}
