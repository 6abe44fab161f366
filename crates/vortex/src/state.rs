//! Manager state and delivery decisions.
//!
//! Everything here is mutated under the manager's single lock. The methods
//! only decide; spawning requests and timers is left to the caller.

use crate::config::DEFAULT_AUTO_FLUSH_INTERVAL;
use crate::queue::EventQueue;
use crate::session::Session;
use crate::types::{now_iso8601, Tracking, TrackingData};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Auto-flush scheduler state.
#[derive(Debug)]
pub(crate) enum FlushState {
    Idle,
    AutoFlushArmed(JoinHandle<()>),
    Stopped,
}

/// Where a tracked event went.
#[derive(Debug)]
pub(crate) enum Route {
    Queued,
    SendNow(Tracking),
}

/// What to do once the health check has answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeFollowUp {
    Nothing,
    ArmTimer(Duration),
    FlushQueue,
}

/// What to do with the auto-flush timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerCommand {
    Arm(Duration),
    Disarm,
}

/// Values supplied by `init`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Target {
    pub tenant_id: String,
    pub url: String,
    pub platform: String,
}

#[derive(Debug)]
pub(crate) struct ManagerState {
    pub initialized: bool,
    pub server_checked: bool,
    pub server_alive: bool,
    pub auto_batching: bool,
    pub auto_flush_interval: Duration,
    pub target: Target,
    pub session: Session,
    pub queue: EventQueue,
    flush: FlushState,
}

impl Default for ManagerState {
    fn default() -> Self {
        Self {
            initialized: false,
            server_checked: false,
            server_alive: false,
            auto_batching: false,
            auto_flush_interval: DEFAULT_AUTO_FLUSH_INTERVAL,
            target: Target::default(),
            session: Session::default(),
            queue: EventQueue::new(),
            flush: FlushState::Idle,
        }
    }
}

impl ManagerState {
    pub fn is_stopped(&self) -> bool {
        matches!(self.flush, FlushState::Stopped)
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.flush, FlushState::AutoFlushArmed(_))
    }

    /// Stamp an event with the current identity snapshot.
    pub fn create_tracking(&self, name: String, value: String) -> Tracking {
        Tracking {
            tenant_id: self.target.tenant_id.clone(),
            tracking: TrackingData {
                name,
                value,
                identity: self.session.identity.clone(),
                session_id: self.session.session_id.clone(),
                platform: self.target.platform.clone(),
                app_version: self.session.app_version.clone(),
                timestamp: now_iso8601(),
            },
        }
    }

    /// Queue until the server has been checked, and always while
    /// auto-batching; otherwise hand the event back for an immediate send.
    pub fn route(&mut self, event: Tracking) -> Route {
        if !self.server_checked || self.auto_batching {
            self.queue.push(event);
            Route::Queued
        } else {
            Route::SendNow(event)
        }
    }

    /// Record the health check outcome.
    pub fn record_probe(&mut self, alive: bool) -> ProbeFollowUp {
        self.server_alive = alive;
        self.server_checked = true;

        if !alive || self.is_stopped() {
            return ProbeFollowUp::Nothing;
        }
        if self.auto_batching {
            ProbeFollowUp::ArmTimer(self.auto_flush_interval)
        } else if !self.queue.is_empty() {
            ProbeFollowUp::FlushQueue
        } else {
            ProbeFollowUp::Nothing
        }
    }

    /// Record the auto-batching switch; `None` once stopped.
    pub fn set_auto_batching(&mut self, enabled: bool, interval: Duration) -> Option<TimerCommand> {
        if self.is_stopped() {
            return None;
        }
        self.auto_batching = enabled;
        self.auto_flush_interval = interval;
        if self.server_alive && enabled {
            Some(TimerCommand::Arm(interval))
        } else {
            Some(TimerCommand::Disarm)
        }
    }

    /// Install a freshly spawned timer, replacing any previous one.
    pub fn arm(&mut self, handle: JoinHandle<()>) {
        if self.is_stopped() {
            handle.abort();
            return;
        }
        let previous = std::mem::replace(&mut self.flush, FlushState::AutoFlushArmed(handle));
        if let FlushState::AutoFlushArmed(old) = previous {
            old.abort();
        }
    }

    pub fn disarm(&mut self) {
        if let FlushState::AutoFlushArmed(handle) = &self.flush {
            handle.abort();
            self.flush = FlushState::Idle;
        }
    }

    /// Cancel the timer for good.
    pub fn stop(&mut self) {
        if let FlushState::AutoFlushArmed(handle) =
            std::mem::replace(&mut self.flush, FlushState::Stopped)
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ManagerState {
        let mut state = ManagerState::default();
        state.target = Target {
            tenant_id: "tenant".into(),
            url: "https://collector.test".into(),
            platform: "linux".into(),
        };
        state.session = Session {
            identity: "identity".into(),
            session_id: "session".into(),
            app_version: "2.0.0".into(),
        };
        state
    }

    async fn wait_finished(handle: &tokio::task::AbortHandle) -> bool {
        for _ in 0..100 {
            if handle.is_finished() {
                return true;
            }
            tokio::task::yield_now().await;
        }
        handle.is_finished()
    }

    fn track(state: &mut ManagerState, name: &str) -> Route {
        let event = state.create_tracking(name.into(), String::new());
        state.route(event)
    }

    #[test]
    fn test_create_tracking_uses_snapshot() {
        let state = state();

        let event = state.create_tracking("level_up".into(), "{\"level\":\"3\"}".into());

        assert_eq!(event.tenant_id, "tenant");
        assert_eq!(event.tracking.name, "level_up");
        assert_eq!(event.tracking.value, "{\"level\":\"3\"}");
        assert_eq!(event.tracking.identity, "identity");
        assert_eq!(event.tracking.session_id, "session");
        assert_eq!(event.tracking.platform, "linux");
        assert_eq!(event.tracking.app_version, "2.0.0");
        assert!(event.tracking.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_unchecked_server_queues_in_order() {
        let mut state = state();

        for name in ["a", "b", "c"] {
            assert!(matches!(track(&mut state, name), Route::Queued));
        }

        let names: Vec<String> = state
            .queue
            .take_pending()
            .into_iter()
            .map(|e| e.tracking.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_checked_without_batching_sends_now() {
        let mut state = state();
        state.record_probe(true);

        match track(&mut state, "single") {
            Route::SendNow(event) => assert_eq!(event.tracking.name, "single"),
            Route::Queued => panic!("expected immediate send"),
        }
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_checked_dead_server_still_sends_now() {
        let mut state = state();
        state.record_probe(false);

        assert!(matches!(track(&mut state, "x"), Route::SendNow(_)));
    }

    #[test]
    fn test_auto_batching_always_queues() {
        let mut state = state();
        state.set_auto_batching(true, Duration::from_secs(5));
        state.record_probe(true);

        assert!(matches!(track(&mut state, "x"), Route::Queued));
        assert_eq!(state.queue.len(), 1);
    }

    #[test]
    fn test_probe_follow_ups() {
        let mut state = state();
        assert_eq!(state.record_probe(false), ProbeFollowUp::Nothing);
        assert!(state.server_checked);
        assert!(!state.server_alive);

        let mut state = self::state();
        assert_eq!(state.record_probe(true), ProbeFollowUp::Nothing);

        let mut state = self::state();
        track(&mut state, "queued");
        assert_eq!(state.record_probe(true), ProbeFollowUp::FlushQueue);

        let mut state = self::state();
        state.set_auto_batching(true, Duration::from_secs(7));
        assert_eq!(
            state.record_probe(true),
            ProbeFollowUp::ArmTimer(Duration::from_secs(7))
        );
    }

    #[test]
    fn test_set_auto_batching_commands() {
        let mut state = state();

        // Not alive yet: only recorded.
        assert_eq!(
            state.set_auto_batching(true, Duration::from_secs(5)),
            Some(TimerCommand::Disarm)
        );
        assert!(state.auto_batching);

        state.record_probe(true);
        assert_eq!(
            state.set_auto_batching(true, Duration::from_secs(5)),
            Some(TimerCommand::Arm(Duration::from_secs(5)))
        );
        assert_eq!(
            state.set_auto_batching(false, Duration::from_secs(5)),
            Some(TimerCommand::Disarm)
        );
        assert!(!state.auto_batching);
    }

    #[tokio::test]
    async fn test_arm_replace_and_stop() {
        let mut state = state();
        let first = tokio::spawn(std::future::pending::<()>());
        let first_abort = first.abort_handle();
        state.arm(first);
        assert!(state.is_armed());

        let second = tokio::spawn(std::future::pending::<()>());
        let second_abort = second.abort_handle();
        state.arm(second);
        assert!(wait_finished(&first_abort).await);
        assert!(state.is_armed());

        state.stop();
        assert!(wait_finished(&second_abort).await);
        assert!(state.is_stopped());
        assert_eq!(state.set_auto_batching(true, Duration::from_secs(1)), None);
        assert_eq!(state.record_probe(true), ProbeFollowUp::Nothing);
    }

    #[tokio::test]
    async fn test_disarm_returns_to_idle() {
        let mut state = state();
        state.arm(tokio::spawn(std::future::pending::<()>()));

        state.disarm();
        assert!(!state.is_armed());
        assert!(!state.is_stopped());

        // Idempotent.
        state.disarm();
        assert!(!state.is_armed());
    }
}
