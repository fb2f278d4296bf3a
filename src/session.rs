//! Ranging session supervision: connection lifecycle events and supervised restart with
//! exponential backoff. Time is driven by the caller through `advance(dt)`.

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;

const TIMER_EPSILON: f64 = 1e-9;

/// Discrete lifecycle events from the ranging provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Peer or accessory connected and ranging
    Connected,
    Disconnected { retriable: bool },
    /// Hard framework error; the session object must be replaced
    Invalidated { reason: String },
    Suspended,
    Resumed,
    PermissionDenied,
    /// Explicit user cancel
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Connected,
    Suspended,
    RestartPending,
    Exhausted,
    AccessDenied,
}

/// What the supervisor asks of its owner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Replace the session object and re-run configuration
    RestartRequested { attempt: u32 },
    RetriesExhausted,
    AccessRequired,
}

#[derive(Clone, Debug)]
pub struct RangingSupervisor {
    status: SessionStatus,
    attempts: u32,
    max_attempts: u32,
    base_cooldown: f64,
    current_cooldown: f64,
    backoff: f64,
    cap: f64,
    /// Seconds until the pending restart fires
    wait_remaining: f64,
}

impl RangingSupervisor {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            status: SessionStatus::Idle,
            attempts: 0,
            max_attempts: config.retry_max_attempts,
            base_cooldown: config.retry_base_secs,
            current_cooldown: config.retry_base_secs,
            backoff: config.retry_backoff,
            cap: config.retry_cap_secs,
            wait_remaining: 0.0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn current_cooldown(&self) -> f64 {
        self.current_cooldown
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    pub fn handle(&mut self, event: &SessionEvent) -> Vec<SupervisorAction> {
        match event {
            SessionEvent::Connected => {
                self.record_success();
                Vec::new()
            }
            SessionEvent::Disconnected { retriable: true } => {
                log::info!("Ranging peer disconnected, retry in {:.1}s", self.current_cooldown);
                if self.can_schedule() {
                    self.schedule(self.current_cooldown);
                }
                Vec::new()
            }
            SessionEvent::Disconnected { retriable: false } | SessionEvent::Cancelled => {
                log::info!("Ranging session ended: {:?}", event);
                self.invalidate_timers();
                self.status = SessionStatus::Idle;
                Vec::new()
            }
            SessionEvent::Invalidated { reason } => {
                log::warn!("Ranging session invalidated: {reason}");
                self.request_restart()
            }
            SessionEvent::Suspended => {
                if self.status == SessionStatus::Connected {
                    self.status = SessionStatus::Suspended;
                }
                Vec::new()
            }
            SessionEvent::Resumed => {
                if self.status == SessionStatus::Suspended {
                    self.status = SessionStatus::Connected;
                }
                Vec::new()
            }
            SessionEvent::PermissionDenied => {
                log::warn!("Ranging access denied by the user");
                self.invalidate_timers();
                self.status = SessionStatus::AccessDenied;
                vec![SupervisorAction::AccessRequired]
            }
        }
    }

    /// Tear down and reinitialize the session now (plausibility fault, invalidation)
    pub fn request_restart(&mut self) -> Vec<SupervisorAction> {
        if !self.can_schedule() {
            return Vec::new();
        }
        self.fire()
    }

    /// Advance the retry timer by `dt` seconds
    pub fn advance(&mut self, dt: f64) -> Vec<SupervisorAction> {
        if self.status != SessionStatus::RestartPending {
            return Vec::new();
        }
        self.wait_remaining -= dt;
        if self.wait_remaining > TIMER_EPSILON {
            return Vec::new();
        }
        self.fire()
    }

    fn can_schedule(&self) -> bool {
        !matches!(self.status, SessionStatus::AccessDenied | SessionStatus::Exhausted)
    }

    fn schedule(&mut self, wait: f64) {
        self.status = SessionStatus::RestartPending;
        self.wait_remaining = wait;
    }

    /// Issue a restart and arm the timer for the next one in case this one never connects
    fn fire(&mut self) -> Vec<SupervisorAction> {
        if self.attempts >= self.max_attempts {
            log::warn!("Ranging restart gave up after {} attempts", self.attempts);
            self.invalidate_timers();
            self.status = SessionStatus::Exhausted;
            return vec![SupervisorAction::RetriesExhausted];
        }

        self.attempts += 1;
        let wait = self.current_cooldown;
        self.current_cooldown = (self.current_cooldown * self.backoff).min(self.cap);
        self.schedule(wait);
        log::info!(
            "Ranging restart attempt {}/{}, next retry in {:.1}s",
            self.attempts,
            self.max_attempts,
            wait
        );
        vec![SupervisorAction::RestartRequested { attempt: self.attempts }]
    }

    fn record_success(&mut self) {
        if self.attempts > 0 {
            log::info!("Ranging session restored after {} attempt(s)", self.attempts);
        } else {
            log::info!("Ranging session connected");
        }
        self.status = SessionStatus::Connected;
        self.attempts = 0;
        self.current_cooldown = self.base_cooldown;
        self.wait_remaining = 0.0;
    }

    fn invalidate_timers(&mut self) {
        self.wait_remaining = 0.0;
        self.attempts = 0;
        self.current_cooldown = self.base_cooldown;
    }

    /// One-line status for the live status file
    pub fn status_line(&self) -> String {
        match self.status {
            SessionStatus::RestartPending => format!(
                "RESTART_PENDING (waiting {:.1}s, attempt {}/{})",
                self.wait_remaining.max(0.0),
                self.attempts,
                self.max_attempts
            ),
            SessionStatus::Exhausted => "MAX_ATTEMPTS_EXCEEDED".to_string(),
            other => format!("{other:?}").to_uppercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn supervisor() -> RangingSupervisor {
        RangingSupervisor::new(&TrackerConfig::default())
    }

    #[test]
    fn test_invalidation_restarts_immediately_with_backoff() {
        let mut sup = supervisor();
        sup.handle(&SessionEvent::Connected);

        let actions = sup.handle(&SessionEvent::Invalidated { reason: "framework error".into() });
        assert_eq!(actions, vec![SupervisorAction::RestartRequested { attempt: 1 }]);
        assert_eq!(sup.status(), SessionStatus::RestartPending);

        // Never reconnects: retries follow 2s, 3s, 4.5s
        assert!(sup.advance(1.9).is_empty());
        assert_eq!(sup.advance(0.1), vec![SupervisorAction::RestartRequested { attempt: 2 }]);
        assert!(sup.advance(2.9).is_empty());
        assert_eq!(sup.advance(0.1), vec![SupervisorAction::RestartRequested { attempt: 3 }]);
        assert_relative_eq!(sup.current_cooldown(), 6.75);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = TrackerConfig { retry_max_attempts: 100, ..TrackerConfig::default() };
        let mut sup = RangingSupervisor::new(&config);
        for _ in 0..20 {
            sup.request_restart();
        }
        assert_relative_eq!(sup.current_cooldown(), 30.0);
    }

    #[test]
    fn test_retriable_disconnect_waits_for_cooldown() {
        let mut sup = supervisor();
        sup.handle(&SessionEvent::Connected);
        assert!(sup.handle(&SessionEvent::Disconnected { retriable: true }).is_empty());
        assert!(sup.advance(1.0).is_empty());
        assert_eq!(sup.advance(1.0), vec![SupervisorAction::RestartRequested { attempt: 1 }]);
    }

    #[test]
    fn test_connect_resets_attempts() {
        let mut sup = supervisor();
        sup.request_restart();
        sup.request_restart();
        sup.handle(&SessionEvent::Connected);
        assert_eq!(sup.attempts(), 0);
        assert_relative_eq!(sup.current_cooldown(), 2.0);
        assert!(sup.advance(100.0).is_empty());
    }

    #[test]
    fn test_retries_exhausted() {
        let config = TrackerConfig { retry_max_attempts: 2, ..TrackerConfig::default() };
        let mut sup = RangingSupervisor::new(&config);
        sup.request_restart();
        sup.request_restart();
        assert_eq!(sup.request_restart(), vec![SupervisorAction::RetriesExhausted]);
        assert_eq!(sup.status(), SessionStatus::Exhausted);
        assert!(sup.request_restart().is_empty());
    }

    #[test]
    fn test_cancel_invalidates_pending_retry() {
        let mut sup = supervisor();
        sup.handle(&SessionEvent::Disconnected { retriable: true });
        sup.handle(&SessionEvent::Cancelled);
        assert_eq!(sup.status(), SessionStatus::Idle);
        assert!(sup.advance(60.0).is_empty());
    }

    #[test]
    fn test_permission_denied_never_retries() {
        let mut sup = supervisor();
        assert_eq!(sup.handle(&SessionEvent::PermissionDenied), vec![SupervisorAction::AccessRequired]);
        assert!(sup.request_restart().is_empty());
        assert!(sup.handle(&SessionEvent::Invalidated { reason: "x".into() }).is_empty());
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut sup = supervisor();
        sup.handle(&SessionEvent::Connected);
        sup.handle(&SessionEvent::Suspended);
        assert_eq!(sup.status(), SessionStatus::Suspended);
        sup.handle(&SessionEvent::Resumed);
        assert!(sup.is_connected());
    }

    #[test]
    fn test_session_event_json() {
        let event: SessionEvent = serde_json::from_str(r#"{"kind": "disconnected", "retriable": true}"#).unwrap();
        assert_eq!(event, SessionEvent::Disconnected { retriable: true });
    }
}
