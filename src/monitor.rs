//! Background token lifecycle monitor
//!
//! Every check interval (and once as soon as a session appears) the monitor:
//!
//! 1. does nothing if there is no session,
//! 2. forces a logout if the refresh token has expired,
//! 3. publishes a fresh [`TokenStatus`],
//! 4. stops if the access token is still valid past the buffer,
//! 5. otherwise refreshes, unless a refresh it started is still running.

use crate::config::SessionConfig;
use crate::refresh::{RefreshEndpoint, Refresher};
use crate::session_store::SessionStore;
use crate::token;
use crate::types::{TokenPair, TokenStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of one monitor check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No authenticated session
    Idle,
    /// Refresh token had expired; session was force-logged-out
    LoggedOut,
    /// Access token still valid past the buffer
    Fresh,
    /// Access token was refreshed
    Refreshed,
    /// A refresh started by this monitor is still in flight
    AlreadyRefreshing,
    /// Refresh failed; session was force-logged-out
    RefreshFailed,
}

/// Marks a monitor refresh as in flight until dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Keeps the access token fresh and ends sessions whose refresh token expired
pub struct TokenMonitor<E> {
    refresher: Refresher<E>,
    check_interval: Duration,
    access_buffer_secs: u64,
    refreshing: Arc<AtomicBool>,
    status: Arc<watch::Sender<TokenStatus>>,
}

impl<E> Clone for TokenMonitor<E> {
    fn clone(&self) -> Self {
        Self {
            refresher: self.refresher.clone(),
            check_interval: self.check_interval,
            access_buffer_secs: self.access_buffer_secs,
            refreshing: Arc::clone(&self.refreshing),
            status: Arc::clone(&self.status),
        }
    }
}

impl<E: RefreshEndpoint> TokenMonitor<E> {
    pub fn new(refresher: Refresher<E>, config: &SessionConfig) -> Self {
        let (status, _) = watch::channel(TokenStatus::default());
        Self {
            refresher,
            check_interval: config.check_interval,
            access_buffer_secs: config.access_buffer_secs,
            refreshing: Arc::new(AtomicBool::new(false)),
            status: Arc::new(status),
        }
    }

    fn store(&self) -> &SessionStore {
        self.refresher.store()
    }

    /// Advisory status, updated on every check
    pub fn status(&self) -> watch::Receiver<TokenStatus> {
        self.status.subscribe()
    }

    pub fn current_status(&self) -> TokenStatus {
        *self.status.borrow()
    }

    fn publish(&self, status: TokenStatus) {
        self.status.send_replace(status);
    }

    fn compute_status(&self, tokens: &TokenPair) -> TokenStatus {
        let access = tokens.access_token.as_str();
        let refresh = tokens.refresh_token.as_str();
        TokenStatus {
            access_token_valid: !token::is_expired(access, self.access_buffer_secs),
            refresh_token_valid: !token::is_expired(refresh, SessionConfig::REFRESH_BUFFER_SECS),
            time_until_access_expiry: Duration::from_millis(token::time_until_expiry_millis(access)),
            time_until_refresh_expiry: Duration::from_millis(token::time_until_expiry_millis(refresh)),
        }
    }

    /// Tokens of a live session whose refresh token is still usable.
    /// Forces a logout when it isn't.
    fn usable_tokens(&self) -> Result<TokenPair, CheckOutcome> {
        let session = self.store().session();
        let tokens = match session.tokens {
            Some(tokens) if session.user.is_some() => tokens,
            _ => {
                self.publish(TokenStatus::default());
                return Err(CheckOutcome::Idle);
            }
        };

        if token::is_expired(tokens.refresh_token.as_str(), SessionConfig::REFRESH_BUFFER_SECS) {
            warn!("Refresh token expired, forcing logout");
            self.store().force_logout();
            self.publish(TokenStatus::default());
            return Err(CheckOutcome::LoggedOut);
        }

        Ok(tokens)
    }

    /// Run one check cycle
    pub async fn check_now(&self) -> CheckOutcome {
        let tokens = match self.usable_tokens() {
            Ok(tokens) => tokens,
            Err(outcome) => return outcome,
        };

        self.publish(self.compute_status(&tokens));

        if !token::is_expired(tokens.access_token.as_str(), self.access_buffer_secs) {
            return CheckOutcome::Fresh;
        }

        debug!(
            buffer_secs = %self.access_buffer_secs,
            "Access token close to expiry, refreshing"
        );
        self.refresh_exclusive().await
    }

    /// Refresh immediately, even if the access token is still fresh
    pub async fn refresh_now(&self) -> CheckOutcome {
        if let Err(outcome) = self.usable_tokens() {
            return outcome;
        }
        self.refresh_exclusive().await
    }

    async fn refresh_exclusive(&self) -> CheckOutcome {
        let Some(_in_flight) = InFlight::acquire(&self.refreshing) else {
            debug!("Refresh already in flight, skipping");
            return CheckOutcome::AlreadyRefreshing;
        };

        match self.refresher.refresh().await {
            Ok(tokens) => {
                self.publish(self.compute_status(&tokens));
                CheckOutcome::Refreshed
            }
            Err(e) => {
                warn!(error = %e, "Auto-refresh failed");
                self.publish(TokenStatus::default());
                CheckOutcome::RefreshFailed
            }
        }
    }

    /// Start monitoring in the background
    ///
    /// The interval is armed while the session is authenticated and
    /// disarmed when it is cleared. Dropping the handle stops the task.
    pub fn spawn(self) -> MonitorHandle {
        MonitorHandle {
            task: tokio::spawn(self.supervise()),
        }
    }

    async fn supervise(self) {
        let mut session = self.store().subscribe();

        loop {
            let (authenticated, mut generation) = {
                let current = session.borrow_and_update();
                (current.is_authenticated(), current.generation)
            };
            if authenticated {
                info!(
                    check_interval_secs = %self.check_interval.as_secs(),
                    buffer_secs = %self.access_buffer_secs,
                    "Session authenticated, token monitor armed"
                );

                let mut interval = tokio::time::interval(self.check_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let outcome = self.check_now().await;
                            debug!(outcome = ?outcome, "Token check finished");
                        }
                        changed = session.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            let (still_authenticated, latest) = {
                                let current = session.borrow_and_update();
                                (current.is_authenticated(), current.generation)
                            };
                            if !still_authenticated {
                                break;
                            }
                            // a new login may have replaced the session between polls
                            if latest != generation {
                                generation = latest;
                                debug!("New session replaced the previous one, checking now");
                                interval.reset_immediately();
                            }
                        }
                    }
                }

                info!("Session cleared, token monitor disarmed");
                self.publish(TokenStatus::default());
            } else if session.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owns the background monitor task
pub struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pair, ScriptedEndpoint};
    use crate::types::{Role, User};

    fn monitor(
        tokens: Option<TokenPair>,
        endpoint: &Arc<ScriptedEndpoint>,
    ) -> (SessionStore, TokenMonitor<ScriptedEndpoint>) {
        let store = SessionStore::new();
        if let Some(tokens) = tokens {
            store.establish(User::new("a-1", Role::Admin), tokens);
        }
        let refresher = Refresher::new(store.clone(), Arc::clone(endpoint));
        let config = SessionConfig::new("http://unused");
        (store, TokenMonitor::new(refresher, &config))
    }

    #[tokio::test]
    async fn test_refreshes_access_token_close_to_expiry() {
        let original = pair(10, 3600);
        let endpoint = ScriptedEndpoint::succeeding();
        let (store, monitor) = monitor(Some(original.clone()), &endpoint);

        assert_eq!(monitor.check_now().await, CheckOutcome::Refreshed);

        assert_eq!(endpoint.calls(), 1);
        let tokens = store.tokens().unwrap();
        assert_ne!(tokens.access_token, original.access_token);
        assert_ne!(tokens.refresh_token, original.refresh_token);

        let status = monitor.current_status();
        assert!(status.access_token_valid);
        assert!(status.refresh_token_valid);
        assert!(status.time_until_access_expiry > Duration::from_secs(800));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_logs_out_without_calling() {
        let endpoint = ScriptedEndpoint::succeeding();
        let (store, monitor) = monitor(Some(pair(-60, -5)), &endpoint);

        assert_eq!(monitor.check_now().await, CheckOutcome::LoggedOut);

        assert_eq!(endpoint.calls(), 0);
        assert!(!store.is_authenticated());
        assert!(!store.is_manual_logout());
        assert_eq!(monitor.current_status(), TokenStatus::default());
    }

    #[tokio::test]
    async fn test_fresh_tokens_are_left_alone() {
        let endpoint = ScriptedEndpoint::succeeding();
        let (_store, monitor) = monitor(Some(pair(3600, 86_400)), &endpoint);

        assert_eq!(monitor.check_now().await, CheckOutcome::Fresh);
        assert_eq!(endpoint.calls(), 0);

        let status = monitor.current_status();
        assert!(status.access_token_valid);
        assert!(status.refresh_token_valid);
        assert!(status.time_until_access_expiry > Duration::from_secs(3500));
        assert!(status.time_until_refresh_expiry > status.time_until_access_expiry);
    }

    #[tokio::test]
    async fn test_idle_without_session() {
        let endpoint = ScriptedEndpoint::succeeding();
        let (_store, monitor) = monitor(None, &endpoint);

        assert_eq!(monitor.check_now().await, CheckOutcome::Idle);
        assert_eq!(monitor.refresh_now().await, CheckOutcome::Idle);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_forces_logout() {
        let endpoint = ScriptedEndpoint::failing();
        let (store, monitor) = monitor(Some(pair(5, 3600)), &endpoint);

        assert_eq!(monitor.check_now().await, CheckOutcome::RefreshFailed);
        assert_eq!(endpoint.calls(), 1);
        assert!(!store.is_authenticated());
        assert!(!store.is_manual_logout());

        // next cycle has nothing left to do
        assert_eq!(monitor.check_now().await, CheckOutcome::Idle);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_trigger_while_refreshing_is_noop() {
        let endpoint = ScriptedEndpoint::succeeding().with_delay(Duration::from_millis(500));
        let (_store, monitor) = monitor(Some(pair(10, 3600)), &endpoint);

        let (first, second) = tokio::join!(monitor.check_now(), monitor.check_now());

        assert_eq!(first, CheckOutcome::Refreshed);
        assert_eq!(second, CheckOutcome::AlreadyRefreshing);
        assert_eq!(endpoint.calls(), 1);

        // guard released afterwards
        assert_eq!(monitor.refresh_now().await, CheckOutcome::Refreshed);
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_now_ignores_freshness() {
        let endpoint = ScriptedEndpoint::succeeding();
        let (_store, monitor) = monitor(Some(pair(3600, 86_400)), &endpoint);

        assert_eq!(monitor.refresh_now().await, CheckOutcome::Refreshed);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_now_respects_expired_refresh_token() {
        let endpoint = ScriptedEndpoint::succeeding();
        let (store, monitor) = monitor(Some(pair(3600, -1)), &endpoint);

        assert_eq!(monitor.refresh_now().await, CheckOutcome::LoggedOut);
        assert_eq!(endpoint.calls(), 0);
        assert!(!store.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_monitor_follows_session() {
        let endpoint = ScriptedEndpoint::succeeding();
        let (store, monitor) = monitor(None, &endpoint);
        let handle = monitor.clone().spawn();

        // nothing armed while logged out
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(endpoint.calls(), 0);

        // immediate check once a session appears
        store.establish(User::new("a-1", Role::Admin), pair(10, 3600));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(endpoint.calls(), 1);
        assert!(monitor.current_status().access_token_valid);

        // fresh tokens survive the next ticks untouched
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(endpoint.calls(), 1);

        store.logout();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(monitor.current_status(), TokenStatus::default());

        // re-armed for the next session
        store.establish(User::new("a-1", Role::Admin), pair(10, 3600));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(endpoint.calls(), 2);

        handle.stop();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relogin_between_polls_gets_immediate_check() {
        let endpoint = ScriptedEndpoint::succeeding();
        let (store, monitor) = monitor(Some(pair(3600, 86_400)), &endpoint);
        let _handle = monitor.spawn();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(endpoint.calls(), 0);

        store.logout();
        store.establish(User::new("t-1", Role::Teacher), pair(10, 3600));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(endpoint.calls(), 1);

        // same for a login that replaces a live session outright
        store.establish(User::new("t-2", Role::Teacher), pair(10, 3600));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(endpoint.calls(), 2);

        // the monitor's own token swap does not trigger another check
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_checks() {
        let endpoint = ScriptedEndpoint::succeeding();
        let (store, monitor) = monitor(None, &endpoint);

        drop(monitor.spawn());
        tokio::time::sleep(Duration::from_millis(1)).await;

        store.establish(User::new("a-1", Role::Admin), pair(10, 3600));
        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_picks_up_expiring_token() {
        let endpoint = ScriptedEndpoint::succeeding();
        let (store, monitor) = monitor(Some(pair(3600, 86_400)), &endpoint);
        let _handle = monitor.spawn();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(endpoint.calls(), 0);

        // swap in a token that is about to expire; next tick refreshes it
        store.set_tokens(pair(10, 3600));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(endpoint.calls(), 1);
    }
}
