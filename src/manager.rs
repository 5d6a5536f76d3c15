//! Wiring for one console session: store, refresher, monitor and guard

use crate::config::SessionConfig;
use crate::error::Result;
use crate::guard::RouteGuard;
use crate::monitor::{MonitorHandle, TokenMonitor};
use crate::refresh::{HttpRefreshEndpoint, RefreshEndpoint, Refresher};
use crate::session_store::SessionStore;
use crate::types::TokenStatus;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Session manager with background token monitoring
///
/// Must be created inside a tokio runtime; the monitor task starts
/// immediately and stops when the manager is dropped or shut down.
pub struct SessionManager<E = HttpRefreshEndpoint> {
    config: Arc<SessionConfig>,
    store: SessionStore,
    monitor: TokenMonitor<E>,
    guard: RouteGuard<E>,
    monitor_handle: MonitorHandle,
}

impl SessionManager<HttpRefreshEndpoint> {
    /// Create a manager talking to the HTTP refresh endpoint in `config`
    pub fn new(config: SessionConfig) -> Result<Arc<Self>> {
        let endpoint = HttpRefreshEndpoint::new(&config)?;
        Self::with_endpoint(config, Arc::new(endpoint))
    }
}

impl<E: RefreshEndpoint> SessionManager<E> {
    /// Create a manager around any refresh endpoint
    pub fn with_endpoint(config: SessionConfig, endpoint: Arc<E>) -> Result<Arc<Self>> {
        config.validate()?;
        let config = Arc::new(config);

        let store = SessionStore::new();
        let refresher = Refresher::new(store.clone(), endpoint);
        let monitor = TokenMonitor::new(refresher.clone(), &config);
        let guard = RouteGuard::new(refresher, Arc::clone(&config));

        // Start the monitor on creation
        let monitor_handle = monitor.clone().spawn();
        info!(refresh_url = %config.refresh_url, "Session manager started");

        Ok(Arc::new(Self {
            config,
            store,
            monitor,
            guard,
            monitor_handle,
        }))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn guard(&self) -> &RouteGuard<E> {
        &self.guard
    }

    pub fn monitor(&self) -> &TokenMonitor<E> {
        &self.monitor
    }

    /// Advisory token status for "session expiring soon" style banners
    pub fn status(&self) -> watch::Receiver<TokenStatus> {
        self.monitor.status()
    }

    /// User-initiated logout
    pub fn logout(&self) -> bool {
        self.store.logout()
    }

    /// Stop background monitoring. The session itself is left as is.
    pub fn shutdown(&self) {
        info!("Stopping token monitor");
        self.monitor_handle.stop();
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor_handle.is_running()
    }
}
