//! Lifecycle of the shared remote-API client.
//!
//! [`ConnectionManager`] hands out one lazily-built client to every request in
//! the process. State moves `Uninitialized -> Ready -> Closing -> Closed` and
//! never backwards; a `get_client()` after `Closed` builds a brand-new client.
//!
//! The current state sits behind a cheap `parking_lot::RwLock` that is never
//! held across an `.await`. Initialization and close are serialized by a
//! single async lifecycle mutex.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{errors::Error, Result};

/// Builds and tears down clients of type `T`.
#[async_trait]
pub trait Connector<T: ?Sized + Send + Sync>: Send + Sync {
    /// Build a ready client.
    ///
    /// Must fail with [`Error::Config`] when credentials are absent/blank and
    /// with [`Error::Initialization`] when authentication fails.
    async fn connect(&self) -> Result<Arc<T>>;

    /// Release remote resources held by `client`.
    async fn disconnect(&self, _client: &T) -> Result<()> {
        Ok(())
    }
}

enum SessionState<T: ?Sized> {
    Uninitialized,
    Ready { client: Arc<T>, since: Instant },
    /// Shutdown in progress. Holds the client still waiting to be released.
    Closing(Option<Arc<T>>),
    Closed,
}

/// Result of [`ConnectionManager::health_check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    NotInitialized,
    Healthy { uptime: Duration },
    ClientClosed,
    Closing,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::Healthy { .. } => "healthy",
            Self::ClientClosed => "client_closed",
            Self::Closing => "closing",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

pub struct ConnectionManager<T: ?Sized + Send + Sync> {
    connector: Box<dyn Connector<T>>,
    state: RwLock<SessionState<T>>,
    lifecycle: Mutex<()>,
    /// Bumped by every `close()`. A connect that started under an older value
    /// lost the race and must not install its client.
    close_epoch: AtomicU64,
}

impl<T: ?Sized + Send + Sync> ConnectionManager<T> {
    pub fn new(connector: impl Connector<T> + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            state: RwLock::new(SessionState::Uninitialized),
            lifecycle: Mutex::new(()),
            close_epoch: AtomicU64::new(0),
        }
    }

    /// Fast path: a cheap read of the current state.
    ///
    /// `Ok(None)` means the caller has to (re)initialize.
    fn ready_client(&self) -> Result<Option<Arc<T>>> {
        match &*self.state.read() {
            SessionState::Ready { client, .. } => Ok(Some(client.clone())),
            SessionState::Closing(_) => Err(Error::Closing),
            SessionState::Uninitialized | SessionState::Closed => Ok(None),
        }
    }

    /// Return the shared client, building it on first use.
    pub async fn get_client(&self) -> Result<Arc<T>> {
        if let Some(client) = self.ready_client()? {
            return Ok(client);
        }

        let _guard = self.lifecycle.lock().await;

        // Another caller may have finished initializing while we waited. The
        // epoch is read under the same lock `close()` bumps it under.
        let epoch = {
            let st = self.state.read();
            match &*st {
                SessionState::Ready { client, .. } => return Ok(client.clone()),
                SessionState::Closing(_) => return Err(Error::Closing),
                SessionState::Uninitialized | SessionState::Closed => {
                    self.close_epoch.load(Ordering::SeqCst)
                }
            }
        };
        let client = match self.connector.connect().await {
            Ok(client) => client,
            Err(e) => {
                if self.close_epoch.load(Ordering::SeqCst) == epoch {
                    *self.state.write() = SessionState::Uninitialized;
                }
                tracing::warn!(error = %e, "remote client initialization failed");
                return Err(e);
            }
        };

        let mut st = self.state.write();
        if self.close_epoch.load(Ordering::SeqCst) != epoch {
            match &mut *st {
                // close() is still running; it releases this client.
                SessionState::Closing(pending) => *pending = Some(client),
                // close() gave up waiting and already settled on Closed.
                _ => tracing::warn!("remote client finished initializing after close; dropped"),
            }
            return Err(Error::Closing);
        }
        *st = SessionState::Ready {
            client: client.clone(),
            since: Instant::now(),
        };
        tracing::info!("remote client initialized");
        Ok(client)
    }

    /// Release the client, waiting at most `timeout` overall.
    ///
    /// The bound covers both waiting out an in-flight initialization and the
    /// remote release. Always ends in `Closed`, even when the release is
    /// unconfirmed. Calling it again is a no-op.
    pub async fn close(&self, timeout: Duration) {
        {
            let mut st = self.state.write();
            match std::mem::replace(&mut *st, SessionState::Closing(None)) {
                SessionState::Ready { client, .. } => *st = SessionState::Closing(Some(client)),
                SessionState::Closed => {
                    *st = SessionState::Closed;
                    return;
                }
                other @ SessionState::Closing(_) => *st = other,
                SessionState::Uninitialized => {}
            }
            self.close_epoch.fetch_add(1, Ordering::SeqCst);
        }

        let release = async {
            let _guard = self.lifecycle.lock().await;

            let client = match &mut *self.state.write() {
                SessionState::Closing(pending) => pending.take(),
                _ => None,
            };

            if let Some(client) = client {
                match self.connector.disconnect(&client).await {
                    Ok(()) => tracing::info!("remote client closed"),
                    Err(e) => tracing::warn!(error = %e, "error closing remote client"),
                }
            }
        };

        if tokio::time::timeout(timeout, release).await.is_err() {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "timed out closing remote client; dropping local references"
            );
        }

        *self.state.write() = SessionState::Closed;
    }

    /// Local-state inspection only; never touches the network.
    pub fn health_check(&self) -> HealthStatus {
        match &*self.state.read() {
            SessionState::Uninitialized => HealthStatus::NotInitialized,
            SessionState::Ready { since, .. } => HealthStatus::Healthy {
                uptime: since.elapsed(),
            },
            SessionState::Closing(_) => HealthStatus::Closing,
            SessionState::Closed => HealthStatus::ClientClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Probe {
        id: usize,
    }

    #[derive(Default)]
    struct ProbeConnector {
        connects: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
        fail_with: Option<fn() -> Error>,
        connect_delay: Duration,
        disconnect_delay: Duration,
        hang_connect: bool,
    }

    #[async_trait]
    impl Connector<Probe> for ProbeConnector {
        async fn connect(&self) -> Result<Arc<Probe>> {
            if self.hang_connect {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.connect_delay).await;
            if let Some(make_err) = self.fail_with {
                return Err(make_err());
            }
            let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Arc::new(Probe { id }))
        }

        async fn disconnect(&self, _client: &Probe) -> Result<()> {
            tokio::time::sleep(self.disconnect_delay).await;
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn missing_credentials() -> Error {
        Error::Config("credentials missing".to_string())
    }

    fn rejected_credentials() -> Error {
        Error::Initialization("invalid_grant".to_string())
    }

    #[tokio::test]
    async fn lazy_init_builds_once_and_reuses() {
        let connects = Arc::new(AtomicUsize::new(0));
        let mgr = ConnectionManager::new(ProbeConnector {
            connects: connects.clone(),
            ..Default::default()
        });
        assert_eq!(mgr.health_check(), HealthStatus::NotInitialized);

        let a = mgr.get_client().await.unwrap();
        let b = mgr.get_client().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(mgr.health_check().is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_initialization() {
        let connects = Arc::new(AtomicUsize::new(0));
        let mgr = Arc::new(ConnectionManager::new(ProbeConnector {
            connects: connects.clone(),
            connect_delay: Duration::from_millis(50),
            ..Default::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mgr = mgr.clone();
                tokio::spawn(async move { mgr.get_client().await.map(|c| c.id) })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 1);
        }
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_init_resets_and_surfaces_config_error() {
        let mgr = ConnectionManager::new(ProbeConnector {
            fail_with: Some(missing_credentials as fn() -> Error),
            ..Default::default()
        });
        assert!(matches!(mgr.get_client().await, Err(Error::Config(_))));
        assert_eq!(mgr.health_check(), HealthStatus::NotInitialized);
        // A later call retries instead of caching the failure.
        assert!(matches!(mgr.get_client().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn auth_failure_is_initialization_error() {
        let mgr = ConnectionManager::new(ProbeConnector {
            fail_with: Some(rejected_credentials as fn() -> Error),
            ..Default::default()
        });
        assert!(matches!(
            mgr.get_client().await,
            Err(Error::Initialization(_))
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_reinit_builds_fresh_client() {
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let mgr = ConnectionManager::new(ProbeConnector {
            connects: connects.clone(),
            disconnects: disconnects.clone(),
            ..Default::default()
        });

        let first = mgr.get_client().await.unwrap();
        mgr.close(Duration::from_secs(1)).await;
        mgr.close(Duration::from_secs(1)).await;
        assert_eq!(mgr.health_check(), HealthStatus::ClientClosed);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        let second = mgr.get_client().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn close_before_init_just_marks_closed() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let mgr = ConnectionManager::new(ProbeConnector {
            disconnects: disconnects.clone(),
            ..Default::default()
        });
        mgr.close(Duration::from_millis(10)).await;
        assert_eq!(mgr.health_check(), HealthStatus::ClientClosed);
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_timeout_still_converges_to_closed() {
        let mgr = Arc::new(ConnectionManager::new(ProbeConnector {
            disconnect_delay: Duration::from_secs(60),
            ..Default::default()
        }));
        mgr.get_client().await.unwrap();

        let closer = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.close(Duration::from_millis(100)).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(mgr.health_check(), HealthStatus::Closing);
        assert!(matches!(mgr.get_client().await, Err(Error::Closing)));

        closer.await.unwrap();
        assert_eq!(mgr.health_check(), HealthStatus::ClientClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn client_built_during_close_is_released_not_installed() {
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let mgr = Arc::new(ConnectionManager::new(ProbeConnector {
            connects: connects.clone(),
            disconnects: disconnects.clone(),
            connect_delay: Duration::from_millis(100),
            ..Default::default()
        }));

        let getter = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.get_client().await.map(|c| c.id) })
        };
        tokio::task::yield_now().await;
        mgr.close(Duration::from_secs(1)).await;

        assert!(matches!(getter.await.unwrap(), Err(Error::Closing)));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.health_check(), HealthStatus::ClientClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_bounded_by_a_stuck_initialization() {
        let mgr = Arc::new(ConnectionManager::new(ProbeConnector {
            hang_connect: true,
            ..Default::default()
        }));

        let getter = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.get_client().await.map(|c| c.id) })
        };
        tokio::task::yield_now().await;

        let closed = tokio::time::timeout(
            Duration::from_secs(2),
            mgr.close(Duration::from_millis(100)),
        )
        .await;
        assert!(closed.is_ok());
        assert_eq!(mgr.health_check(), HealthStatus::ClientClosed);

        getter.abort();
        let _ = getter.await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_initialization_after_forced_close_is_dropped() {
        let connects = Arc::new(AtomicUsize::new(0));
        let mgr = Arc::new(ConnectionManager::new(ProbeConnector {
            connects: connects.clone(),
            connect_delay: Duration::from_secs(10),
            ..Default::default()
        }));

        let getter = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.get_client().await.map(|c| c.id) })
        };
        tokio::task::yield_now().await;
        mgr.close(Duration::from_millis(100)).await;
        assert_eq!(mgr.health_check(), HealthStatus::ClientClosed);

        assert!(matches!(getter.await.unwrap(), Err(Error::Closing)));
        assert_eq!(mgr.health_check(), HealthStatus::ClientClosed);

        // A caller arriving after the close gets a fresh client.
        assert_eq!(mgr.get_client().await.unwrap().id, 2);
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn uptime_reported_when_healthy() {
        let mgr = ConnectionManager::new(ProbeConnector::default());
        mgr.get_client().await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        match mgr.health_check() {
            HealthStatus::Healthy { uptime } => assert!(uptime >= Duration::from_secs(30)),
            other => panic!("unexpected health: {other:?}"),
        }
    }
}
