//! Lazily connected, memoized cluster sessions for one side of a migration.

use crate::config::ConnectionSettings;
use crate::error::{MigrationError, MigrationResult};
use colmigrate_core::{ClusterConnector, ClusterSession, ConnectOptions, RetryPolicy};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Which cluster a handle talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Cluster rows are read from
    Source,
    /// Cluster rows are written to
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

/// Connection handler for one side.
///
/// The session is built on first use and reused until [`SessionHandle::dispose`].
pub struct SessionHandle {
    side: Side,
    connector: Arc<dyn ClusterConnector>,
    settings: Option<ConnectionSettings>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    session: OnceCell<Arc<dyn ClusterSession>>,
}

impl SessionHandle {
    /// Create a handle. Nothing connects until [`SessionHandle::session`] is called.
    pub fn new(
        side: Side,
        connector: Arc<dyn ClusterConnector>,
        settings: Option<ConnectionSettings>,
    ) -> Self {
        SessionHandle {
            side,
            connector,
            settings,
            retry_policy: None,
            session: OnceCell::new(),
        }
    }

    /// Attach a retry policy to the session this handle builds.
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Side this handle serves.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Connection settings for this side.
    pub fn settings(&self) -> MigrationResult<&ConnectionSettings> {
        self.settings.as_ref().ok_or_else(|| {
            MigrationError::Config(format!("{} connection is not configured", self.side))
        })
    }

    /// Whether a session has been built and not yet disposed.
    pub fn is_connected(&self) -> bool {
        self.session.initialized()
    }

    /// Get the session, connecting on first call.
    pub async fn session(&self) -> MigrationResult<Arc<dyn ClusterSession>> {
        let session = self
            .session
            .get_or_try_init(|| self.connect())
            .await?;
        Ok(Arc::clone(session))
    }

    async fn connect(&self) -> MigrationResult<Arc<dyn ClusterSession>> {
        let settings = self.settings()?;
        let endpoint = settings.endpoint()?;
        info!(
            side = %self.side,
            contact_points = ?endpoint.contact_points(),
            keyspace = %settings.keyspace,
            "Building {} cluster session",
            self.side
        );

        let mut options = ConnectOptions::new(endpoint);
        if let Some(policy) = &self.retry_policy {
            options = options.with_retry_policy(Arc::clone(policy));
        }
        Ok(self.connector.connect(options).await?)
    }

    /// Close the session if one was built. Safe to call repeatedly.
    pub async fn dispose(&mut self) {
        if let Some(session) = self.session.take() {
            match session.close().await {
                Ok(()) => info!(side = %self.side, "Disposed {} session", self.side),
                Err(e) => warn!(side = %self.side, error = %e, "Failed to close {} session", self.side),
            }
        }
    }
}
