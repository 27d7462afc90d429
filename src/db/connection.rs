//! Session lifecycle: connect, ping, reconnect once, close.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use tracing::{info, warn};

/// Column names and positional row values of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Opens sessions against the database capability.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DbSession>>;

    /// Connection target without credentials, for logs.
    fn target(&self) -> String;
}

/// A live database session. Connection-class failures come back as
/// `EngineError::Connection`, statement failures as `EngineError::Statement`.
#[async_trait]
pub trait DbSession: Send {
    /// Trivial round trip.
    async fn ping(&mut self) -> Result<()>;

    async fn run(&mut self, sql: &str) -> Result<QueryOutput>;

    async fn close(self: Box<Self>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Owns at most one session. Statements only run through `run`, which never
/// hands out a session that failed its last liveness check.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    session: Option<Box<dyn DbSession>>,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.session.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Make sure a usable session exists. A failed ping tears the session
    /// down and triggers exactly one reconnect.
    pub async fn ensure_connection(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            warn!("No database session, connecting");
            return self.connect().await;
        };

        match session.ping().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Connection test failed: {}. Reconnecting...", e);
                self.reset().await;
                self.connect().await
            }
        }
    }

    async fn connect(&mut self) -> Result<()> {
        match self.connector.connect().await {
            Ok(session) => {
                info!("Connected to {}", self.connector.target());
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                warn!("Database connection to {} failed: {}", self.connector.target(), e);
                self.session = None;
                Err(e)
            }
        }
    }

    /// Drop the current session without waiting on a possibly dead peer.
    pub async fn reset(&mut self) {
        if self.session.take().is_some() {
            info!("Discarded database session");
        }
    }

    /// Run one statement on the current session.
    pub async fn run(&mut self, sql: &str) -> Result<QueryOutput> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| EngineError::Connection("No active database session".to_string()))?;
        session.run(sql).await
    }

    /// Graceful teardown. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            info!("Connection closed");
        }
    }
}
