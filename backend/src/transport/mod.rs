pub mod ws_session;

use futures_util::{Sink, Stream};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Notify;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Transport-neutral unit of traffic on a physical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<u16>),
    Heartbeat,
}

impl Frame {
    pub fn from_payload(payload: Vec<u8>) -> Self {
        match String::from_utf8(payload) {
            Ok(text) => Frame::Text(text),
            Err(error) => Frame::Binary(error.into_bytes()),
        }
    }

    /// Close frames the peer sends when it is done on purpose.
    pub fn is_clean_close(code: Option<u16>) -> bool {
        matches!(code, None | Some(CLOSE_NORMAL) | Some(CLOSE_GOING_AWAY))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Socket(#[from] axum::Error),
    #[error("link closed without a close frame")]
    LinkClosed,
    #[error("no connection for client {0}")]
    Detached(String),
    #[error("client {0} did not come back within the reattach window")]
    ReattachTimeout(String),
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// One physical connection, split into its write and read halves.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Holds sockets of returning clients until their session picks them up.
#[derive(Debug, Default)]
pub struct ReattachBroker {
    parked: StdMutex<HashMap<String, Connection>>,
    notify: Notify,
}

impl ReattachBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn park(&self, client_id: &str, connection: Connection) {
        let replaced = match self.parked.lock() {
            Ok(mut parked) => parked.insert(client_id.to_string(), connection).is_some(),
            Err(poisoned) => poisoned
                .into_inner()
                .insert(client_id.to_string(), connection)
                .is_some(),
        };
        if replaced {
            tracing::debug!(client_id, "replaced parked connection");
        }
        self.notify.notify_waiters();
    }

    pub fn is_parked(&self, client_id: &str) -> bool {
        match self.parked.lock() {
            Ok(parked) => parked.contains_key(client_id),
            Err(poisoned) => poisoned.into_inner().contains_key(client_id),
        }
    }

    pub fn discard(&self, client_id: &str) -> bool {
        self.take(client_id).is_some()
    }

    /// Removes and returns a connection already parked under `client_id`.
    pub fn take(&self, client_id: &str) -> Option<Connection> {
        match self.parked.lock() {
            Ok(mut parked) => parked.remove(client_id),
            Err(poisoned) => poisoned.into_inner().remove(client_id),
        }
    }

    /// Waits up to `window` for a connection parked under `client_id`.
    pub async fn dial(&self, client_id: &str, window: Duration) -> Result<Connection, TransportError> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let notified = self.notify.notified();
            if let Some(connection) = self.take(client_id) {
                return Ok(connection);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self
                    .take(client_id)
                    .ok_or_else(|| TransportError::ReattachTimeout(client_id.to_string()));
            }
        }
    }
}
