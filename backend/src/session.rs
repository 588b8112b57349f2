use crate::protocol::{decode_signal, encode_signal, SignalMessage};
use crate::queue::{MessageQueue, QueueError};
use crate::transport::{Connection, Frame, FrameSink, FrameStream, ReattachBroker, TransportError};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;


#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub send_buffer: usize,
    pub signal_buffer: usize,
    pub event_buffer: usize,
    pub reconnect_interval: Duration,
    pub max_retry_attempts: u32,
    pub reattach_window: Duration,
    pub queue_poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_buffer: 256,
            signal_buffer: 16,
            event_buffer: 16,
            reconnect_interval: Duration::from_secs(5),
            max_retry_attempts: 5,
            reattach_window: Duration::from_secs(10),
            queue_poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Reconnecting,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Login,
    Message(Vec<u8>),
    Signal(SignalMessage),
    Error(String),
    Reconnect { attempt: u32 },
    Logout,
}

/// Where a payload handed to [`Session::send`] ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Buffered,
    Queued,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkOutcome {
    Clean,
    Abnormal(String),
    Stopped,
}

enum Outgoing {
    Payload(Vec<u8>),
    Signal(SignalMessage),
}

#[derive(Debug)]
struct Outbound {
    direct: mpsc::Receiver<Vec<u8>>,
    signals: mpsc::Receiver<SignalMessage>,
}

/// A client connection that outlives individual sockets.
///
/// Identity is the client ID. The physical link can drop and be replaced
/// through the [`ReattachBroker`] without the rest of the server noticing,
/// apart from the events emitted along the way.
pub struct Session {
    id: String,
    config: SessionConfig,
    queue: Arc<MessageQueue>,
    broker: Arc<ReattachBroker>,
    state: StdMutex<SessionState>,
    retry_attempts: AtomicU32,
    direct_tx: StdMutex<Option<mpsc::Sender<Vec<u8>>>>,
    signal_tx: StdMutex<Option<mpsc::Sender<SignalMessage>>>,
    events_tx: StdMutex<Option<mpsc::Sender<SessionEvent>>>,
    outbound: Mutex<Option<Outbound>>,
    sink: Mutex<Option<FrameSink>>,
    shutdown: Notify,
    link_abandoned: AtomicBool,
    abandon: Notify,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("retry_attempts", &self.retry_attempts())
            .finish_non_exhaustive()
    }
}

fn locked<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        config: SessionConfig,
        queue: Arc<MessageQueue>,
        broker: Arc<ReattachBroker>,
    ) -> (Arc<Self>, mpsc::Receiver<SessionEvent>) {
        let (direct_tx, direct_rx) = mpsc::channel(config.send_buffer.max(1));
        let (signal_tx, signal_rx) = mpsc::channel(config.signal_buffer.max(1));
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));

        let session = Arc::new(Self {
            id: id.into(),
            config,
            queue,
            broker,
            state: StdMutex::new(SessionState::Connected),
            retry_attempts: AtomicU32::new(0),
            direct_tx: StdMutex::new(Some(direct_tx)),
            signal_tx: StdMutex::new(Some(signal_tx)),
            events_tx: StdMutex::new(Some(events_tx)),
            outbound: Mutex::new(Some(Outbound {
                direct: direct_rx,
                signals: signal_rx,
            })),
            sink: Mutex::new(None),
            shutdown: Notify::new(),
            link_abandoned: AtomicBool::new(false),
            abandon: Notify::new(),
        });
        (session, events_rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *locked(&self.state)
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: SessionState) {
        let mut current = locked(&self.state);
        if *current != SessionState::Closed {
            *current = state;
        }
    }

    /// Hands a payload to the outbound side without waiting on capacity.
    /// Overflow goes to the message queue.
    pub async fn send(&self, payload: Vec<u8>) -> Delivery {
        let sender = locked(&self.direct_tx).clone();
        let Some(sender) = sender else {
            tracing::debug!(client_id = %self.id, "send on closed session discarded");
            return Delivery::Discarded;
        };

        match sender.try_send(payload) {
            Ok(()) => Delivery::Buffered,
            Err(TrySendError::Full(payload)) => {
                self.enqueue(payload).await;
                Delivery::Queued
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(client_id = %self.id, "send on closed session discarded");
                Delivery::Discarded
            }
        }
    }

    pub fn send_signal(&self, signal: SignalMessage) -> bool {
        let sender = locked(&self.signal_tx).clone();
        let Some(sender) = sender else {
            tracing::debug!(client_id = %self.id, kind = %signal.kind, "signal for closed session dropped");
            return false;
        };
        match sender.try_send(signal) {
            Ok(()) => true,
            Err(TrySendError::Full(signal)) => {
                tracing::warn!(client_id = %self.id, kind = %signal.kind, "signal buffer full, dropping signal");
                false
            }
            Err(TrySendError::Closed(signal)) => {
                tracing::debug!(client_id = %self.id, kind = %signal.kind, "signal for closed session dropped");
                false
            }
        }
    }

    async fn enqueue(&self, payload: Vec<u8>) {
        match self.queue.enqueue(&self.id, payload).await {
            Ok(seq) => tracing::debug!(client_id = %self.id, seq, "payload queued"),
            Err(QueueError::Persist { seq, source, .. }) => {
                tracing::warn!(client_id = %self.id, seq, error = ?source, "queued payload not persisted");
            }
            Err(error) => tracing::warn!(client_id = %self.id, error = ?error, "failed to queue payload"),
        }
    }

    async fn emit(&self, event: SessionEvent) {
        let sender = locked(&self.events_tx).clone();
        let Some(sender) = sender else { return };
        if sender.send(event).await.is_err() {
            tracing::debug!(client_id = %self.id, "event queue closed");
        }
    }

    pub fn start(self: &Arc<Self>, connection: Connection) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(connection))
    }

    /// Asks the session to tear down. Takes effect at the next await point
    /// of the supervising task, even if that task has not started yet.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Gives up on the current physical link as if it had dropped, so the
    /// session goes through its reconnect path and picks up a newly parked
    /// socket. Used when a client returns while its old link looks alive.
    pub fn abandon_link(&self) {
        self.link_abandoned.store(true, Ordering::SeqCst);
        self.abandon.notify_waiters();
    }

    async fn abandoned(&self) {
        loop {
            let notified = self.abandon.notified();
            if self.link_abandoned.swap(false, Ordering::SeqCst) && self.broker.is_parked(&self.id) {
                return;
            }
            notified.await;
        }
    }

    /// Supervises the session until it is torn down.
    pub async fn run(self: Arc<Self>, connection: Connection) {
        let mut stream = self.attach(connection).await;
        self.set_state(SessionState::Connected);
        tracing::info!(client_id = %self.id, "session connected");
        self.emit(SessionEvent::Login).await;

        loop {
            match self.drive(stream).await {
                LinkOutcome::Clean => {
                    tracing::info!(client_id = %self.id, "client closed the connection");
                    break;
                }
                LinkOutcome::Stopped => {
                    tracing::info!(client_id = %self.id, "session stopped");
                    break;
                }
                LinkOutcome::Abnormal(reason) => {
                    tracing::warn!(client_id = %self.id, reason = %reason, "connection lost");
                    let Some(connection) = self.reconnect().await else { break };
                    stream = self.resume(connection).await;
                }
            }
        }

        self.teardown().await;
    }

    async fn attach(&self, connection: Connection) -> FrameStream {
        let Connection { sink, stream } = connection;
        *self.sink.lock().await = Some(sink);
        stream
    }

    async fn detach(&self) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(error) = sink.close().await {
                tracing::debug!(client_id = %self.id, error = ?error, "closing sink failed");
            }
        }
    }

    /// Runs both halves of one physical link until either finishes, then
    /// stops the other and waits for it.
    async fn drive(self: &Arc<Self>, stream: FrameStream) -> LinkOutcome {
        enum Finished {
            Inbound(LinkOutcome),
            Outbound(LinkOutcome),
            Abandoned,
            Stopped,
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut inbound = tokio::spawn(Arc::clone(self).read_loop(stream, stop_rx.clone()));
        let mut outbound = tokio::spawn(Arc::clone(self).write_loop(stop_rx));

        let finished = tokio::select! {
            result = &mut inbound => Finished::Inbound(settle(result)),
            result = &mut outbound => Finished::Outbound(settle(result)),
            _ = self.shutdown.notified() => Finished::Stopped,
            _ = self.abandoned() => Finished::Abandoned,
        };
        let _ = stop_tx.send(true);

        match finished {
            Finished::Inbound(outcome) => {
                settle(outbound.await);
                outcome
            }
            Finished::Outbound(outcome) => {
                settle(inbound.await);
                outcome
            }
            Finished::Abandoned => {
                settle(inbound.await);
                settle(outbound.await);
                LinkOutcome::Abnormal("replaced by a new connection".to_string())
            }
            Finished::Stopped => {
                settle(inbound.await);
                settle(outbound.await);
                LinkOutcome::Stopped
            }
        }
    }

    async fn read_loop(self: Arc<Self>, mut stream: FrameStream, mut stop: watch::Receiver<bool>) -> LinkOutcome {
        loop {
            let next = tokio::select! {
                _ = stop.changed() => return LinkOutcome::Stopped,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(Frame::Text(text))) => self.accept(text.into_bytes()).await,
                Some(Ok(Frame::Binary(data))) => self.accept(data).await,
                Some(Ok(Frame::Heartbeat)) => {}
                Some(Ok(Frame::Close(code))) => {
                    let reason = match code {
                        Some(code) => format!("connection closed with code {code}"),
                        None => "connection closed".to_string(),
                    };
                    self.emit(SessionEvent::Error(reason.clone())).await;
                    return if Frame::is_clean_close(code) {
                        LinkOutcome::Clean
                    } else {
                        LinkOutcome::Abnormal(reason)
                    };
                }
                Some(Err(error)) => {
                    let reason = error.to_string();
                    self.emit(SessionEvent::Error(reason.clone())).await;
                    return LinkOutcome::Abnormal(reason);
                }
                None => {
                    let reason = TransportError::LinkClosed.to_string();
                    self.emit(SessionEvent::Error(reason.clone())).await;
                    return LinkOutcome::Abnormal(reason);
                }
            }
        }
    }

    async fn accept(&self, data: Vec<u8>) {
        let event = match decode_signal(&data) {
            Some(signal) => SessionEvent::Signal(signal),
            None => SessionEvent::Message(data),
        };
        self.emit(event).await;
    }

    async fn write_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) -> LinkOutcome {
        let Some(mut outbound) = self.outbound.lock().await.take() else {
            return LinkOutcome::Abnormal("outbound buffers unavailable".to_string());
        };
        let outcome = self.pump(&mut outbound, &mut stop).await;
        *self.outbound.lock().await = Some(outbound);
        outcome
    }

    async fn pump(&self, outbound: &mut Outbound, stop: &mut watch::Receiver<bool>) -> LinkOutcome {
        loop {
            if *stop.borrow() {
                return LinkOutcome::Stopped;
            }

            let outgoing = if let Ok(payload) = outbound.direct.try_recv() {
                Outgoing::Payload(payload)
            } else if let Ok(signal) = outbound.signals.try_recv() {
                Outgoing::Signal(signal)
            } else if let Ok(payload) = self.queue.dequeue(&self.id).await {
                Outgoing::Payload(payload)
            } else {
                tokio::select! {
                    biased;
                    _ = stop.changed() => return LinkOutcome::Stopped,
                    Some(payload) = outbound.direct.recv() => Outgoing::Payload(payload),
                    Some(signal) = outbound.signals.recv() => Outgoing::Signal(signal),
                    _ = tokio::time::sleep(self.config.queue_poll_interval) => continue,
                }
            };

            if let Err(reason) = self.deliver(outgoing).await {
                self.emit(SessionEvent::Error(reason.clone())).await;
                return LinkOutcome::Abnormal(reason);
            }
        }
    }

    async fn deliver(&self, outgoing: Outgoing) -> Result<(), String> {
        match outgoing {
            Outgoing::Payload(payload) => {
                if let Err(error) = self.write(Frame::from_payload(payload.clone())).await {
                    self.enqueue(payload).await;
                    return Err(format!("write failed: {error}"));
                }
            }
            Outgoing::Signal(signal) => {
                let text = match encode_signal(&signal) {
                    Ok(text) => text,
                    Err(error) => {
                        tracing::warn!(client_id = %self.id, error = ?error, "failed to encode signal");
                        return Ok(());
                    }
                };
                if let Err(error) = self.write(Frame::Text(text)).await {
                    tracing::debug!(client_id = %self.id, kind = %signal.kind, "signal lost with the link");
                    return Err(format!("write failed: {error}"));
                }
            }
        }
        Ok(())
    }

    async fn write(&self, frame: Frame) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Err(TransportError::Detached(self.id.clone()));
        };
        sink.send(frame).await
    }

    /// One re-establish attempt per lost link. A failed attempt, or one the
    /// budget no longer allows, ends the session.
    async fn reconnect(&self) -> Option<Connection> {
        self.set_state(SessionState::Reconnecting);
        self.detach().await;

        if self.state() == SessionState::Closed {
            return None;
        }
        if self.retry_attempts() >= self.config.max_retry_attempts {
            tracing::warn!(
                client_id = %self.id,
                attempts = self.retry_attempts(),
                "retry budget exhausted"
            );
            return None;
        }

        let attempt = self.retry_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let queued = self.queue.queue_size(&self.id).await;
        tracing::info!(client_id = %self.id, attempt, queued, "reconnecting");
        self.emit(SessionEvent::Reconnect { attempt }).await;

        let dialed = match self.broker.take(&self.id) {
            Some(connection) => Ok(connection),
            None => tokio::select! {
                _ = self.shutdown.notified() => return None,
                dialed = async {
                    tokio::time::sleep(self.config.reconnect_interval).await;
                    self.broker.dial(&self.id, self.config.reattach_window).await
                } => dialed,
            },
        };

        match dialed {
            Ok(connection) => Some(connection),
            Err(error) => {
                tracing::warn!(client_id = %self.id, attempt, error = ?error, "reconnect failed");
                None
            }
        }
    }

    async fn resume(&self, connection: Connection) -> FrameStream {
        let stream = self.attach(connection).await;
        self.link_abandoned.store(false, Ordering::SeqCst);

        let backlog = self.queue.drain(&self.id).await;
        let replayed = backlog.len();
        for payload in backlog {
            if let Err(error) = self.write(Frame::from_payload(payload.clone())).await {
                tracing::debug!(client_id = %self.id, error = ?error, "replay write failed");
                self.enqueue(payload).await;
            }
        }

        self.retry_attempts.store(0, Ordering::SeqCst);
        self.set_state(SessionState::Connected);
        tracing::info!(client_id = %self.id, replayed, "session reconnected");
        stream
    }

    async fn teardown(&self) {
        *locked(&self.state) = SessionState::Closed;
        locked(&self.direct_tx).take();
        locked(&self.signal_tx).take();
        self.outbound.lock().await.take();
        self.detach().await;
        self.broker.discard(&self.id);
        self.queue.clear(&self.id).await;
        self.emit(SessionEvent::Logout).await;
        locked(&self.events_tx).take();
        tracing::info!(client_id = %self.id, "session closed");
    }
}

fn settle(result: Result<LinkOutcome, tokio::task::JoinError>) -> LinkOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(error) => LinkOutcome::Abnormal(format!("link task failed: {error}")),
    }
}
