use super::world::{Fanout, World};
use crate::protocol::{decode_game_message, SignalMessage};
use crate::session::{Session, SessionEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Consumes one session's events until the session closes its queue, then
/// removes the session and its player from the world.
pub async fn run(world: Arc<World>, session: Arc<Session>, mut events: mpsc::Receiver<SessionEvent>) {
    let client_id = session.id().to_string();
    let client_id = client_id.as_str();

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Login => {
                for fanout in world.login(client_id).await {
                    fanout.deliver().await;
                }
            }
            SessionEvent::Message(data) => match handle_payload(&world, client_id, &data).await {
                Some(fanout) if !fanout.is_empty() => fanout.deliver().await,
                Some(_) => tracing::trace!(client_id, "message produced no updates"),
                None => {}
            },
            SessionEvent::Signal(signal) => relay(&world, client_id, &signal).await,
            SessionEvent::Error(reason) => {
                tracing::debug!(client_id, reason = %reason, "session error");
            }
            SessionEvent::Reconnect { attempt } => {
                tracing::info!(client_id, attempt, "session reconnecting");
            }
            SessionEvent::Logout => {
                tracing::info!(client_id, "session logged out");
            }
        }
    }

    world.unregister(&session).await.deliver().await;
    let players = world.player_count().await;
    tracing::info!(client_id, players, "player removed");
}

async fn handle_payload(world: &World, client_id: &str, data: &[u8]) -> Option<Fanout> {
    match decode_game_message(data) {
        Ok(message) => Some(world.handle_message(client_id, message).await),
        Err(error) => {
            tracing::warn!(client_id, error = %error, "discarding client message");
            None
        }
    }
}

async fn relay(world: &World, client_id: &str, signal: &SignalMessage) {
    let Some(kind) = signal.known_kind() else {
        tracing::warn!(client_id, kind = %signal.kind, "unknown signal type dropped");
        return;
    };
    let delivered = world.relay_signal(client_id, signal).await;
    tracing::debug!(client_id, ?kind, delivered, "signal relayed");
}
