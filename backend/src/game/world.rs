use super::input::Direction;
use super::territory::{apply_move, credit_kill, find_trail_owner, hits_own_trail, try_capture};
use super::types::{CaptureState, Player};
use crate::protocol::{encode_server_message, GameMessage, ServerMessage, SignalMessage};
use crate::session::Session;
use crate::shared::names::{sanitize_color, sanitize_player_name};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[cfg(test)]
mod tests;

/// Players and the sessions driving them, behind one lock.
pub struct World {
  state: Mutex<WorldState>,
}

#[derive(Default)]
pub struct WorldState {
  sessions: HashMap<String, Arc<Session>>,
  players: HashMap<String, Player>,
}

/// Encoded payloads bound for a set of sessions. Built under the world lock,
/// delivered after it is released.
#[derive(Default)]
pub struct Fanout {
  targets: Vec<Arc<Session>>,
  payloads: Vec<Vec<u8>>,
}

impl Fanout {
  fn new(targets: Vec<Arc<Session>>, messages: &[ServerMessage]) -> Self {
    let payloads = messages
      .iter()
      .filter_map(|message| match encode_server_message(message) {
        Ok(payload) => Some(payload),
        Err(error) => {
          tracing::warn!(error = ?error, "failed to encode server message");
          None
        }
      })
      .collect();
    Self { targets, payloads }
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty() || self.payloads.is_empty()
  }

  pub async fn deliver(self) {
    for payload in &self.payloads {
      for target in &self.targets {
        target.send(payload.clone()).await;
      }
    }
  }
}

impl Default for World {
  fn default() -> Self {
    Self::new()
  }
}

impl World {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(WorldState::default()),
    }
  }

  /// Binds a session to its client ID, spawning the player on first sight.
  pub async fn register(&self, session: Arc<Session>) {
    let mut state = self.state.lock().await;
    let id = session.id().to_string();
    state
      .players
      .entry(id.clone())
      .or_insert_with(|| Player::spawn(&id));
    if state.sessions.insert(id.clone(), session).is_some() {
      tracing::debug!(client_id = %id, "replaced registered session");
    }
  }

  pub async fn session(&self, client_id: &str) -> Option<Arc<Session>> {
    let state = self.state.lock().await;
    state.sessions.get(client_id).cloned()
  }

  /// Snapshot of every player for the newcomer, and the newcomer's player for everyone else.
  pub async fn login(&self, client_id: &str) -> Vec<Fanout> {
    let state = self.state.lock().await;
    let mut fanouts = Vec::new();
    if let Some(session) = state.sessions.get(client_id) {
      fanouts.push(Fanout::new(vec![Arc::clone(session)], &state.snapshots()));
    }
    if let Some(player) = state.players.get(client_id) {
      fanouts.push(Fanout::new(
        state.others(client_id),
        &[ServerMessage::UpdatePlayer(player.snapshot())],
      ));
    }
    fanouts
  }

  pub async fn handle_message(&self, client_id: &str, message: GameMessage) -> Fanout {
    let mut state = self.state.lock().await;
    let messages = match message {
      GameMessage::Move(direction) => state.handle_move(client_id, direction),
      GameMessage::Capture => state.handle_capture(client_id),
      GameMessage::Join { name, color } => state.handle_join(client_id, name, color),
      GameMessage::Chat(text) => {
        tracing::info!(client_id, text = text.as_deref().unwrap_or(""), "chat");
        Vec::new()
      }
    };
    Fanout::new(state.recipients(), &messages)
  }

  /// Forwards a negotiation signal to every other session. Returns how many accepted it.
  pub async fn relay_signal(&self, client_id: &str, signal: &SignalMessage) -> usize {
    let others = {
      let state = self.state.lock().await;
      state.others(client_id)
    };
    others
      .iter()
      .filter(|session| session.send_signal(signal.clone()))
      .count()
  }

  /// Drops the session and its player if `session` is still the one registered.
  pub async fn unregister(&self, session: &Arc<Session>) -> Fanout {
    let mut state = self.state.lock().await;
    let id = session.id();
    let registered = state
      .sessions
      .get(id)
      .map(|current| Arc::ptr_eq(current, session))
      .unwrap_or(false);
    if !registered {
      tracing::debug!(client_id = %id, "session already replaced, keeping registration");
      return Fanout::default();
    }
    state.sessions.remove(id);
    let messages: Vec<ServerMessage> = state.handle_death(id).into_iter().collect();
    Fanout::new(state.recipients(), &messages)
  }

  pub async fn player_count(&self) -> usize {
    self.state.lock().await.players.len()
  }
}

impl WorldState {
  fn recipients(&self) -> Vec<Arc<Session>> {
    self.sessions.values().cloned().collect()
  }

  fn others(&self, client_id: &str) -> Vec<Arc<Session>> {
    self
      .sessions
      .iter()
      .filter(|(id, _)| id.as_str() != client_id)
      .map(|(_, session)| Arc::clone(session))
      .collect()
  }

  fn snapshots(&self) -> Vec<ServerMessage> {
    self
      .players
      .values()
      .map(|player| ServerMessage::UpdatePlayer(player.snapshot()))
      .collect()
  }

  /// Move, capture check, self collision, cross collision. In that order.
  fn handle_move(&mut self, player_id: &str, direction: Direction) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    let self_hit = {
      let Some(player) = self.players.get_mut(player_id) else {
        tracing::debug!(player_id, "move for absent player ignored");
        return messages;
      };
      apply_move(player, direction);
      if let Some(captured) = try_capture(player) {
        tracing::debug!(player_id, cells = captured.owned_count(), "territory captured");
        messages.push(ServerMessage::CaptureTerritory(CaptureState {
          id: player.id.clone(),
          land_capture: captured,
        }));
      }
      hits_own_trail(player)
    };

    if self_hit {
      tracing::debug!(player_id, "ran into own trail");
      messages.extend(self.handle_death(player_id));
      return messages;
    }

    if let Some(killer_id) = find_trail_owner(&self.players, player_id) {
      let victim_land = self.players.get(player_id).map(|victim| victim.land.clone());
      messages.extend(self.handle_death(player_id));
      if let (Some(land), Some(killer)) = (victim_land, self.players.get_mut(&killer_id)) {
        credit_kill(killer, &land);
        tracing::debug!(player_id, killer_id = %killer.id, kill_streak = killer.kill_streak, "trail cut");
        messages.push(ServerMessage::UpdatePlayer(killer.snapshot()));
      }
      return messages;
    }

    if let Some(player) = self.players.get(player_id) {
      messages.push(ServerMessage::UpdatePlayer(player.snapshot()));
    }
    messages
  }

  fn handle_capture(&mut self, player_id: &str) -> Vec<ServerMessage> {
    let Some(player) = self.players.get_mut(player_id) else { return Vec::new() };
    let position = player.position;
    player.trail.push(position);
    let mut messages = Vec::new();
    if let Some(captured) = try_capture(player) {
      messages.push(ServerMessage::CaptureTerritory(CaptureState {
        id: player.id.clone(),
        land_capture: captured,
      }));
    }
    messages.push(ServerMessage::UpdatePlayer(player.snapshot()));
    messages
  }

  fn handle_join(
    &mut self,
    player_id: &str,
    name: Option<String>,
    color: Option<String>,
  ) -> Vec<ServerMessage> {
    let player = self.players.entry(player_id.to_string()).or_insert_with(|| {
      tracing::debug!(player_id, "player spawned");
      Player::spawn(player_id)
    });
    if let Some(name) = name {
      let fallback = player.name.clone();
      player.name = sanitize_player_name(&name, &fallback);
    }
    if let Some(color) = color.as_deref().and_then(sanitize_color) {
      player.color = color;
    }
    vec![ServerMessage::UpdatePlayer(player.snapshot())]
  }

  fn handle_death(&mut self, player_id: &str) -> Option<ServerMessage> {
    let mut player = self.players.remove(player_id)?;
    player.alive = false;
    player.trail.clear();
    tracing::debug!(player_id, kill_streak = player.kill_streak, "player died");
    Some(ServerMessage::RemovePlayer(player.snapshot()))
  }
}
