use super::*;
use crate::game::land::LandGrid;
use crate::game::types::Point;
use crate::queue::{memory_pool, MessageQueue};
use crate::session::SessionConfig;
use crate::transport::ReattachBroker;

fn player_at(id: &str, x: f64, y: f64) -> Player {
  let mut player = Player::spawn_at(id, 20, 15);
  player.position = Point::new(x, y);
  player
}

fn make_state(players: Vec<Player>) -> WorldState {
  WorldState {
    sessions: HashMap::new(),
    players: players
      .into_iter()
      .map(|player| (player.id.clone(), player))
      .collect(),
  }
}

async fn make_session(id: &str) -> Arc<Session> {
  let queue = Arc::new(MessageQueue::new(memory_pool().await));
  let broker = Arc::new(ReattachBroker::new());
  let (session, _events) = Session::new(id, SessionConfig::default(), queue, broker);
  session
}

#[test]
fn crossing_a_trail_kills_runner_and_transfers_land() {
  let runner = player_at("a", 400.0, 300.0);
  let mut owner = player_at("b", 100.0, 100.0);
  owner.land = LandGrid::for_field();
  owner.land.set(0, 0);
  owner.trail = vec![Point::new(400.0, 250.0), Point::new(405.0, 300.0)];
  let runner_land = runner.land.clone();
  let mut state = make_state(vec![runner, owner]);

  let messages = state.handle_move("a", Direction::Right);

  assert!(!state.players.contains_key("a"));
  let owner = &state.players["b"];
  assert_eq!(owner.kill_streak, 1);
  assert!((owner.speed_multiplier - 1.01).abs() < 1e-9);
  assert!(owner.land.get(0, 0));
  for (col, row) in runner_land.owned_cells() {
    assert!(owner.land.get(col, row));
  }
  assert_eq!(owner.land.owned_count(), runner_land.owned_count() + 1);

  assert_eq!(messages.len(), 2);
  match &messages[0] {
    ServerMessage::RemovePlayer(state) => {
      assert_eq!(state.id, "a");
      assert!(!state.is_alive);
    }
    other => panic!("expected removePlayer, got {other:?}"),
  }
  assert!(matches!(&messages[1], ServerMessage::UpdatePlayer(state) if state.id == "b"));
}

#[test]
fn runner_on_own_old_trail_dies() {
  let mut runner = player_at("a", 100.0, 100.0);
  runner.trail = vec![
    Point::new(105.0, 60.0),
    Point::new(105.0, 100.0),
    Point::new(105.0, 150.0),
    Point::new(100.0, 150.0),
    Point::new(100.0, 100.0),
  ];
  let mut state = make_state(vec![runner]);

  let messages = state.handle_move("a", Direction::Right);

  assert!(state.players.is_empty());
  assert!(matches!(&messages[..], [ServerMessage::RemovePlayer(state)] if state.id == "a"));
}

#[test]
fn closing_a_loop_reports_captured_cells() {
  let mut runner = player_at("a", 50.0, 40.0);
  runner.trail = vec![
    Point::new(45.0, 40.0),
    Point::new(45.0, 100.0),
    Point::new(105.0, 100.0),
    Point::new(105.0, 40.0),
  ];
  let mut state = make_state(vec![runner]);

  let messages = state.handle_move("a", Direction::Left);

  assert_eq!(messages.len(), 2);
  match &messages[0] {
    ServerMessage::CaptureTerritory(capture) => {
      assert_eq!(capture.id, "a");
      assert_eq!(capture.land_capture.owned_count(), 9);
      assert!(capture.land_capture.get(3, 2));
      assert!(capture.land_capture.get(5, 4));
    }
    other => panic!("expected captureTerritory, got {other:?}"),
  }
  let player = &state.players["a"];
  assert!(player.trail.is_empty());
  assert!(player.land.get(4, 3));
}

#[test]
fn plain_move_broadcasts_update() {
  let mut state = make_state(vec![player_at("a", 400.0, 300.0)]);

  let messages = state.handle_move("a", Direction::Down);

  assert!(matches!(
    &messages[..],
    [ServerMessage::UpdatePlayer(update)] if update.y == 305.0 && update.player_trail.len() == 1
  ));
}

#[test]
fn moves_for_absent_players_change_nothing() {
  let mut state = make_state(vec![player_at("a", 400.0, 300.0)]);
  assert!(state.handle_move("ghost", Direction::Up).is_empty());
  assert!(state.handle_capture("ghost").is_empty());
  assert_eq!(state.players["a"].position, Point::new(400.0, 300.0));
}

#[test]
fn capture_request_extends_trail_and_tries_closure() {
  let mut runner = player_at("a", 45.0, 40.0);
  runner.trail = vec![
    Point::new(45.0, 40.0),
    Point::new(45.0, 100.0),
    Point::new(105.0, 100.0),
    Point::new(105.0, 40.0),
  ];
  let mut state = make_state(vec![runner]);

  let messages = state.handle_capture("a");

  assert!(matches!(&messages[0], ServerMessage::CaptureTerritory(_)));
  assert!(state.players["a"].trail.is_empty());

  let messages = state.handle_capture("a");
  assert!(matches!(&messages[..], [ServerMessage::UpdatePlayer(_)]));
  assert_eq!(state.players["a"].trail.len(), 1);
}

#[test]
fn join_respawns_and_applies_sanitized_profile() {
  let mut state = make_state(Vec::new());

  let messages = state.handle_join(
    "a",
    Some("  Ada   Lovelace ".to_string()),
    Some("#FF00aa".to_string()),
  );

  let player = &state.players["a"];
  assert!(player.alive);
  assert_eq!(player.name, "Ada Lovelace");
  assert_eq!(player.color, "#ff00aa");
  assert!(matches!(&messages[..], [ServerMessage::UpdatePlayer(update)] if update.id == "a"));

  state.handle_join("a", None, Some("red".to_string()));
  let player = &state.players["a"];
  assert_eq!(player.name, "Ada Lovelace");
  assert_eq!(player.color, "#ff00aa");
}

#[tokio::test]
async fn unregister_ignores_replaced_sessions() {
  let world = World::new();
  let first = make_session("a").await;
  let second = make_session("a").await;
  world.register(Arc::clone(&first)).await;
  world.register(Arc::clone(&second)).await;
  assert_eq!(world.player_count().await, 1);

  let fanout = world.unregister(&first).await;
  assert!(fanout.is_empty());
  assert_eq!(world.player_count().await, 1);
  assert!(world.session("a").await.is_some_and(|current| Arc::ptr_eq(&current, &second)));

  world.unregister(&second).await;
  assert_eq!(world.player_count().await, 0);
  assert!(world.session("a").await.is_none());
}

#[tokio::test]
async fn login_welcomes_newcomer_and_announces_it() {
  let world = World::new();
  let a = make_session("a").await;
  let b = make_session("b").await;
  world.register(Arc::clone(&a)).await;
  world.register(Arc::clone(&b)).await;

  let fanouts = world.login("b").await;

  assert_eq!(fanouts.len(), 2);
  assert_eq!(fanouts[0].targets.len(), 1);
  assert!(Arc::ptr_eq(&fanouts[0].targets[0], &b));
  assert_eq!(fanouts[0].payloads.len(), 2);
  assert_eq!(fanouts[1].targets.len(), 1);
  assert!(Arc::ptr_eq(&fanouts[1].targets[0], &a));
  let announced: serde_json::Value = serde_json::from_slice(&fanouts[1].payloads[0]).unwrap();
  assert_eq!(announced["type"], "updatePlayer");
  assert_eq!(announced["payload"]["id"], "b");
}

#[tokio::test]
async fn signals_reach_every_other_session() {
  let world = World::new();
  for id in ["a", "b", "c"] {
    world.register(make_session(id).await).await;
  }
  let signal = SignalMessage {
    kind: "offer".to_string(),
    content: "sdp".to_string(),
  };

  assert_eq!(world.relay_signal("a", &signal).await, 2);
}
