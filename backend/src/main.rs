use axum::{
  extract::ws::WebSocket,
  extract::{State, WebSocketUpgrade},
  http::{HeaderMap, Method},
  response::IntoResponse,
  routing::get,
  Json, Router,
};
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

mod config;
mod game;
mod protocol;
mod queue;
mod session;
mod shared;
mod transport;

use config::ServerConfig;
use game::world::World;
use queue::MessageQueue;
use session::{Session, SessionConfig, SessionState};
use transport::{Connection, ReattachBroker};

const CLIENT_ID_HEADER: &str = "x-client-id";

struct AppState {
  world: Arc<World>,
  queue: Arc<MessageQueue>,
  broker: Arc<ReattachBroker>,
  session_config: SessionConfig,
}

#[derive(Debug, Serialize)]
struct OkResponse {
  ok: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let config = ServerConfig::from_env();
  ensure_db_dir(&config.database_url)?;

  let db = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(&config.database_url)
    .await?;
  sqlx::migrate!("./migrations").run(&db).await?;

  let state = Arc::new(AppState {
    world: Arc::new(World::new()),
    queue: Arc::new(MessageQueue::new(db)),
    broker: Arc::new(ReattachBroker::new()),
    session_config: config.session.clone(),
  });

  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods([Method::GET])
    .allow_headers(Any);

  let app: Router = Router::new()
    .route("/api/health", get(health))
    .route("/ws", get(ws_handler))
    .layer(cors)
    .with_state(state);

  let address = format!("0.0.0.0:{}", config.port);
  tracing::info!("listening on {address}");

  let listener = tokio::net::TcpListener::bind(&address).await?;
  axum::serve(listener, app).await?;

  Ok(())
}

fn ensure_db_dir(database_url: &str) -> anyhow::Result<()> {
  if database_url.starts_with("sqlite::memory:") {
    return Ok(());
  }
  let path = database_url
    .strip_prefix("sqlite://")
    .or_else(|| database_url.strip_prefix("sqlite:"));
  let Some(path) = path else { return Ok(()) };
  let path = path.split('?').next().unwrap_or(path);
  if path.is_empty() || path == ":memory:" {
    return Ok(());
  }
  let db_path = PathBuf::from(path);
  if let Some(parent) = db_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  if !db_path.exists() {
    let _ = std::fs::File::create(&db_path)?;
  }
  Ok(())
}

async fn health() -> impl IntoResponse {
  Json(OkResponse { ok: true })
}

async fn ws_handler(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> impl IntoResponse {
  let supplied = headers
    .get(CLIENT_ID_HEADER)
    .and_then(|value| value.to_str().ok());
  let client_id = shared::ids::resolve_client_id(supplied);

  if let Some(existing) = state.world.session(&client_id).await {
    if existing.state() != SessionState::Closed {
      let broker = Arc::clone(&state.broker);
      return ws
        .on_upgrade(move |socket| reattach(socket, broker, existing))
        .into_response();
    }
  }

  ws.on_upgrade(move |socket| start_session(socket, state, client_id))
    .into_response()
}

async fn reattach(socket: WebSocket, broker: Arc<ReattachBroker>, session: Arc<Session>) {
  let client_id = session.id();
  broker.park(client_id, Connection::from_websocket(socket));
  match session.state() {
    SessionState::Closed => {
      broker.discard(client_id);
      tracing::debug!(client_id, "session closed before reattach");
    }
    SessionState::Connected => {
      tracing::info!(client_id, "client returned while connected, taking over link");
      session.abandon_link();
    }
    SessionState::Reconnecting => {
      tracing::info!(client_id, "client reattaching");
    }
  }
}

async fn start_session(socket: WebSocket, state: Arc<AppState>, client_id: String) {
  let (session, events) = Session::new(
    client_id.clone(),
    state.session_config.clone(),
    Arc::clone(&state.queue),
    Arc::clone(&state.broker),
  );
  state.world.register(Arc::clone(&session)).await;
  tokio::spawn(game::dispatch::run(
    Arc::clone(&state.world),
    Arc::clone(&session),
    events,
  ));

  tracing::info!(client_id = %client_id, "client connected");
  session.run(Connection::from_websocket(socket)).await;
}
