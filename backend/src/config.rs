use crate::session::SessionConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub port: u16,
  pub database_url: String,
  pub session: SessionConfig,
}

impl ServerConfig {
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let millis = |key: &str, default| Duration::from_millis(parse_or(lookup(key), default));

    let database_url = lookup("DATABASE_URL").unwrap_or_else(|| {
      let base = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
      let default_path = base.join("data").join("message_queue.db");
      format!("sqlite://{}", default_path.display())
    });

    Self {
      port: parse_or(lookup("PORT"), 8080),
      database_url,
      session: SessionConfig {
        send_buffer: parse_or(lookup("SEND_BUFFER"), 256),
        signal_buffer: parse_or(lookup("SIGNAL_BUFFER"), 16),
        event_buffer: parse_or(lookup("EVENT_BUFFER"), 16),
        reconnect_interval: millis("RECONNECT_INTERVAL_MS", 5000),
        max_retry_attempts: parse_or(lookup("MAX_RETRY_ATTEMPTS"), 5),
        reattach_window: millis("REATTACH_WINDOW_MS", 10_000),
        queue_poll_interval: millis("QUEUE_POLL_INTERVAL_MS", 100),
      },
    }
  }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
  value
    .and_then(|value| value.trim().parse().ok())
    .unwrap_or(default)
}
