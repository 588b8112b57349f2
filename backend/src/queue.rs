use sqlx::SqlitePool;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("no messages for client {0}")]
    Empty(String),
    #[error("failed to persist message {seq} for client {client_id}: {source}")]
    Persist {
        client_id: String,
        seq: i64,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Debug)]
struct ClientQueue {
    next_seq: i64,
    pending: VecDeque<Vec<u8>>,
}

/// Per-client FIFO of overflow payloads, mirrored to SQLite.
///
/// One lock covers the in-memory queues and the mirror write so the two are
/// never observed out of step.
#[derive(Debug)]
pub struct MessageQueue {
    queues: Mutex<HashMap<String, ClientQueue>>,
    db: SqlitePool,
}

impl MessageQueue {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            db,
        }
    }

    /// Appends to the client's queue, then mirrors it. A mirror failure is
    /// reported but the in-memory entry stays.
    pub async fn enqueue(&self, client_id: &str, payload: Vec<u8>) -> Result<i64, QueueError> {
        let mut queues = self.queues.lock().await;
        let queue = match queues.entry(client_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(ClientQueue {
                next_seq: self.next_persisted_seq(client_id).await,
                pending: VecDeque::new(),
            }),
        };
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.pending.push_back(payload.clone());

        let result = sqlx::query(
            "INSERT OR REPLACE INTO queued_messages (client_id, seq, payload, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(client_id)
        .bind(seq)
        .bind(payload)
        .bind(current_time_millis())
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(seq),
            Err(source) => Err(QueueError::Persist {
                client_id: client_id.to_string(),
                seq,
                source,
            }),
        }
    }

    /// First free sequence for a client with no in-memory queue. Continues
    /// after rows left in the mirror by an earlier session.
    async fn next_persisted_seq(&self, client_id: &str) -> i64 {
        let max = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(seq) FROM queued_messages WHERE client_id = ?",
        )
        .bind(client_id)
        .fetch_one(&self.db)
        .await;
        match max {
            Ok(max) => max.map_or(0, |seq| seq + 1),
            Err(error) => {
                tracing::warn!(client_id, error = ?error, "failed to read mirrored sequence");
                0
            }
        }
    }

    pub async fn dequeue(&self, client_id: &str) -> Result<Vec<u8>, QueueError> {
        let mut queues = self.queues.lock().await;
        queues
            .get_mut(client_id)
            .and_then(|queue| queue.pending.pop_front())
            .ok_or_else(|| QueueError::Empty(client_id.to_string()))
    }

    /// Removes and returns everything pending for the client, oldest first.
    pub async fn drain(&self, client_id: &str) -> Vec<Vec<u8>> {
        let mut queues = self.queues.lock().await;
        queues
            .get_mut(client_id)
            .map(|queue| queue.pending.drain(..).collect())
            .unwrap_or_default()
    }

    pub async fn queue_size(&self, client_id: &str) -> usize {
        let queues = self.queues.lock().await;
        queues
            .get(client_id)
            .map(|queue| queue.pending.len())
            .unwrap_or(0)
    }

    /// Forgets the client's in-memory queue. Mirrored rows stay, and the next
    /// enqueue continues their sequence.
    pub async fn clear(&self, client_id: &str) {
        let mut queues = self.queues.lock().await;
        queues.remove(client_id);
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.queues.lock().await.len()
    }
}

fn current_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations apply");
    pool
}
