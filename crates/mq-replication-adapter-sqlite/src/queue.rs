//! `SQLite` master queue.

use crate::now_ms;
use mq_replication_core::{
    Envelope, ReceivedStamp, StampKind, Transport, TransportError, TransportMessageIdStamp,
};
use mq_replication_proto::messages::{decode_envelope, encode_envelope};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_REDELIVER_TIMEOUT: Duration = Duration::from_secs(3600);

/// `SQLite`-backed queue transport.
///
/// Rows move `pending` -> `delivered` on `get`; `ack` deletes a delivered row
/// and `reject` marks it `rejected`. A row left `delivered` for longer than the
/// redelivery timeout is claimed again by the next `get`.
pub struct SqliteQueue {
    conn: Mutex<Connection>,
    queue_name: String,
    batch_size: usize,
    redeliver_timeout: Duration,
}

impl SqliteQueue {
    /// Open or create a queue database.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or initialized.
    pub fn open(path: &Path, queue_name: impl Into<String>) -> SqliteResult<Self> {
        Self::with_connection(Connection::open(path)?, queue_name.into())
    }

    /// Create an in-memory queue (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be created.
    pub fn in_memory(queue_name: impl Into<String>) -> SqliteResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, queue_name.into())
    }

    fn with_connection(conn: Connection, queue_name: String) -> SqliteResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            queue_name,
            batch_size: DEFAULT_BATCH_SIZE,
            redeliver_timeout: DEFAULT_REDELIVER_TIMEOUT,
        })
    }

    /// Set how many rows a single `get` may claim.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set how long a delivered but unsettled row waits before it is redelivered.
    #[must_use]
    pub fn with_redeliver_timeout(mut self, timeout: Duration) -> Self {
        self.redeliver_timeout = timeout;
        self
    }

    /// Queue name used to partition the table.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Number of rows delivered but not yet acked or rejected.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn delivered_count(&self) -> Result<u64, TransportError> {
        self.count_status("delivered")
    }

    /// Number of messages waiting to be received.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn pending_count(&self) -> Result<u64, TransportError> {
        self.count_status("pending")
    }

    /// Number of rejected messages.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn rejected_count(&self) -> Result<u64, TransportError> {
        self.count_status("rejected")
    }

    fn count_status(&self, status: &str) -> Result<u64, TransportError> {
        let count: i64 = self
            .lock()?
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE queue_name = ?1 AND status = ?2",
                params![self.queue_name, status],
                |row| row.get(0),
            )
            .map_err(db_error)?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TransportError> {
        self.conn
            .lock()
            .map_err(|_| TransportError::Primary("sqlite connection poisoned".to_string()))
    }

    fn row_id(envelope: &Envelope) -> Result<i64, TransportError> {
        let stamp = envelope.last::<TransportMessageIdStamp>().ok_or_else(|| {
            TransportError::UnknownMessage("envelope has no transport message id".to_string())
        })?;

        stamp
            .id()
            .parse()
            .map_err(|_| TransportError::UnknownMessage(stamp.id().to_string()))
    }

    fn settle(
        &self,
        envelope: &Envelope,
        op: impl FnOnce(&Connection, i64) -> SqliteResult<usize>,
    ) -> Result<(), TransportError> {
        let id = Self::row_id(envelope)?;
        let changed = op(&*self.lock()?, id).map_err(db_error)?;

        if changed == 0 {
            return Err(TransportError::UnknownMessage(id.to_string()));
        }

        Ok(())
    }
}

fn init_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            queue_name TEXT NOT NULL,
            envelope BLOB NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL,
            delivered_at INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_messages_queue_status
            ON messages(queue_name, status, id);
        ",
    )
}

fn db_error(err: rusqlite::Error) -> TransportError {
    TransportError::Primary(err.to_string())
}

impl Transport for SqliteQueue {
    fn send(&self, envelope: Envelope) -> Result<Envelope, TransportError> {
        let stored = envelope.without_kind(StampKind::TransportMessageId);
        let bytes = encode_envelope(&stored).map_err(|e| TransportError::Primary(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (queue_name, envelope, status, created_at)
             VALUES (?1, ?2, 'pending', ?3)",
            params![self.queue_name, bytes, now_ms()],
        )
        .map_err(db_error)?;
        let id = conn.last_insert_rowid();

        tracing::debug!(queue = %self.queue_name, id, "Queued message");

        Ok(stored.with(TransportMessageIdStamp::new(id.to_string())))
    }

    fn get(&self) -> Result<Vec<Envelope>, TransportError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_error)?;

        let delivered_at = now_ms();
        let timeout_ms = i64::try_from(self.redeliver_timeout.as_millis()).unwrap_or(i64::MAX);
        let redeliver_before = delivered_at.saturating_sub(timeout_ms);

        let rows: Vec<(i64, Vec<u8>)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, envelope FROM messages
                     WHERE queue_name = ?1
                       AND (status = 'pending'
                            OR (status = 'delivered' AND delivered_at < ?3))
                     ORDER BY id ASC
                     LIMIT ?2",
                )
                .map_err(db_error)?;
            let limit = i64::try_from(self.batch_size).unwrap_or(i64::MAX);
            let mapped = stmt
                .query_map(params![self.queue_name, limit, redeliver_before], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(db_error)?;
            let rows: Vec<(i64, Vec<u8>)> =
                mapped.collect::<SqliteResult<_>>().map_err(db_error)?;
            rows
        };

        let mut envelopes = Vec::with_capacity(rows.len());
        for (id, bytes) in rows {
            tx.execute(
                "UPDATE messages SET status = 'delivered', delivered_at = ?2 WHERE id = ?1",
                params![id, delivered_at],
            )
            .map_err(db_error)?;

            let envelope =
                decode_envelope(&bytes).map_err(|e| TransportError::Primary(e.to_string()))?;
            envelopes.push(
                envelope
                    .with(TransportMessageIdStamp::new(id.to_string()))
                    .with(ReceivedStamp::now(self.queue_name.as_str())),
            );
        }

        tx.commit().map_err(db_error)?;

        if !envelopes.is_empty() {
            tracing::debug!(queue = %self.queue_name, count = envelopes.len(), "Claimed messages");
        }

        Ok(envelopes)
    }

    fn ack(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.settle(envelope, |conn, id| {
            conn.execute(
                "DELETE FROM messages
                 WHERE id = ?1 AND queue_name = ?2 AND status = 'delivered'",
                params![id, self.queue_name],
            )
        })
    }

    fn reject(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.settle(envelope, |conn, id| {
            conn.execute(
                "UPDATE messages SET status = 'rejected', delivered_at = ?3
                 WHERE id = ?1 AND queue_name = ?2 AND status = 'delivered'",
                params![id, self.queue_name, now_ms()],
            )
        })
    }
}
