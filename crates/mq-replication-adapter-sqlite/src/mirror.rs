//! `SQLite` mirror slave.
//!
//! Keeps one row per replication message id, tracking where the master copy
//! is in its lifecycle:
//! - `after-send` upserts the row as `pending`
//! - `after-get` marks it `delivered`
//! - `after-ack` deletes it
//! - `after-reject` marks it `rejected`

use crate::now_ms;
use mq_replication_core::{
    ChannelNameStamp, Envelope, MessageIdentityStamp, SlaveError, SlaveReceiver,
};
use mq_replication_proto::messages::{decode_envelope, encode_envelope};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Lifecycle state of a mirrored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// Sent, not yet received
    Pending,
    /// Received, not yet settled
    Delivered,
    /// Rejected by the consumer
    Rejected,
}

impl MirrorState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Slave receiver mirroring master operations into a `SQLite` table.
pub struct SqliteMirror {
    name: String,
    conn: Mutex<Connection>,
}

impl SqliteMirror {
    /// Open or create a mirror database.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or initialized.
    pub fn open(path: &Path) -> SqliteResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory mirror (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be created.
    pub fn in_memory() -> SqliteResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SqliteResult<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS mirror (
                message_id TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                envelope BLOB NOT NULL,
                state TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_mirror_channel_state ON mirror(channel, state);
            ",
        )?;

        Ok(Self {
            name: "sqlite-mirror".to_string(),
            conn: Mutex::new(conn),
        })
    }

    /// Override the name reported in logs and errors.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// State of a mirrored message, if present.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn state_of(&self, message_id: &str) -> Result<Option<MirrorState>, SlaveError> {
        let state: Option<String> = self
            .lock()?
            .query_row(
                "SELECT state FROM mirror WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;

        Ok(state.as_deref().and_then(MirrorState::from_name))
    }

    /// Mirrored envelope for a message id, if present.
    ///
    /// # Errors
    ///
    /// Returns error if the query or decoding fails.
    pub fn envelope_of(&self, message_id: &str) -> Result<Option<Envelope>, SlaveError> {
        let bytes: Option<Vec<u8>> = self
            .lock()?
            .query_row(
                "SELECT envelope FROM mirror WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;

        bytes
            .map(|bytes| decode_envelope(&bytes).map_err(|e| SlaveError::new(e.to_string())))
            .transpose()
    }

    /// Number of mirrored messages on `channel`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn count(&self, channel: &str) -> Result<u64, SlaveError> {
        let count: i64 = self
            .lock()?
            .query_row(
                "SELECT COUNT(*) FROM mirror WHERE channel = ?1",
                params![channel],
                |row| row.get(0),
            )
            .map_err(db_error)?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SlaveError> {
        self.conn
            .lock()
            .map_err(|_| SlaveError::new("mirror connection poisoned"))
    }

    fn keys(envelope: &Envelope) -> Result<(String, String), SlaveError> {
        let message_id = envelope
            .last::<MessageIdentityStamp>()
            .ok_or_else(|| SlaveError::new("envelope has no replication message id"))?;
        let channel = envelope
            .last::<ChannelNameStamp>()
            .ok_or_else(|| SlaveError::new("envelope has no channel name"))?;

        Ok((message_id.to_string(), channel.name().to_string()))
    }

    fn upsert(&self, envelope: &Envelope, state: MirrorState) -> Result<(), SlaveError> {
        let (message_id, channel) = Self::keys(envelope)?;
        let bytes = encode_envelope(envelope).map_err(|e| SlaveError::new(e.to_string()))?;

        self.lock()?
            .execute(
                "INSERT INTO mirror (message_id, channel, envelope, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(message_id) DO UPDATE SET
                     envelope = excluded.envelope,
                     state = excluded.state,
                     updated_at = excluded.updated_at",
                params![message_id, channel, bytes, state.as_str(), now_ms()],
            )
            .map_err(db_error)?;

        tracing::debug!(
            mirror = %self.name,
            %message_id,
            state = state.as_str(),
            "Mirrored message"
        );
        Ok(())
    }
}

fn db_error(err: rusqlite::Error) -> SlaveError {
    SlaveError::new(err.to_string())
}

impl SlaveReceiver for SqliteMirror {
    fn name(&self) -> &str {
        &self.name
    }

    fn slave_send(&self, master_envelope: &Envelope) -> Result<(), SlaveError> {
        self.upsert(master_envelope, MirrorState::Pending)
    }

    fn slave_get(&self, master_envelope: &Envelope) -> Result<(), SlaveError> {
        self.upsert(master_envelope, MirrorState::Delivered)
    }

    fn slave_ack(&self, master_envelope: &Envelope) -> Result<(), SlaveError> {
        let (message_id, _) = Self::keys(master_envelope)?;

        let removed = self
            .lock()?
            .execute("DELETE FROM mirror WHERE message_id = ?1", params![message_id])
            .map_err(db_error)?;

        if removed == 0 {
            tracing::debug!(mirror = %self.name, %message_id, "Ack for message not in mirror");
        }
        Ok(())
    }

    fn slave_reject(&self, master_envelope: &Envelope) -> Result<(), SlaveError> {
        self.upsert(master_envelope, MirrorState::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stamped(body: serde_json::Value) -> (String, Envelope) {
        let identity = MessageIdentityStamp::generate();
        let envelope = Envelope::application(body)
            .with(identity)
            .with(ChannelNameStamp::new("orders"));
        (identity.to_string(), envelope)
    }

    #[test]
    fn follows_message_lifecycle() {
        let mirror = SqliteMirror::in_memory().unwrap();
        let (id, envelope) = stamped(json!({"order": 1}));

        mirror.slave_send(&envelope).unwrap();
        assert_eq!(mirror.state_of(&id).unwrap(), Some(MirrorState::Pending));
        assert_eq!(mirror.envelope_of(&id).unwrap(), Some(envelope.clone()));

        mirror.slave_get(&envelope).unwrap();
        assert_eq!(mirror.state_of(&id).unwrap(), Some(MirrorState::Delivered));

        mirror.slave_ack(&envelope).unwrap();
        assert_eq!(mirror.state_of(&id).unwrap(), None);
        assert_eq!(mirror.count("orders").unwrap(), 0);
    }

    #[test]
    fn reject_keeps_row() {
        let mirror = SqliteMirror::in_memory().unwrap();
        let (id, envelope) = stamped(json!("bad"));

        mirror.slave_send(&envelope).unwrap();
        mirror.slave_reject(&envelope).unwrap();

        assert_eq!(mirror.state_of(&id).unwrap(), Some(MirrorState::Rejected));
        assert_eq!(mirror.count("orders").unwrap(), 1);
    }

    #[test]
    fn get_without_prior_send_inserts() {
        let mirror = SqliteMirror::in_memory().unwrap();
        let (id, envelope) = stamped(json!(3));

        mirror.slave_get(&envelope).unwrap();

        assert_eq!(mirror.state_of(&id).unwrap(), Some(MirrorState::Delivered));
    }

    #[test]
    fn requires_identity_stamp() {
        let mirror = SqliteMirror::in_memory().unwrap().with_name("audit");
        let envelope = Envelope::application(json!(1)).with(ChannelNameStamp::new("orders"));

        let err = mirror.slave_send(&envelope).unwrap_err();
        assert!(err.reason().contains("message id"));
        assert_eq!(mirror.name(), "audit");
    }
}
