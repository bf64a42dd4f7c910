//! # SQLite Adapter
//!
//! SQLite-backed collaborators for replication transports:
//! - [`SqliteQueue`]: a master queue implementing
//!   [`Transport`](mq_replication_core::Transport)
//! - [`SqliteMirror`]: a slave receiver keeping a mirror table in step with
//!   the master's send/get/ack/reject operations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mirror;
pub mod queue;

pub use mirror::{MirrorState, SqliteMirror};
pub use queue::SqliteQueue;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
