use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::SystemTime;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use crate::errors::StepwiseError;
use crate::logging::append_run_log;
use crate::runtime::{lock_or_recover, unix_millis};
use crate::session::Recording;
use crate::types::RecordingStatus;

const READ_POOL_SIZE: usize = 2;

type ArchiveResult<T> = Result<T, StepwiseError>;

/// Durable home for completed recordings.
pub trait RecordingArchive: Send + Sync {
    fn save(&self, session_id: &str, recording: &Recording) -> ArchiveResult<()>;
    /// Fails with `RecordingNotFound` when nothing is stored under `session_id`.
    fn load(&self, session_id: &str) -> ArchiveResult<Recording>;
    fn delete(&self, session_id: &str) -> ArchiveResult<bool>;
    /// Ids ordered by start time, then id.
    fn list_ids(&self) -> ArchiveResult<Vec<String>>;
}

fn ensure_archivable(session_id: &str, recording: &Recording) -> ArchiveResult<()> {
    if recording.status != RecordingStatus::Completed {
        return Err(StepwiseError::InvalidState(format!(
            "only completed recordings can be archived; {session_id} is {}",
            recording.status.as_str()
        )));
    }
    Ok(())
}

#[derive(Default)]
pub struct MemoryArchive {
    recordings: Mutex<HashMap<String, Recording>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordingArchive for MemoryArchive {
    fn save(&self, session_id: &str, recording: &Recording) -> ArchiveResult<()> {
        ensure_archivable(session_id, recording)?;
        lock_or_recover(&self.recordings).insert(session_id.to_string(), recording.clone());
        Ok(())
    }

    fn load(&self, session_id: &str) -> ArchiveResult<Recording> {
        lock_or_recover(&self.recordings)
            .get(session_id)
            .cloned()
            .ok_or_else(|| StepwiseError::RecordingNotFound(session_id.to_string()))
    }

    fn delete(&self, session_id: &str) -> ArchiveResult<bool> {
        Ok(lock_or_recover(&self.recordings).remove(session_id).is_some())
    }

    fn list_ids(&self) -> ArchiveResult<Vec<String>> {
        let recordings = lock_or_recover(&self.recordings);
        let mut entries = recordings
            .iter()
            .map(|(id, recording)| (recording.started_at_ms, id.clone()))
            .collect::<Vec<_>>();
        entries.sort();
        Ok(entries.into_iter().map(|(_, id)| id).collect())
    }
}

#[derive(Debug)]
enum WriteCmd {
    Save {
        row: ArchivedRow,
        reply: oneshot::Sender<ArchiveResult<()>>,
    },
    Delete {
        session_id: String,
        reply: oneshot::Sender<ArchiveResult<bool>>,
    },
}

#[derive(Debug)]
struct ArchivedRow {
    session_id: String,
    status: String,
    started_at_ms: i64,
    ended_at_ms: Option<i64>,
    step_count: i64,
    payload: String,
    archived_at_ms: i64,
}

/// SQLite-backed archive. A single writer thread owns the write connection;
/// reads go through a small pool of read-only connections.
pub struct SqliteArchive {
    write_tx: Option<mpsc::Sender<WriteCmd>>,
    read_pool: ReadPool,
    writer_join: Option<thread::JoinHandle<()>>,
    db_path: PathBuf,
}

impl Drop for SqliteArchive {
    fn drop(&mut self) {
        // Closing the sender ends the writer loop.
        drop(self.write_tx.take());
        if let Some(handle) = self.writer_join.take() {
            let _ = handle.join();
        }
    }
}

impl SqliteArchive {
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref().to_path_buf();
        append_run_log(
            "info",
            "archive.open",
            json!({ "path": path.display().to_string() }),
        );
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StepwiseError::Database(e.to_string()))?;
            }
        }

        if path.exists() {
            let meta =
                std::fs::metadata(&path).map_err(|e| StepwiseError::Database(e.to_string()))?;
            if meta.len() == 0 {
                return Err(StepwiseError::Database(format!(
                    "archive database is 0 bytes (corrupt): {}",
                    path.display()
                )));
            }
        }

        let mut write_conn = Connection::open(&path).map_err(db_err)?;
        configure_write_connection(&write_conn)?;
        run_migrations(&mut write_conn)?;

        let (write_tx, mut write_rx) = mpsc::channel(64);
        let writer_join = thread::spawn(move || {
            while let Some(cmd) = write_rx.blocking_recv() {
                match cmd {
                    WriteCmd::Save { row, reply } => {
                        let _ = reply.send(upsert_row(&write_conn, &row));
                    }
                    WriteCmd::Delete { session_id, reply } => {
                        let _ = reply.send(delete_row(&write_conn, &session_id));
                    }
                }
            }
        });

        let read_pool = ReadPool::open(&path, READ_POOL_SIZE)?;
        append_run_log(
            "info",
            "archive.opened",
            json!({ "path": path.display().to_string() }),
        );
        Ok(Self {
            write_tx: Some(write_tx),
            read_pool,
            writer_join: Some(writer_join),
            db_path: path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn sender(&self) -> ArchiveResult<&mpsc::Sender<WriteCmd>> {
        self.write_tx
            .as_ref()
            .ok_or_else(|| StepwiseError::Database("archive is closed".to_string()))
    }

    fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<ArchiveResult<T>>) -> WriteCmd,
    ) -> ArchiveResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender()?
            .blocking_send(build(reply_tx))
            .map_err(|e| StepwiseError::Database(e.to_string()))?;
        reply_rx
            .blocking_recv()
            .map_err(|e| StepwiseError::Database(e.to_string()))?
    }
}

impl RecordingArchive for SqliteArchive {
    fn save(&self, session_id: &str, recording: &Recording) -> ArchiveResult<()> {
        ensure_archivable(session_id, recording)?;
        let payload =
            serde_json::to_string(recording).map_err(|e| StepwiseError::Database(e.to_string()))?;
        let row = ArchivedRow {
            session_id: session_id.to_string(),
            status: recording.status.as_str().to_string(),
            started_at_ms: to_sql_millis(recording.started_at_ms),
            ended_at_ms: recording.ended_at_ms.map(to_sql_millis),
            step_count: recording.steps.len() as i64,
            payload,
            archived_at_ms: to_sql_millis(unix_millis(SystemTime::now())),
        };
        let result = self.send(|reply| WriteCmd::Save { row, reply });
        match &result {
            Ok(()) => append_run_log(
                "info",
                "archive.recording.saved",
                json!({
                    "session_id": session_id,
                    "step_count": recording.steps.len(),
                }),
            ),
            Err(e) => append_run_log(
                "error",
                "archive.recording.save_failed",
                json!({ "session_id": session_id, "error": e.to_string() }),
            ),
        }
        result
    }

    fn load(&self, session_id: &str) -> ArchiveResult<Recording> {
        let payload = self.read_pool.with_conn(|conn| {
            conn.query_row(
                "SELECT status, payload FROM recordings WHERE session_id = ?1",
                [session_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(db_err)
        })?;
        let Some((status, payload)) = payload else {
            return Err(StepwiseError::RecordingNotFound(session_id.to_string()));
        };
        if RecordingStatus::from_db(&status).is_none() {
            return Err(StepwiseError::Database(format!(
                "unknown recording status {status:?} for {session_id}"
            )));
        }
        let recording: Recording = serde_json::from_str(&payload)
            .map_err(|e| StepwiseError::Database(format!("corrupt payload for {session_id}: {e}")))?;
        append_run_log(
            "debug",
            "archive.recording.loaded",
            json!({ "session_id": session_id }),
        );
        Ok(recording)
    }

    fn delete(&self, session_id: &str) -> ArchiveResult<bool> {
        let session_id = session_id.to_string();
        let logged_id = session_id.clone();
        let removed = self.send(|reply| WriteCmd::Delete { session_id, reply })?;
        append_run_log(
            "info",
            "archive.recording.deleted",
            json!({ "session_id": logged_id, "removed": removed }),
        );
        Ok(removed)
    }

    fn list_ids(&self) -> ArchiveResult<Vec<String>> {
        self.read_pool.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT session_id FROM recordings ORDER BY started_at_ms ASC, session_id ASC")
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
    }
}

struct ReadPool {
    conns: Arc<Vec<Mutex<Connection>>>,
    next: Arc<AtomicUsize>,
}

impl ReadPool {
    fn open(path: &Path, size: usize) -> ArchiveResult<Self> {
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .map_err(db_err)?;
            conn.busy_timeout(std::time::Duration::from_secs(3))
                .map_err(db_err)?;
            conns.push(Mutex::new(conn));
        }

        Ok(Self {
            conns: Arc::new(conns),
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> ArchiveResult<T>) -> ArchiveResult<T> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        let guard = lock_or_recover(&self.conns[idx]);
        f(&guard)
    }
}

fn configure_write_connection(conn: &Connection) -> ArchiveResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(db_err)?;
    conn.pragma_update(None, "synchronous", "FULL")
        .map_err(db_err)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(db_err)?;
    Ok(())
}

fn run_migrations(conn: &mut Connection) -> ArchiveResult<()> {
    let migrations = [(1_i64, include_str!("../migrations/0001_recordings.sql"))];

    conn.execute_batch("BEGIN IMMEDIATE; CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at INTEGER NOT NULL); COMMIT;")
        .map_err(db_err)?;

    for (version, sql) in migrations {
        let exists = conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE version = ?1 LIMIT 1",
                [version],
                |_| Ok(()),
            )
            .optional()
            .map_err(db_err)?
            .is_some();
        if exists {
            continue;
        }

        let tx = conn.transaction().map_err(db_err)?;
        tx.execute_batch(sql).map_err(db_err)?;
        tx.execute(
            "INSERT INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![version, to_sql_millis(unix_millis(SystemTime::now()))],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        append_run_log(
            "info",
            "archive.migration.applied",
            json!({ "version": version }),
        );
    }

    Ok(())
}

fn upsert_row(conn: &Connection, row: &ArchivedRow) -> ArchiveResult<()> {
    conn.execute(
        "INSERT INTO recordings(session_id, status, started_at_ms, ended_at_ms, step_count, payload, archived_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(session_id) DO UPDATE SET
            status = excluded.status,
            started_at_ms = excluded.started_at_ms,
            ended_at_ms = excluded.ended_at_ms,
            step_count = excluded.step_count,
            payload = excluded.payload,
            archived_at_ms = excluded.archived_at_ms",
        params![
            row.session_id,
            row.status,
            row.started_at_ms,
            row.ended_at_ms,
            row.step_count,
            row.payload,
            row.archived_at_ms,
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn delete_row(conn: &Connection, session_id: &str) -> ArchiveResult<bool> {
    let changed = conn
        .execute("DELETE FROM recordings WHERE session_id = ?1", [session_id])
        .map_err(db_err)?;
    Ok(changed > 0)
}

fn to_sql_millis(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn db_err(error: rusqlite::Error) -> StepwiseError {
    StepwiseError::Database(error.to_string())
}
