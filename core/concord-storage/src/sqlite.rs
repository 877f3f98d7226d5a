//! Persistent identity store backed by SQLite.
//!
//! Participants and their attached records live in a single file, separate
//! from whatever the host uses for its own data.

use concord_types::ParticipantId;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::{IdentityStore, Participant, ParticipantRole, StorageError, StorageResult};

/// Identity store backed by SQLite.
pub struct SqliteIdentityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIdentityStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!("opened identity store at {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    /// Opens an in-memory store.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS participants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS attached_records (
                participant_id TEXT NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
                namespace TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(participant_id, namespace, field)
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn ensure_participant(conn: &Connection, id: ParticipantId) -> StorageResult<()> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM participants WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StorageError::UnknownParticipant(id)),
        }
    }
}

fn participant_from_row(id: String, name: String, role: String) -> StorageResult<Participant> {
    let id = id
        .parse::<ParticipantId>()
        .map_err(|e| StorageError::InvalidData(format!("invalid participant id {id}: {e}")))?;
    Ok(Participant {
        id,
        name,
        role: role.parse::<ParticipantRole>()?,
    })
}

impl IdentityStore for SqliteIdentityStore {
    fn upsert_participant(&self, participant: &Participant) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO participants (id, name, role) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, role = excluded.role",
            params![
                participant.id.to_string(),
                participant.name,
                participant.role.to_string()
            ],
        )?;
        Ok(())
    }

    fn participant(&self, id: ParticipantId) -> StorageResult<Option<Participant>> {
        let conn = self.lock()?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT id, name, role FROM participants WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(|(id, name, role)| participant_from_row(id, name, role))
            .transpose()
    }

    fn participants(&self) -> StorageResult<Vec<Participant>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, role FROM participants ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, name, role) = row?;
            result.push(participant_from_row(id, name, role)?);
        }
        Ok(result)
    }

    fn get_attached_record(
        &self,
        id: ParticipantId,
        namespace: &str,
        field: &str,
    ) -> StorageResult<Option<String>> {
        let conn = self.lock()?;
        Self::ensure_participant(&conn, id)?;
        let value = conn
            .query_row(
                "SELECT value FROM attached_records
                 WHERE participant_id = ?1 AND namespace = ?2 AND field = ?3",
                params![id.to_string(), namespace, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_attached_record(
        &self,
        id: ParticipantId,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<()> {
        let conn = self.lock()?;
        Self::ensure_participant(&conn, id)?;
        conn.execute(
            "INSERT OR REPLACE INTO attached_records
             (participant_id, namespace, field, value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                namespace,
                field,
                value,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn clear_attached_record(
        &self,
        id: ParticipantId,
        namespace: &str,
        field: &str,
    ) -> StorageResult<()> {
        let conn = self.lock()?;
        Self::ensure_participant(&conn, id)?;
        conn.execute(
            "DELETE FROM attached_records
             WHERE participant_id = ?1 AND namespace = ?2 AND field = ?3",
            params![id.to_string(), namespace, field],
        )?;
        Ok(())
    }
}
