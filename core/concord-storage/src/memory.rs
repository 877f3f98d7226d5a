use concord_types::ParticipantId;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{IdentityStore, Participant, StorageError, StorageResult};

#[derive(Debug)]
struct Entry {
    participant: Participant,
    records: BTreeMap<(String, String), String>,
}

/// Identity store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    entries: Mutex<HashMap<ParticipantId, Entry>>,
    reject_writes: AtomicBool,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding the given participants.
    pub fn with_participants(participants: impl IntoIterator<Item = Participant>) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            for participant in participants {
                entries.insert(
                    participant.id,
                    Entry {
                        participant,
                        records: BTreeMap::new(),
                    },
                );
            }
        }
        store
    }

    /// When set, every record write and clear fails with
    /// [`StorageError::Unavailable`]. Reads keep working.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, HashMap<ParticipantId, Entry>>> {
        self.entries.lock().map_err(|_| StorageError::Poisoned)
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes are rejected".to_string()));
        }
        Ok(())
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn upsert_participant(&self, participant: &Participant) -> StorageResult<()> {
        let mut entries = self.lock()?;
        entries
            .entry(participant.id)
            .and_modify(|e| e.participant = participant.clone())
            .or_insert_with(|| Entry {
                participant: participant.clone(),
                records: BTreeMap::new(),
            });
        Ok(())
    }

    fn participant(&self, id: ParticipantId) -> StorageResult<Option<Participant>> {
        Ok(self.lock()?.get(&id).map(|e| e.participant.clone()))
    }

    fn participants(&self) -> StorageResult<Vec<Participant>> {
        let mut all: Vec<Participant> = self
            .lock()?
            .values()
            .map(|e| e.participant.clone())
            .collect();
        all.sort_by_key(|p| p.id);
        Ok(all)
    }

    fn get_attached_record(
        &self,
        id: ParticipantId,
        namespace: &str,
        field: &str,
    ) -> StorageResult<Option<String>> {
        let entries = self.lock()?;
        let entry = entries.get(&id).ok_or(StorageError::UnknownParticipant(id))?;
        Ok(entry
            .records
            .get(&(namespace.to_string(), field.to_string()))
            .cloned())
    }

    fn set_attached_record(
        &self,
        id: ParticipantId,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<()> {
        self.check_writable()?;
        let mut entries = self.lock()?;
        let entry = entries
            .get_mut(&id)
            .ok_or(StorageError::UnknownParticipant(id))?;
        entry
            .records
            .insert((namespace.to_string(), field.to_string()), value.to_string());
        Ok(())
    }

    fn clear_attached_record(
        &self,
        id: ParticipantId,
        namespace: &str,
        field: &str,
    ) -> StorageResult<()> {
        self.check_writable()?;
        let mut entries = self.lock()?;
        let entry = entries
            .get_mut(&id)
            .ok_or(StorageError::UnknownParticipant(id))?;
        entry
            .records
            .remove(&(namespace.to_string(), field.to_string()));
        Ok(())
    }
}
