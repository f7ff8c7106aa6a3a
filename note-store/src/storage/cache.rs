//! Decrypted note cache
//!
//! Process-local map from note id to its last decrypted form, so repeated
//! reads skip key derivation and decryption. Unbounded: it lives as long as
//! the store and holds one personal note collection.
//!
//! Locked notes are never stored. Every repository mutation invalidates the
//! affected entries, and every invalidation bumps a generation counter.
//! A reader takes a [`CacheTicket`] before querying and hands it back to
//! [`NoteCache::put`]; if anything was invalidated in between, the decrypted
//! note may be stale and is not stored.

use crate::database::Note;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Cache generation observed before a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTicket(u64);

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<i64, Note>,
    generation: u64,
}

impl CacheState {
    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

#[derive(Debug, Default)]
pub struct NoteCache {
    state: RwLock<CacheState>,
}

impl NoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the cached note, if present
    pub async fn get(&self, note_id: i64) -> Option<Note> {
        self.state.read().await.entries.get(&note_id).cloned()
    }

    /// Take before reading a row that may later be cached
    pub async fn ticket(&self) -> CacheTicket {
        CacheTicket(self.state.read().await.generation)
    }

    /// Cache a fully decrypted note read under `ticket`.
    ///
    /// Locked or still-encrypted notes are refused so their plaintext never
    /// outlives the call that produced it. A note read before the latest
    /// invalidation is refused too. Returns whether the note was stored.
    pub async fn put(&self, note: Note, ticket: CacheTicket) -> bool {
        if note.is_locked || note.is_encrypted {
            tracing::debug!("Not caching note {} (locked or encrypted)", note.id);
            return false;
        }

        let mut state = self.state.write().await;
        if state.generation != ticket.0 {
            tracing::debug!("Not caching note {} (invalidated during read)", note.id);
            return false;
        }
        state.entries.insert(note.id, note);
        true
    }

    pub async fn invalidate(&self, note_id: i64) {
        let mut state = self.state.write().await;
        state.bump();
        if state.entries.remove(&note_id).is_some() {
            tracing::debug!("Invalidated cached note {}", note_id);
        }
    }

    pub async fn invalidate_many(&self, note_ids: &[i64]) {
        let mut state = self.state.write().await;
        state.bump();
        for id in note_ids {
            state.entries.remove(id);
        }
    }

    pub async fn invalidate_all(&self) {
        let mut state = self.state.write().await;
        state.bump();
        state.entries.clear();
        tracing::debug!("Note cache cleared");
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}
