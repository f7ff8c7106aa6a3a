//! Notes service
//!
//! High-level business logic for notes: skipping blank drafts, gating
//! locked notes behind authentication, search, and cancelling the
//! notifications of notes that leave the active list.

use super::notification::{cancel_all, AuthGate, NotificationScheduler};
use crate::database::{Note, NoteRepository, SaveNoteRequest, SaveOutcome};
use crate::error::Result;
use std::sync::Arc;

/// Service for managing notes
pub struct NotesService<S, A> {
    repo: NoteRepository,
    scheduler: Arc<S>,
    auth: Arc<A>,
}

impl<S, A> Clone for NotesService<S, A> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            scheduler: self.scheduler.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<S: NotificationScheduler, A: AuthGate> NotesService<S, A> {
    pub fn new(repo: NoteRepository, scheduler: Arc<S>, auth: Arc<A>) -> Self {
        Self {
            repo,
            scheduler,
            auth,
        }
    }

    /// Save a note. A new note with neither title nor content is not
    /// created and yields `SaveOutcome::Empty`.
    pub async fn save(&self, req: SaveNoteRequest) -> Result<SaveOutcome<i64>> {
        if req.id.is_none() && req.is_blank() {
            tracing::debug!("Skipping blank new note");
            return Ok(SaveOutcome::Empty);
        }

        self.repo.save_note(req).await
    }

    /// Read a note for display, prompting for authentication when it is
    /// locked. Without authentication the note stays sealed.
    pub async fn open_note(&self, id: i64) -> Result<Option<Note>> {
        let Some(note) = self.repo.get_note_by_id(id, false).await? else {
            return Ok(None);
        };

        if !note.is_locked {
            return Ok(Some(note));
        }

        if self.auth.authenticate().await {
            tracing::info!("Authenticated, opening locked note {}", id);
            self.repo.get_note_by_id(id, true).await
        } else {
            tracing::warn!("Authentication refused for note {}", id);
            Ok(Some(note))
        }
    }

    pub async fn list_notes(&self) -> Result<Vec<Note>> {
        self.repo.load_notes().await
    }

    pub async fn list_bin(&self) -> Result<Vec<Note>> {
        self.repo.load_bin_notes().await
    }

    /// Case-insensitive search over title and content. Locked notes never
    /// match; an empty query returns every unlocked note.
    pub async fn search(&self, query: &str) -> Result<Vec<Note>> {
        let needle = query.trim().to_lowercase();
        tracing::debug!("Searching notes for: {}", needle);

        let notes = self.repo.load_notes().await?;
        Ok(notes
            .into_iter()
            .filter(|n| !n.is_locked)
            .filter(|n| {
                needle.is_empty()
                    || n.title.to_lowercase().contains(&needle)
                    || n.content.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Unlocked notes carrying the tag
    pub async fn filter_by_tag(&self, tag_id: i64) -> Result<Vec<Note>> {
        let notes = self.repo.load_notes().await?;
        Ok(notes
            .into_iter()
            .filter(|n| !n.is_locked && n.has_tag(tag_id))
            .collect())
    }

    pub async fn set_locked(&self, id: i64, locked: bool) -> Result<()> {
        self.repo.toggle_note_lock(id, locked).await
    }

    pub async fn copy(&self, id: i64) -> Result<i64> {
        self.repo.copy_note(id).await
    }

    pub async fn move_to_bin(&self, ids: &[i64]) -> Result<()> {
        let handles = self.repo.move_multiple_to_bin(ids).await?;
        cancel_all(self.scheduler.as_ref(), &handles).await;
        Ok(())
    }

    pub async fn move_all_to_bin(&self) -> Result<()> {
        let handles = self.repo.move_all_to_bin().await?;
        cancel_all(self.scheduler.as_ref(), &handles).await;
        Ok(())
    }

    pub async fn restore(&self, ids: &[i64]) -> Result<()> {
        self.repo.restore_multiple_from_bin(ids).await
    }

    pub async fn restore_all(&self) -> Result<()> {
        self.repo.restore_all_from_bin().await
    }

    pub async fn delete_permanently(&self, ids: &[i64]) -> Result<()> {
        let handles = self.repo.delete_multiple_notes(ids).await?;
        cancel_all(self.scheduler.as_ref(), &handles).await;
        Ok(())
    }

    pub async fn empty_bin(&self) -> Result<()> {
        let handles = self.repo.empty_bin_completely().await?;
        cancel_all(self.scheduler.as_ref(), &handles).await;
        Ok(())
    }
}
