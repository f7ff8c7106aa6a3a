//! Note repository
//!
//! CRUD, bin lifecycle and batch operations for notes. Title and content
//! are encrypted per field; decrypted notes are served from the shared
//! cache when possible. Every statement goes through the [`Executor`].

use super::executor::{placeholders, Executor, Param};
use super::models::*;
use super::tags;
use crate::config::DEFAULT_TAG_COLOR;
use crate::crypto::{self, DerivedKey, EncryptedField, KeySource};
use crate::error::{AppError, Result};
use crate::storage::{NoteCache, SaveCoordinator, SaveKey};
use std::collections::HashMap;
use std::sync::Arc;

const SELECT_NOTE: &str = r#"
    SELECT id, title, content, title_iv, content_iv, isInBin, reminder, notificationId, isLocked
    FROM notes
"#;

/// Repository for note operations
#[derive(Clone)]
pub struct NoteRepository {
    exec: Executor,
    cache: Arc<NoteCache>,
    saves: Arc<SaveCoordinator>,
    keys: Arc<KeySource>,
}

impl NoteRepository {
    pub fn new(
        exec: Executor,
        cache: Arc<NoteCache>,
        saves: Arc<SaveCoordinator>,
        keys: Arc<KeySource>,
    ) -> Self {
        Self {
            exec,
            cache,
            saves,
            keys,
        }
    }

    /// Create (`req.id == None`) or update a note, then replace its tags.
    ///
    /// Returns `SaveOutcome::Skipped` without writing anything when a save
    /// for the same note (or any new note) is already in flight. Blank new
    /// notes are persisted if asked; filtering them is the caller's job.
    pub async fn save_note(&self, req: SaveNoteRequest) -> Result<SaveOutcome<i64>> {
        let key = SaveKey::for_note(req.id);
        self.saves.with_save_lock(key, || self.write_note(req)).await
    }

    async fn write_note(&self, req: SaveNoteRequest) -> Result<i64> {
        let (title, content) = if req.title.is_some() || req.content.is_some() {
            let key = self.keys.derive().await?;
            (
                req.title.as_deref().map(|t| crypto::encrypt(t, &key)).transpose()?,
                req.content.as_deref().map(|c| crypto::encrypt(c, &key)).transpose()?,
            )
        } else {
            (None, None)
        };

        let note_id = match req.id {
            Some(id) => {
                self.cache.invalidate(id).await;
                self.update_row(id, title, content, &req).await?;
                id
            }
            None => self.insert_row(title, content, &req).await?,
        };

        // The note row is committed at this point; a failure here leaves
        // the tags unset and the caller may retry `set_note_tags`.
        tags::replace_note_tags(&self.exec, note_id, &req.tag_ids).await?;
        self.cache.invalidate(note_id).await;

        tracing::debug!("Saved note {} ({} tags)", note_id, req.tag_ids.len());
        Ok(note_id)
    }

    async fn update_row(
        &self,
        id: i64,
        title: Option<EncryptedField>,
        content: Option<EncryptedField>,
        req: &SaveNoteRequest,
    ) -> Result<()> {
        let mut assignments = Vec::new();
        let mut params: Vec<Param> = Vec::new();

        if let Some(field) = title {
            assignments.push("title = ?, title_iv = ?");
            params.push(field.cipher_text.into());
            params.push(field.iv.into());
        }
        if let Some(field) = content {
            assignments.push("content = ?, content_iv = ?");
            params.push(field.cipher_text.into());
            params.push(field.iv.into());
        }
        assignments.push("reminder = ?, notificationId = ?, isLocked = ?");
        params.push(req.reminder.into());
        params.push(req.notification_id.clone().into());
        params.push(req.is_locked.into());
        params.push(id.into());

        let sql = format!(
            "UPDATE notes SET {} WHERE id = ? RETURNING id",
            assignments.join(", ")
        );
        let updated: Option<IdRow> = self.exec.fetch_optional(&sql, &params).await?;
        updated.ok_or(AppError::NoteNotFound(id))?;
        Ok(())
    }

    async fn insert_row(
        &self,
        title: Option<EncryptedField>,
        content: Option<EncryptedField>,
        req: &SaveNoteRequest,
    ) -> Result<i64> {
        let (title, title_iv) = split_field(title);
        let (content, content_iv) = split_field(content);

        let inserted: Option<IdRow> = self
            .exec
            .fetch_optional(
                r#"
                INSERT INTO notes (title, title_iv, content, content_iv, reminder, notificationId, isLocked)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
                &[
                    title,
                    title_iv,
                    content,
                    content_iv,
                    req.reminder.into(),
                    req.notification_id.clone().into(),
                    req.is_locked.into(),
                ],
            )
            .await?;

        let id = inserted
            .map(|row| row.id)
            .ok_or_else(|| AppError::Query(sqlx::Error::RowNotFound))?;
        tracing::debug!("Created note: {}", id);
        Ok(id)
    }

    /// Get a note by id.
    ///
    /// A locked note is returned sealed (`is_encrypted = true`, stored
    /// ciphertext untouched) unless `force_decrypt` is set, which the caller
    /// only does after the user has authenticated. Tags are always resolved.
    pub async fn get_note_by_id(&self, id: i64, force_decrypt: bool) -> Result<Option<Note>> {
        if force_decrypt {
            self.cache.invalidate(id).await;
        } else if let Some(note) = self.cache.get(id).await {
            if !note.is_locked {
                return Ok(Some(note));
            }
        }

        let ticket = self.cache.ticket().await;
        let row: Option<NoteRow> = self
            .exec
            .fetch_optional(&format!("{} WHERE id = ? LIMIT 1", SELECT_NOTE), &[id.into()])
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let tags = tags::tags_for_note(&self.exec, id).await?;

        if row.locked() && !force_decrypt {
            return Ok(Some(Note::sealed(row, tags)));
        }

        let key = self.keys.derive().await?;
        let note = open_row(row, &key, tags);
        self.cache.put(note.clone(), ticket).await;

        Ok(Some(note))
    }

    /// All notes outside the bin, in storage order
    pub async fn load_notes(&self) -> Result<Vec<Note>> {
        self.load_where(false).await
    }

    /// All notes in the bin, in storage order
    pub async fn load_bin_notes(&self) -> Result<Vec<Note>> {
        self.load_where(true).await
    }

    async fn load_where(&self, in_bin: bool) -> Result<Vec<Note>> {
        let ticket = self.cache.ticket().await;
        let rows: Vec<NoteRow> = self
            .exec
            .fetch(
                &format!("{} WHERE isInBin = ? ORDER BY id", SELECT_NOTE),
                &[in_bin.into()],
            )
            .await?;

        // One query for every tag of every listed note
        let tag_rows: Vec<NoteTagRow> = self
            .exec
            .fetch(
                r#"
                SELECT nt.note_id, t.id, t.name, COALESCE(t.color, ?) AS color
                FROM note_tags nt
                JOIN tags t ON t.id = nt.tag_id
                JOIN notes n ON n.id = nt.note_id
                WHERE n.isInBin = ?
                ORDER BY nt.note_id, t.name
                "#,
                &[DEFAULT_TAG_COLOR.into(), in_bin.into()],
            )
            .await?;

        let mut tags_by_note: HashMap<i64, Vec<Tag>> = HashMap::new();
        for row in tag_rows {
            tags_by_note.entry(row.note_id).or_default().push(row.into());
        }

        let mut key: Option<DerivedKey> = None;
        let mut notes = Vec::with_capacity(rows.len());

        for row in rows {
            let tags = tags_by_note.remove(&row.id).unwrap_or_default();

            if row.locked() {
                notes.push(Note::sealed(row, tags));
                continue;
            }

            if let Some(cached) = self.cache.get(row.id).await {
                notes.push(cached);
                continue;
            }

            if key.is_none() {
                key = Some(self.keys.derive().await?);
            }
            if let Some(key) = &key {
                let note = open_row(row, key, tags);
                self.cache.put(note.clone(), ticket).await;
                notes.push(note);
            }
        }

        Ok(notes)
    }

    /// Move notes to the bin, clearing their reminders.
    ///
    /// Returns the notification handles that were set, for cancellation.
    pub async fn move_multiple_to_bin(&self, ids: &[i64]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let marks = placeholders(ids.len());
        let params = id_params(ids);

        let handles = self
            .handles(
                &format!(
                    "SELECT notificationId FROM notes WHERE id IN ({}) AND notificationId IS NOT NULL",
                    marks
                ),
                &params,
            )
            .await?;

        self.exec
            .execute(
                &format!(
                    "UPDATE notes SET isInBin = 1, reminder = NULL, notificationId = NULL WHERE id IN ({})",
                    marks
                ),
                &params,
            )
            .await?;
        self.cache.invalidate_many(ids).await;

        tracing::info!("Moved {} notes to bin", ids.len());
        Ok(handles)
    }

    /// Move every active note to the bin; returns their notification handles
    pub async fn move_all_to_bin(&self) -> Result<Vec<String>> {
        let handles = self
            .handles(
                "SELECT notificationId FROM notes WHERE isInBin = 0 AND notificationId IS NOT NULL",
                &[],
            )
            .await?;

        self.exec
            .execute(
                "UPDATE notes SET isInBin = 1, reminder = NULL, notificationId = NULL WHERE isInBin = 0",
                &[],
            )
            .await?;
        self.cache.invalidate_all().await;

        tracing::info!("Moved all notes to bin");
        Ok(handles)
    }

    pub async fn restore_multiple_from_bin(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        self.exec
            .execute(
                &format!(
                    "UPDATE notes SET isInBin = 0 WHERE id IN ({})",
                    placeholders(ids.len())
                ),
                &id_params(ids),
            )
            .await?;
        self.cache.invalidate_many(ids).await;

        tracing::info!("Restored {} notes from bin", ids.len());
        Ok(())
    }

    pub async fn restore_all_from_bin(&self) -> Result<()> {
        self.exec
            .execute("UPDATE notes SET isInBin = 0 WHERE isInBin = 1", &[])
            .await?;
        self.cache.invalidate_all().await;

        tracing::info!("Restored all notes from bin");
        Ok(())
    }

    /// Permanently delete notes; tag links go with them.
    ///
    /// Returns any live notification handles for cancellation.
    pub async fn delete_multiple_notes(&self, ids: &[i64]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let marks = placeholders(ids.len());
        let params = id_params(ids);

        let handles = self
            .handles(
                &format!(
                    "SELECT notificationId FROM notes WHERE id IN ({}) AND notificationId IS NOT NULL",
                    marks
                ),
                &params,
            )
            .await?;

        self.exec
            .execute(&format!("DELETE FROM notes WHERE id IN ({})", marks), &params)
            .await?;
        self.cache.invalidate_many(ids).await;

        tracing::info!("Permanently deleted {} notes", ids.len());
        Ok(handles)
    }

    /// Permanently delete every note in the bin
    pub async fn delete_all_in_bin(&self) -> Result<Vec<String>> {
        let handles = self
            .handles(
                "SELECT notificationId FROM notes WHERE isInBin = 1 AND notificationId IS NOT NULL",
                &[],
            )
            .await?;

        self.exec
            .execute("DELETE FROM notes WHERE isInBin = 1", &[])
            .await?;
        self.cache.invalidate_all().await;

        tracing::info!("Deleted all notes in bin");
        Ok(handles)
    }

    /// Delete every note in the bin and sweep tag links left without a note
    pub async fn empty_bin_completely(&self) -> Result<Vec<String>> {
        let handles = self.delete_all_in_bin().await?;

        self.exec
            .execute(
                "DELETE FROM note_tags WHERE note_id NOT IN (SELECT id FROM notes)",
                &[],
            )
            .await?;

        tracing::info!("Bin emptied completely");
        Ok(handles)
    }

    pub async fn count_bin_notes(&self) -> Result<i64> {
        let row: Option<CountRow> = self
            .exec
            .fetch_optional("SELECT COUNT(*) AS count FROM notes WHERE isInBin = 1", &[])
            .await?;
        Ok(row.map(|r| r.count).unwrap_or(0))
    }

    /// Lock or unlock a note. The cache entry is dropped before and after
    /// the write, whatever its outcome, so a read that raced the update
    /// cannot cache the old state.
    pub async fn toggle_note_lock(&self, id: i64, locked: bool) -> Result<()> {
        self.cache.invalidate(id).await;

        let updated: Result<Option<IdRow>> = self
            .exec
            .fetch_optional(
                "UPDATE notes SET isLocked = ? WHERE id = ? RETURNING id",
                &[locked.into(), id.into()],
            )
            .await;
        self.cache.invalidate(id).await;
        updated?.ok_or(AppError::NoteNotFound(id))?;

        tracing::info!(
            "Note {} {}",
            id,
            if locked { "locked" } else { "unlocked" }
        );
        Ok(())
    }

    /// Store a reminder time and the handle of its scheduled notification
    pub async fn set_reminder(
        &self,
        id: i64,
        reminder: i64,
        notification_id: Option<String>,
    ) -> Result<()> {
        self.update_reminder(id, Some(reminder), notification_id).await?;
        tracing::debug!("Set reminder for note {} at {}", id, reminder);
        Ok(())
    }

    /// Clear reminder and notification handle; returns the previous handle
    pub async fn clear_reminder(&self, id: i64) -> Result<Option<String>> {
        let previous = self
            .handles(
                "SELECT notificationId FROM notes WHERE id = ? AND notificationId IS NOT NULL",
                &[id.into()],
            )
            .await?
            .into_iter()
            .next();

        self.update_reminder(id, None, None).await?;
        tracing::debug!("Cleared reminder for note {}", id);
        Ok(previous)
    }

    async fn update_reminder(
        &self,
        id: i64,
        reminder: Option<i64>,
        notification_id: Option<String>,
    ) -> Result<()> {
        let updated: Option<IdRow> = self
            .exec
            .fetch_optional(
                "UPDATE notes SET reminder = ?, notificationId = ? WHERE id = ? RETURNING id",
                &[reminder.into(), notification_id.into(), id.into()],
            )
            .await?;
        updated.ok_or(AppError::NoteNotFound(id))?;
        self.cache.invalidate(id).await;
        Ok(())
    }

    /// Duplicate a note with fresh IVs, keeping its lock state, reminder
    /// time and tags. The copy has no scheduled notification.
    pub async fn copy_note(&self, id: i64) -> Result<i64> {
        let row: NoteRow = self
            .exec
            .fetch_optional(&format!("{} WHERE id = ? LIMIT 1", SELECT_NOTE), &[id.into()])
            .await?
            .ok_or(AppError::NoteNotFound(id))?;

        let key = self.keys.derive().await?;
        let title = reencrypt(row.title_field(), &key)?;
        let content = reencrypt(row.content_field(), &key)?;

        let req = SaveNoteRequest {
            reminder: row.reminder,
            is_locked: row.locked(),
            ..SaveNoteRequest::default()
        };
        let copy_id = self.insert_row(title, content, &req).await?;

        self.exec
            .execute(
                "INSERT INTO note_tags (note_id, tag_id) SELECT ?, tag_id FROM note_tags WHERE note_id = ?",
                &[copy_id.into(), id.into()],
            )
            .await?;

        tracing::info!("Copied note {} to {}", id, copy_id);
        Ok(copy_id)
    }

    pub async fn get_note_tags(&self, note_id: i64) -> Result<Vec<Tag>> {
        tags::tags_for_note(&self.exec, note_id).await
    }

    pub async fn get_note_tag_ids(&self, note_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .get_note_tags(note_id)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect())
    }

    /// Replace a note's tags (delete all, insert each). Safe to retry.
    pub async fn set_note_tags(&self, note_id: i64, tag_ids: &[i64]) -> Result<()> {
        tags::replace_note_tags(&self.exec, note_id, tag_ids).await?;
        self.cache.invalidate(note_id).await;
        Ok(())
    }

    async fn handles(&self, sql: &str, params: &[Param]) -> Result<Vec<String>> {
        let rows: Vec<HandleRow> = self.exec.fetch(sql, params).await?;
        Ok(rows.into_iter().map(|r| r.notification_id).collect())
    }
}

fn id_params(ids: &[i64]) -> Vec<Param> {
    ids.iter().map(|id| Param::Int(*id)).collect()
}

fn split_field(field: Option<EncryptedField>) -> (Param, Param) {
    match field {
        Some(f) => (f.cipher_text.into(), f.iv.into()),
        None => (Param::Null, Param::Null),
    }
}

fn reencrypt(field: Option<EncryptedField>, key: &DerivedKey) -> Result<Option<EncryptedField>> {
    field
        .map(|f| crypto::decrypt(&f, key).and_then(|plain| crypto::encrypt(&plain, key)))
        .transpose()
}

/// Decrypt one stored field. An absent field is an empty string; a
/// ciphertext without its IV counts as corrupted.
fn open_field(
    cipher_text: &Option<String>,
    field: Option<EncryptedField>,
    key: &DerivedKey,
) -> Result<String> {
    match field {
        Some(field) => crypto::decrypt(&field, key),
        None if cipher_text.is_some() => Err(AppError::Decryption("Missing IV".to_string())),
        None => Ok(String::new()),
    }
}

/// Decrypt a row. Fields that fail are replaced by an empty string and the
/// note is flagged `is_encrypted`, so a caller can still show its shell.
fn open_row(row: NoteRow, key: &DerivedKey, tags: Vec<Tag>) -> Note {
    let mut is_encrypted = false;
    let mut recover = |label: &str, result: Result<String>| match result {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Could not decrypt {} of note {}: {}", label, row.id, e);
            is_encrypted = true;
            String::new()
        }
    };

    let title = recover("title", open_field(&row.title, row.title_field(), key));
    let content = recover("content", open_field(&row.content, row.content_field(), key));

    Note {
        id: row.id,
        title,
        content,
        is_in_bin: row.in_bin(),
        reminder: row.reminder,
        notification_id: row.notification_id.clone(),
        is_locked: row.locked(),
        is_encrypted,
        tags,
    }
}
