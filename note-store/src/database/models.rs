//! Database models
//!
//! Typed rows decoded from query results, and the domain structs handed
//! to callers. Domain models use serde for serialization to a frontend.

use crate::crypto::EncryptedField;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A `notes` row exactly as stored (title/content still encrypted)
#[derive(Debug, Clone, FromRow)]
pub struct NoteRow {
    pub id: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub title_iv: Option<String>,
    pub content_iv: Option<String>,
    #[sqlx(rename = "isInBin")]
    pub is_in_bin: Option<i64>,
    pub reminder: Option<i64>,
    #[sqlx(rename = "notificationId")]
    pub notification_id: Option<String>,
    #[sqlx(rename = "isLocked")]
    pub is_locked: Option<i64>,
}

impl NoteRow {
    pub fn locked(&self) -> bool {
        self.is_locked.unwrap_or(0) != 0
    }

    pub fn in_bin(&self) -> bool {
        self.is_in_bin.unwrap_or(0) != 0
    }

    pub fn title_field(&self) -> Option<EncryptedField> {
        encrypted_field(&self.title, &self.title_iv)
    }

    pub fn content_field(&self) -> Option<EncryptedField> {
        encrypted_field(&self.content, &self.content_iv)
    }
}

fn encrypted_field(cipher_text: &Option<String>, iv: &Option<String>) -> Option<EncryptedField> {
    match (cipher_text, iv) {
        (Some(cipher_text), Some(iv)) => Some(EncryptedField {
            cipher_text: cipher_text.clone(),
            iv: iv.clone(),
        }),
        _ => None,
    }
}

/// A note as seen by callers
///
/// When `is_encrypted` is set, `title` and `content` are not plaintext:
/// either the note is locked and still holds its stored ciphertext, or a
/// field failed to decrypt and was replaced by an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub is_in_bin: bool,
    /// Epoch milliseconds
    pub reminder: Option<i64>,
    /// Handle of the externally scheduled reminder notification
    pub notification_id: Option<String>,
    pub is_locked: bool,
    pub is_encrypted: bool,
    pub tags: Vec<Tag>,
}

impl Note {
    /// Note whose fields are left exactly as stored
    pub fn sealed(row: NoteRow, tags: Vec<Tag>) -> Self {
        let is_in_bin = row.in_bin();
        let is_locked = row.locked();
        Self {
            id: row.id,
            title: row.title.unwrap_or_default(),
            content: row.content.unwrap_or_default(),
            is_in_bin,
            reminder: row.reminder,
            notification_id: row.notification_id,
            is_locked,
            is_encrypted: true,
            tags,
        }
    }

    pub fn tag_ids(&self) -> Vec<i64> {
        self.tags.iter().map(|t| t.id).collect()
    }

    pub fn has_tag(&self, tag_id: i64) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }
}

/// A tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}

/// A tag joined to one of its notes
#[derive(Debug, Clone, FromRow)]
pub struct NoteTagRow {
    pub note_id: i64,
    pub id: i64,
    pub name: String,
    pub color: String,
}

impl From<NoteTagRow> for Tag {
    fn from(row: NoteTagRow) -> Self {
        Tag {
            id: row.id,
            name: row.name,
            color: row.color,
        }
    }
}

#[derive(Debug, Clone, Copy, FromRow)]
pub(crate) struct IdRow {
    pub id: i64,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct HandleRow {
    #[sqlx(rename = "notificationId")]
    pub notification_id: String,
}

#[derive(Debug, Clone, Copy, FromRow)]
pub(crate) struct CountRow {
    pub count: i64,
}

/// Save note request; `id = None` creates a new note
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveNoteRequest {
    pub id: Option<i64>,
    /// `None` leaves the stored title untouched on update
    pub title: Option<String>,
    /// `None` leaves the stored content untouched on update
    pub content: Option<String>,
    pub reminder: Option<i64>,
    pub notification_id: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

impl SaveNoteRequest {
    /// True when neither title nor content carries any text
    pub fn is_blank(&self) -> bool {
        let blank = |field: &Option<String>| field.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.title) && blank(&self.content)
    }
}

/// Result of a guarded save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SaveOutcome<T> {
    Saved(T),
    /// Another save for the same key was in flight; nothing was written.
    Skipped,
    /// A brand-new note with no title and no content was not persisted.
    Empty,
}

impl<T> SaveOutcome<T> {
    pub fn saved(self) -> Option<T> {
        match self {
            SaveOutcome::Saved(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SaveOutcome::Skipped)
    }
}
