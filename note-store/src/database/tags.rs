//! Tag repository
//!
//! Tag CRUD, merging, and the note-tag link table. Any change that can
//! alter the tags shown on a note clears the whole note cache.

use super::executor::{Executor, Param};
use super::models::{IdRow, Tag};
use crate::config::DEFAULT_TAG_COLOR;
use crate::error::{AppError, Result};
use crate::storage::NoteCache;
use std::collections::HashSet;
use std::sync::Arc;

/// Identifies a tag for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRef<'a> {
    Id(i64),
    Name(&'a str),
}

#[derive(Clone)]
pub struct TagRepository {
    exec: Executor,
    cache: Arc<NoteCache>,
}

impl TagRepository {
    pub fn new(exec: Executor, cache: Arc<NoteCache>) -> Self {
        Self { exec, cache }
    }

    /// Every tag ordered by name; a missing color reads as the default
    pub async fn get_all_tags(&self) -> Result<Vec<Tag>> {
        self.exec
            .fetch(
                "SELECT id, name, COALESCE(color, ?) AS color FROM tags ORDER BY name",
                &[DEFAULT_TAG_COLOR.into()],
            )
            .await
    }

    pub async fn get_tag_by_id(&self, id: i64) -> Result<Option<Tag>> {
        self.exec
            .fetch_optional(
                "SELECT id, name, COALESCE(color, ?) AS color FROM tags WHERE id = ?",
                &[DEFAULT_TAG_COLOR.into(), id.into()],
            )
            .await
    }

    pub async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        self.exec
            .fetch_optional(
                "SELECT id, name, COALESCE(color, ?) AS color FROM tags WHERE name = ?",
                &[DEFAULT_TAG_COLOR.into(), name.into()],
            )
            .await
    }

    /// Create a tag. A duplicate name surfaces as a unique violation.
    pub async fn add_tag(&self, name: &str, color: Option<&str>) -> Result<i64> {
        let row: Option<IdRow> = self
            .exec
            .fetch_optional(
                "INSERT INTO tags (name, color) VALUES (?, ?) RETURNING id",
                &[name.into(), color.unwrap_or(DEFAULT_TAG_COLOR).into()],
            )
            .await?;

        let id = row
            .map(|r| r.id)
            .ok_or_else(|| AppError::Query(sqlx::Error::RowNotFound))?;
        tracing::info!("Created tag '{}' ({})", name, id);
        Ok(id)
    }

    pub async fn update_tag(&self, id: i64, name: &str, color: &str) -> Result<()> {
        let row: Option<IdRow> = self
            .exec
            .fetch_optional(
                "UPDATE tags SET name = ?, color = ? WHERE id = ? RETURNING id",
                &[name.into(), color.into(), id.into()],
            )
            .await?;
        row.ok_or_else(|| AppError::TagNotFound(id.to_string()))?;

        self.cache.invalidate_all().await;
        tracing::info!("Updated tag {}", id);
        Ok(())
    }

    /// Remove a tag and its links. Deleting an unknown tag is a no-op.
    pub async fn delete_tag(&self, tag: TagRef<'_>) -> Result<()> {
        let id = match tag {
            TagRef::Id(id) => id,
            TagRef::Name(name) => match self.get_tag_by_name(name).await? {
                Some(tag) => tag.id,
                None => {
                    tracing::debug!("Tag '{}' not found, nothing to delete", name);
                    return Ok(());
                }
            },
        };

        self.exec
            .execute("DELETE FROM note_tags WHERE tag_id = ?", &[id.into()])
            .await?;
        self.exec
            .execute("DELETE FROM tags WHERE id = ?", &[id.into()])
            .await?;

        self.cache.invalidate_all().await;
        tracing::info!("Deleted tag {:?}", tag);
        Ok(())
    }

    /// Fold `old_name` into `new_name`, creating the target if needed.
    ///
    /// Every note tagged `old_name` ends up tagged `new_name` exactly once,
    /// and the old tag is gone. A missing source tag is a no-op.
    pub async fn merge_tags(&self, old_name: &str, new_name: &str) -> Result<()> {
        if old_name == new_name {
            return Ok(());
        }

        let Some(old) = self.get_tag_by_name(old_name).await? else {
            tracing::debug!("Merge source '{}' not found", old_name);
            return Ok(());
        };
        let new_id = self.ensure_tag(new_name, None).await?;

        for note_id in self.get_notes_with_tag(old.id).await? {
            if !self.has_link(note_id, new_id).await? {
                self.exec
                    .execute(
                        "INSERT INTO note_tags (note_id, tag_id) VALUES (?, ?)",
                        &[note_id.into(), new_id.into()],
                    )
                    .await?;
            }
        }

        self.exec
            .execute("DELETE FROM note_tags WHERE tag_id = ?", &[old.id.into()])
            .await?;
        self.exec
            .execute("DELETE FROM tags WHERE id = ?", &[old.id.into()])
            .await?;

        self.cache.invalidate_all().await;
        tracing::info!("Merged tag '{}' into '{}'", old_name, new_name);
        Ok(())
    }

    /// Ids of notes carrying the tag, bin included
    pub async fn get_notes_with_tag(&self, tag_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<IdRow> = self
            .exec
            .fetch(
                "SELECT note_id AS id FROM note_tags WHERE tag_id = ? ORDER BY note_id",
                &[tag_id.into()],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    /// Id of the named tag, creating it when absent. A given color is
    /// applied to an existing tag whose color differs.
    pub async fn ensure_tag(&self, name: &str, color: Option<&str>) -> Result<i64> {
        match self.get_tag_by_name(name).await? {
            Some(tag) => {
                if let Some(color) = color.filter(|c| *c != tag.color) {
                    self.exec
                        .execute(
                            "UPDATE tags SET color = ? WHERE id = ?",
                            &[color.into(), tag.id.into()],
                        )
                        .await?;
                    self.cache.invalidate_all().await;
                }
                Ok(tag.id)
            }
            None => self.add_tag(name, color).await,
        }
    }

    /// Replace a note's tags from `(name, color)` pairs, creating or
    /// recoloring tags as needed
    pub async fn set_note_tags_by_name(&self, note_id: i64, tags: &[(&str, &str)]) -> Result<()> {
        let mut tag_ids = Vec::with_capacity(tags.len());
        for (name, color) in tags {
            tag_ids.push(self.ensure_tag(name, Some(*color)).await?);
        }

        replace_note_tags(&self.exec, note_id, &tag_ids).await?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    async fn has_link(&self, note_id: i64, tag_id: i64) -> Result<bool> {
        let row: Option<IdRow> = self
            .exec
            .fetch_optional(
                "SELECT note_id AS id FROM note_tags WHERE note_id = ? AND tag_id = ?",
                &[note_id.into(), tag_id.into()],
            )
            .await?;
        Ok(row.is_some())
    }
}

/// Tags of one note, ordered by name
pub(crate) async fn tags_for_note(exec: &Executor, note_id: i64) -> Result<Vec<Tag>> {
    exec.fetch(
        r#"
        SELECT t.id, t.name, COALESCE(t.color, ?) AS color
        FROM tags t
        JOIN note_tags nt ON nt.tag_id = t.id
        WHERE nt.note_id = ?
        ORDER BY t.name
        "#,
        &[DEFAULT_TAG_COLOR.into(), note_id.into()],
    )
    .await
}

/// Delete every link of the note, then insert one per distinct tag id.
/// Repeating the call with the same ids yields the same state.
pub(crate) async fn replace_note_tags(
    exec: &Executor,
    note_id: i64,
    tag_ids: &[i64],
) -> Result<()> {
    exec.execute("DELETE FROM note_tags WHERE note_id = ?", &[note_id.into()])
        .await?;

    let mut seen = HashSet::new();
    for tag_id in tag_ids.iter().copied().filter(|id| seen.insert(*id)) {
        exec.execute(
            "INSERT INTO note_tags (note_id, tag_id) VALUES (?, ?)",
            &[Param::Int(note_id), Param::Int(tag_id)],
        )
        .await?;
    }

    Ok(())
}
