//! Reminders service
//!
//! Schedules the notification for a note's reminder and keeps the stored
//! reminder time and notification handle in step with the scheduler.

use super::notification::NotificationScheduler;
use crate::config::{MIN_REMINDER_LEAD_MS, UNTITLED_NOTE_TITLE};
use crate::database::{Note, NoteRepository};
use crate::error::{AppError, Result};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

pub struct RemindersService<S> {
    repo: NoteRepository,
    scheduler: Arc<S>,
}

impl<S> Clone for RemindersService<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<S: NotificationScheduler> RemindersService<S> {
    pub fn new(repo: NoteRepository, scheduler: Arc<S>) -> Self {
        Self { repo, scheduler }
    }

    /// Schedule a reminder at `at_ms` (epoch milliseconds), replacing any
    /// existing one. Times less than five seconds away are rejected.
    pub async fn set_reminder(&self, note_id: i64, at_ms: i64) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        if at_ms.saturating_sub(now_ms) < MIN_REMINDER_LEAD_MS {
            return Err(AppError::InvalidReminder(format!(
                "Reminder must be at least {} seconds in the future",
                MIN_REMINDER_LEAD_MS / 1000
            )));
        }

        let note = self
            .repo
            .get_note_by_id(note_id, false)
            .await?
            .ok_or(AppError::NoteNotFound(note_id))?;

        if let Some(previous) = note.notification_id.as_deref() {
            if let Err(e) = self.scheduler.cancel(previous).await {
                tracing::warn!("Failed to cancel notification {}: {}", previous, e);
            }
        }

        let handle = self
            .scheduler
            .schedule(notification_title(&note), at_ms)
            .await?;
        self.repo.set_reminder(note_id, at_ms, handle).await?;

        match Utc.timestamp_millis_opt(at_ms).single() {
            Some(at) => tracing::info!("Reminder for note {} set at {}", note_id, at),
            None => tracing::info!("Reminder for note {} set at {} ms", note_id, at_ms),
        }
        Ok(())
    }

    /// Cancel and forget the reminder of a note
    pub async fn clear_reminder(&self, note_id: i64) -> Result<()> {
        if let Some(handle) = self.repo.clear_reminder(note_id).await? {
            self.scheduler.cancel(&handle).await?;
        }
        tracing::info!("Reminder for note {} cleared", note_id);
        Ok(())
    }
}

/// Locked, unreadable or untitled notes never leak a title into the
/// notification
fn notification_title(note: &Note) -> &str {
    if note.is_encrypted || note.title.trim().is_empty() {
        UNTITLED_NOTE_TITLE
    } else {
        note.title.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{test_key_source, NoteStore};
    use crate::database::SaveNoteRequest;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Mutex<Vec<(String, i64)>>,
        cancelled: Mutex<Vec<String>>,
    }

    impl NotificationScheduler for RecordingScheduler {
        async fn schedule(&self, title: &str, at_ms: i64) -> Result<Option<String>> {
            let mut scheduled = self.scheduled.lock().unwrap();
            scheduled.push((title.to_string(), at_ms));
            Ok(Some(format!("notif-{}", scheduled.len())))
        }

        async fn cancel(&self, handle: &str) -> Result<()> {
            self.cancelled.lock().unwrap().push(handle.to_string());
            Ok(())
        }
    }

    async fn setup() -> (NoteStore, RemindersService<RecordingScheduler>, Arc<RecordingScheduler>) {
        let store = NoteStore::in_memory(test_key_source()).await.unwrap();
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = RemindersService::new(store.notes.clone(), scheduler.clone());
        (store, service, scheduler)
    }

    async fn create(store: &NoteStore, title: &str, is_locked: bool) -> i64 {
        store
            .notes
            .save_note(SaveNoteRequest {
                title: Some(title.to_string()),
                is_locked,
                ..SaveNoteRequest::default()
            })
            .await
            .unwrap()
            .saved()
            .unwrap()
    }

    fn in_a_minute() -> i64 {
        Utc::now().timestamp_millis() + 60_000
    }

    #[tokio::test]
    async fn test_set_reminder_schedules_and_stores_handle() {
        let (store, service, scheduler) = setup().await;
        let id = create(&store, "Call mom", false).await;
        let at = in_a_minute();

        service.set_reminder(id, at).await.unwrap();

        assert_eq!(
            scheduler.scheduled.lock().unwrap().clone(),
            vec![("Call mom".to_string(), at)]
        );
        let note = store.notes.get_note_by_id(id, false).await.unwrap().unwrap();
        assert_eq!(note.reminder, Some(at));
        assert_eq!(note.notification_id.as_deref(), Some("notif-1"));
    }

    #[tokio::test]
    async fn test_rescheduling_cancels_previous() {
        let (store, service, scheduler) = setup().await;
        let id = create(&store, "x", false).await;

        service.set_reminder(id, in_a_minute()).await.unwrap();
        service.set_reminder(id, in_a_minute() + 1000).await.unwrap();

        assert_eq!(scheduler.cancelled.lock().unwrap().clone(), vec!["notif-1".to_string()]);
        let note = store.notes.get_note_by_id(id, false).await.unwrap().unwrap();
        assert_eq!(note.notification_id.as_deref(), Some("notif-2"));
    }

    #[tokio::test]
    async fn test_reminder_too_soon_rejected() {
        let (store, service, scheduler) = setup().await;
        let id = create(&store, "x", false).await;

        let soon = Utc::now().timestamp_millis() + 1_000;
        let result = service.set_reminder(id, soon).await;

        assert!(matches!(result, Err(AppError::InvalidReminder(_))));
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_far_past_reminder_rejected() {
        let (store, service, scheduler) = setup().await;
        let id = create(&store, "x", false).await;

        for at in [i64::MIN, i64::MIN + 1, 0, -1] {
            let result = service.set_reminder(id, at).await;
            assert!(matches!(result, Err(AppError::InvalidReminder(_))));
        }
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_note() {
        let (_store, service, _scheduler) = setup().await;
        let result = service.set_reminder(42, in_a_minute()).await;
        assert!(matches!(result, Err(AppError::NoteNotFound(42))));
    }

    #[tokio::test]
    async fn test_locked_and_untitled_use_placeholder() {
        let (store, service, scheduler) = setup().await;
        let locked = create(&store, "Private", true).await;
        let untitled = create(&store, "   ", false).await;

        service.set_reminder(locked, in_a_minute()).await.unwrap();
        service.set_reminder(untitled, in_a_minute()).await.unwrap();

        let titles: Vec<String> = scheduler
            .scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|(title, _)| title.clone())
            .collect();
        assert_eq!(titles, vec![UNTITLED_NOTE_TITLE, UNTITLED_NOTE_TITLE]);
    }

    #[tokio::test]
    async fn test_clear_reminder() {
        let (store, service, scheduler) = setup().await;
        let id = create(&store, "x", false).await;
        service.set_reminder(id, in_a_minute()).await.unwrap();

        service.clear_reminder(id).await.unwrap();
        service.clear_reminder(id).await.unwrap();

        assert_eq!(scheduler.cancelled.lock().unwrap().clone(), vec!["notif-1".to_string()]);
        let note = store.notes.get_note_by_id(id, false).await.unwrap().unwrap();
        assert!(note.reminder.is_none());
        assert!(note.notification_id.is_none());
    }
}
