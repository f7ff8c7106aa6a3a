//! Save coordinator
//!
//! Duplicate-submission guard for note saves. Each key (a note id, or one
//! shared key for brand-new notes) maps to its own mutex. A save that finds
//! its key's mutex held is skipped, not queued.

use crate::database::SaveOutcome;
use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as SaveMutex, OwnedMutexGuard};

/// Lock key for a save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveKey {
    Note(i64),
    /// Shared by every save that creates a note
    NewNote,
}

impl SaveKey {
    pub fn for_note(id: Option<i64>) -> Self {
        id.map(SaveKey::Note).unwrap_or(SaveKey::NewNote)
    }
}

type LockMap = HashMap<SaveKey, Arc<SaveMutex<()>>>;

/// The map lock is only held for lookups, never across an await.
#[derive(Debug, Default)]
pub struct SaveCoordinator {
    locks: Mutex<LockMap>,
}

impl SaveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` unless a save for `key` is already in flight.
    ///
    /// The key is released when this returns, whether `operation`
    /// succeeded or failed, and also when the returned future is dropped
    /// part way through.
    pub async fn with_save_lock<F, Fut, T>(
        &self,
        key: SaveKey,
        operation: F,
    ) -> Result<SaveOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock = self.map().entry(key).or_default().clone();

        let guard = match lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Save already in progress for {:?}, skipping", key);
                return Ok(SaveOutcome::Skipped);
            }
        };
        let _held = HeldKey {
            coordinator: self,
            key,
            lock,
            guard: Some(guard),
        };

        operation().await.map(SaveOutcome::Saved)
    }

    /// Whether a save for `key` is currently running
    pub fn is_held(&self, key: SaveKey) -> bool {
        self.map()
            .get(&key)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of keys with a live entry in the lock map
    pub fn tracked_keys(&self) -> usize {
        self.map().len()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        // The map is always left consistent, so a poisoned lock is usable.
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases a save key on drop, including when the save is cancelled
struct HeldKey<'a> {
    coordinator: &'a SaveCoordinator,
    key: SaveKey,
    lock: Arc<SaveMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HeldKey<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.coordinator.map();
        // One reference in the map, one held here
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_runs_operation() {
        let coordinator = SaveCoordinator::new();

        let outcome = coordinator
            .with_save_lock(SaveKey::Note(1), || async { Ok(42) })
            .await
            .unwrap();

        assert_eq!(outcome, SaveOutcome::Saved(42));
        assert!(!coordinator.is_held(SaveKey::Note(1)));
        assert_eq!(coordinator.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_save_on_same_key_is_skipped() {
        let coordinator = SaveCoordinator::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let first = coordinator.with_save_lock(SaveKey::Note(5), || async move {
            started_tx.send(()).ok();
            release_rx.await.ok();
            Ok("first")
        });

        let second = async {
            started_rx.await.ok();
            assert!(coordinator.is_held(SaveKey::Note(5)));
            let outcome = coordinator
                .with_save_lock(SaveKey::Note(5), || async { Ok("second") })
                .await;
            release_tx.send(()).ok();
            outcome
        };

        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), SaveOutcome::Saved("first"));
        assert_eq!(second.unwrap(), SaveOutcome::Skipped);
        assert_eq!(coordinator.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let coordinator = SaveCoordinator::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let first = coordinator.with_save_lock(SaveKey::Note(1), || async move {
            started_tx.send(()).ok();
            release_rx.await.ok();
            Ok(1)
        });

        let others = async {
            started_rx.await.ok();
            let other_note = coordinator
                .with_save_lock(SaveKey::Note(2), || async { Ok(2) })
                .await;
            let new_note = coordinator
                .with_save_lock(SaveKey::NewNote, || async { Ok(3) })
                .await;
            release_tx.send(()).ok();
            (other_note, new_note)
        };

        let (first, (other_note, new_note)) = tokio::join!(first, others);

        assert_eq!(first.unwrap(), SaveOutcome::Saved(1));
        assert_eq!(other_note.unwrap(), SaveOutcome::Saved(2));
        assert_eq!(new_note.unwrap(), SaveOutcome::Saved(3));
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let coordinator = SaveCoordinator::new();

        let failed: Result<SaveOutcome<()>> = coordinator
            .with_save_lock(SaveKey::NewNote, || async {
                Err(AppError::NoteNotFound(9))
            })
            .await;
        assert!(failed.is_err());
        assert_eq!(coordinator.tracked_keys(), 0);

        let outcome = coordinator
            .with_save_lock(SaveKey::NewNote, || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved(()));
    }

    #[tokio::test]
    async fn test_lock_released_when_save_is_dropped() {
        let coordinator = SaveCoordinator::new();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.with_save_lock(SaveKey::Note(3), || async {
                std::future::pending::<()>().await;
                Ok(())
            }),
        )
        .await;
        assert!(abandoned.is_err());

        assert!(!coordinator.is_held(SaveKey::Note(3)));
        assert_eq!(coordinator.tracked_keys(), 0);

        let outcome = coordinator
            .with_save_lock(SaveKey::Note(3), || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved(7));
    }

    #[test]
    fn test_key_for_note() {
        assert_eq!(SaveKey::for_note(Some(4)), SaveKey::Note(4));
        assert_eq!(SaveKey::for_note(None), SaveKey::NewNote);
    }
}
