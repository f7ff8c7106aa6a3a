//! Integration tests for the note store
//!
//! These tests run against file-backed databases and verify:
//! - Encrypted persistence across reopen
//! - Schema setup idempotence
//! - Duplicate save protection and cache coherence
//! - Bin lifecycle, tag merging and cascading deletes

use note_store::database::{ensure_schema, SaveNoteRequest, SaveOutcome, TagRef};
use note_store::{AppError, NoteStore, StoreConfig};
use tempfile::TempDir;

fn test_config(temp_dir: &TempDir, passphrase: &str) -> StoreConfig {
    StoreConfig {
        database_path: temp_dir.path().join("notes.db"),
        passphrase: passphrase.to_string(),
        salt: "integration-salt".to_string(),
        key_cost: 1,
        key_memory_kib: 64,
    }
}

/// Helper to open a file-backed store in a fresh directory
async fn create_test_store() -> (NoteStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = NoteStore::open(&test_config(&temp_dir, "correct horse"))
        .await
        .unwrap();
    (store, temp_dir)
}

fn note(title: &str, content: &str) -> SaveNoteRequest {
    SaveNoteRequest {
        title: Some(title.to_string()),
        content: Some(content.to_string()),
        ..SaveNoteRequest::default()
    }
}

fn tagged(title: &str, tag_ids: Vec<i64>) -> SaveNoteRequest {
    SaveNoteRequest {
        tag_ids,
        ..note(title, "")
    }
}

async fn create(store: &NoteStore, req: SaveNoteRequest) -> i64 {
    store.notes.save_note(req).await.unwrap().saved().unwrap()
}

#[tokio::test]
async fn test_round_trip_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir, "correct horse");

    let id = {
        let store = NoteStore::open(&config).await.unwrap();
        let id = create(&store, note("Groceries", "Milk, bread")).await;
        store.close().await;
        id
    };

    let store = NoteStore::open(&config).await.unwrap();
    let loaded = store.notes.get_note_by_id(id, false).await.unwrap().unwrap();
    assert_eq!(loaded.title, "Groceries");
    assert_eq!(loaded.content, "Milk, bread");
    assert!(!loaded.is_encrypted);
}

#[tokio::test]
async fn test_wrong_passphrase_degrades_to_encrypted() {
    let temp_dir = TempDir::new().unwrap();

    let id = {
        let store = NoteStore::open(&test_config(&temp_dir, "right")).await.unwrap();
        let id = create(&store, note("Private", "Body")).await;
        store.close().await;
        id
    };

    let store = NoteStore::open(&test_config(&temp_dir, "wrong")).await.unwrap();
    let loaded = store.notes.get_note_by_id(id, false).await.unwrap().unwrap();
    assert!(loaded.is_encrypted);
    assert_eq!(loaded.title, "");
    assert_eq!(loaded.content, "");
}

#[tokio::test]
async fn test_schema_setup_is_idempotent() {
    let (store, _temp) = create_test_store().await;
    let id = create(&store, note("kept", "")).await;

    ensure_schema(store.executor()).await.unwrap();
    ensure_schema(store.executor()).await.unwrap();

    let notes = store.notes.load_notes().await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, id);
}

#[tokio::test]
async fn test_at_most_one_concurrent_save() {
    let (store, _temp) = create_test_store().await;
    let id = create(&store, note("start", "")).await;

    let (a, b) = tokio::join!(
        store.notes.save_note(SaveNoteRequest {
            id: Some(id),
            ..note("A", "")
        }),
        store.notes.save_note(SaveNoteRequest {
            id: Some(id),
            ..note("B", "")
        }),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let saved = outcomes.iter().filter(|o| matches!(o, SaveOutcome::Saved(_))).count();
    let skipped = outcomes.iter().filter(|o| o.is_skipped()).count();
    assert_eq!((saved, skipped), (1, 1));

    let title = store.notes.get_note_by_id(id, false).await.unwrap().unwrap().title;
    assert!(title == "A" || title == "B");
}

#[tokio::test]
async fn test_sequential_saves_both_apply() {
    let (store, _temp) = create_test_store().await;
    let id = create(&store, note("v1", "")).await;

    for title in ["v2", "v3"] {
        let outcome = store
            .notes
            .save_note(SaveNoteRequest {
                id: Some(id),
                ..note(title, "")
            })
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved(id));
    }

    let loaded = store.notes.get_note_by_id(id, false).await.unwrap().unwrap();
    assert_eq!(loaded.title, "v3");
}

#[tokio::test]
async fn test_cache_coherence_after_lock() {
    let (store, _temp) = create_test_store().await;
    let id = create(&store, note("Diary", "Dear diary")).await;

    let notes = store.notes.load_notes().await.unwrap();
    assert_eq!(notes[0].content, "Dear diary");

    store.notes.toggle_note_lock(id, true).await.unwrap();

    let notes = store.notes.load_notes().await.unwrap();
    assert!(notes[0].is_encrypted);
    assert_ne!(notes[0].content, "Dear diary");
}

#[tokio::test]
async fn test_lock_during_reads_keeps_plaintext_out_of_cache() {
    let (store, _temp) = create_test_store().await;
    let id = create(&store, note("Diary", "Dear diary")).await;

    let (listed, single, locked) = tokio::join!(
        store.notes.load_notes(),
        store.notes.get_note_by_id(id, false),
        store.notes.toggle_note_lock(id, true),
    );
    listed.unwrap();
    single.unwrap();
    locked.unwrap();

    assert!(store.cache().get(id).await.is_none());
    let notes = store.notes.load_notes().await.unwrap();
    assert!(notes[0].is_encrypted);
    assert_ne!(notes[0].content, "Dear diary");
}

#[tokio::test]
async fn test_bin_lifecycle() {
    let (store, _temp) = create_test_store().await;
    let id = create(&store, note("T", "C")).await;

    store.notes.move_multiple_to_bin(&[id]).await.unwrap();
    assert!(store.notes.load_notes().await.unwrap().is_empty());
    assert_eq!(store.notes.load_bin_notes().await.unwrap()[0].id, id);

    store.notes.restore_multiple_from_bin(&[id]).await.unwrap();
    let restored = &store.notes.load_notes().await.unwrap()[0];
    assert_eq!((restored.title.as_str(), restored.content.as_str()), ("T", "C"));

    store.notes.move_multiple_to_bin(&[id]).await.unwrap();
    store.notes.empty_bin_completely().await.unwrap();
    assert!(store.notes.load_bin_notes().await.unwrap().is_empty());
    assert!(store.notes.get_note_by_id(id, false).await.unwrap().is_none());
}

#[tokio::test]
async fn test_merge_leaves_unique_links() {
    let (store, _temp) = create_test_store().await;
    let a = store.tags.add_tag("a", None).await.unwrap();
    let b = store.tags.add_tag("b", None).await.unwrap();
    let n1 = create(&store, tagged("1", vec![a, b])).await;
    let n2 = create(&store, tagged("2", vec![a])).await;

    store.tags.merge_tags("a", "b").await.unwrap();

    assert_eq!(store.notes.get_note_tag_ids(n1).await.unwrap(), vec![b]);
    assert_eq!(store.notes.get_note_tag_ids(n2).await.unwrap(), vec![b]);
    let names: Vec<String> = store
        .tags
        .get_all_tags()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["b".to_string()]);
}

#[tokio::test]
async fn test_batch_delete_returns_handles() {
    let (store, _temp) = create_test_store().await;
    let with_handle = |handle: &str| SaveNoteRequest {
        reminder: Some(2_000_000_000_000),
        notification_id: Some(handle.to_string()),
        ..note("r", "")
    };
    let x = create(&store, with_handle("x")).await;
    let y = create(&store, with_handle("y")).await;
    let plain = create(&store, note("plain", "")).await;

    let mut handles = store.notes.delete_multiple_notes(&[x, y, plain]).await.unwrap();
    handles.sort();
    assert_eq!(handles, vec!["x".to_string(), "y".to_string()]);

    assert!(store.notes.delete_multiple_notes(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleting_tag_and_note_cascade() {
    let (store, _temp) = create_test_store().await;
    let t = store.tags.add_tag("t", None).await.unwrap();
    let keep = store.tags.add_tag("keep", None).await.unwrap();
    let id = create(&store, tagged("n", vec![t, keep])).await;

    store.tags.delete_tag(TagRef::Id(t)).await.unwrap();
    let loaded = store.notes.get_note_by_id(id, false).await.unwrap().unwrap();
    assert_eq!(loaded.tag_ids(), vec![keep]);

    store.notes.delete_multiple_notes(&[id]).await.unwrap();
    assert!(store.tags.get_notes_with_tag(keep).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_note_errors() {
    let (store, _temp) = create_test_store().await;

    assert!(matches!(
        store.notes.toggle_note_lock(5, true).await,
        Err(AppError::NoteNotFound(5))
    ));
    assert!(matches!(
        store
            .notes
            .save_note(SaveNoteRequest {
                id: Some(5),
                ..note("x", "")
            })
            .await,
        Err(AppError::NoteNotFound(5))
    ));
}
