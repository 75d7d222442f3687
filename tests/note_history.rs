use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use studydesk::{
    forward_to_store, ClipboardBridge, ClipboardSource, Config, DeskState, MemoryKvStore, Note,
    NoteStore, Result, AUTO_CAPTURE_TAG, HISTORY_LIMIT,
};
use tokio::{sync::Mutex, time::Duration};

fn store() -> NoteStore {
    NoteStore::new(Arc::new(MemoryKvStore::new()), None)
}

fn contents(notes: &[Note]) -> Vec<&str> {
    notes.iter().map(|n| n.content.as_str()).collect()
}

#[test]
fn add_add_undo_undo_redo_walkthrough() {
    let mut store = store();

    store.add_note("A".into(), vec![]);
    assert_eq!(contents(store.notes()), ["A"]);
    assert_eq!(store.history().past_len(), 1);

    store.add_note("B".into(), vec![]);
    assert_eq!(contents(store.notes()), ["B", "A"]);
    assert_eq!(store.history().past_len(), 2);

    assert!(store.undo());
    assert_eq!(contents(store.notes()), ["A"]);
    assert_eq!(store.history().future_len(), 1);

    assert!(store.undo());
    assert!(store.notes().is_empty());
    assert_eq!(store.history().future_len(), 2);
    assert!(!store.undo());

    assert!(store.redo());
    assert_eq!(contents(store.notes()), ["A"]);
    assert!(store.can_redo());
}

#[test]
fn history_is_bounded() {
    let mut store = store();
    for i in 0..HISTORY_LIMIT + 5 {
        store.add_note(format!("note {}", i), vec![]);
    }
    assert_eq!(store.history().past_len(), HISTORY_LIMIT);

    let mut undone = 0;
    while store.undo() {
        undone += 1;
    }
    assert_eq!(undone, HISTORY_LIMIT);
    assert_eq!(store.notes().len(), 5);
}

#[test]
fn repeated_clipboard_text_is_captured_once() {
    let mut store = store();
    let note = store.ingest_external("X").unwrap();
    assert_eq!(note.content, "X");
    assert_eq!(note.tags, vec![AUTO_CAPTURE_TAG.to_string()]);

    assert!(store.ingest_external("X").is_none());
    assert_eq!(store.notes().len(), 1);
}

struct Script(VecDeque<&'static str>);

#[async_trait]
impl ClipboardSource for Script {
    async fn read_text(&mut self) -> Result<Option<String>> {
        Ok(self.0.pop_front().map(str::to_string))
    }
}

#[tokio::test]
async fn clipboard_changes_become_undoable_notes_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().join("data"),
        mirror_dir: dir.path().join("mirror"),
        mirror_notes: true,
        ..Config::default()
    };

    let mut desk = DeskState::open(&config).unwrap();
    desk.load();
    desk.notes.add_note("typed by hand".into(), vec!["manual".into()]);
    let desk = Arc::new(Mutex::new(desk));

    // First read is the startup baseline, the repeat is ignored
    let source = Script(VecDeque::from(["old", "copied text", "copied text"]));
    let mut bridge = ClipboardBridge::new(Duration::from_millis(5), false);
    let events = bridge.start(source).unwrap();
    let forwarder = forward_to_store(events, desk.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    bridge.dispose().await.unwrap();
    assert_eq!(forwarder.await.unwrap(), 1);

    {
        let mut desk = desk.lock().await;
        assert_eq!(contents(desk.notes.notes()), ["copied text", "typed by hand"]);
        assert!(desk.notes.latest().unwrap().is_auto_captured());

        assert!(desk.notes.undo());
        assert_eq!(contents(desk.notes.notes()), ["typed by hand"]);
    }

    let mut reopened = DeskState::open(&config).unwrap();
    reopened.load();
    assert_eq!(contents(reopened.notes.notes()), ["typed by hand"]);
    assert!(!reopened.notes.can_undo());

    let mirrored = std::fs::read_dir(dir.path().join("mirror")).unwrap().count();
    assert_eq!(mirrored, 1);
}
