use std::{collections::HashSet, sync::Arc};

use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use log::{debug, info, trace, warn};

use crate::{
    is_valid_note_id, load_collection, observe_note_id, save_collection, HistoryStack,
    KeyValueStore, Note, NoteMirror, NOTES_KEY,
};

/// Authoritative note list with linear undo/redo.
///
/// Every mutation flows through [`NoteStore::apply`]; each committed
/// snapshot is written to the key-value store and, when configured, the
/// flat-file mirror is reconciled with it. The list is ordered newest first.
pub struct NoteStore {
    /// Undo/redo state; `present` is what the user sees
    history: HistoryStack<Vec<Note>>,

    /// Snapshot sink, read-only with respect to the notes
    kv: Arc<dyn KeyValueStore>,

    /// Optional one-file-per-note mirror
    mirror: Option<NoteMirror>,
}

impl NoteStore {
    /// Creates an empty store; call [`NoteStore::load`] to hydrate it.
    pub fn new(kv: Arc<dyn KeyValueStore>, mirror: Option<NoteMirror>) -> Self {
        Self {
            history: HistoryStack::new(Vec::new()),
            kv,
            mirror,
        }
    }

    /// Hydrates the note list from the key-value store.
    ///
    /// When the store holds no notes and a mirror is configured, the mirror
    /// directory is read instead. Undo/redo state starts empty.
    ///
    /// # Returns
    ///
    /// The number of notes loaded
    pub fn load(&mut self) -> usize {
        let mut notes: Vec<Note> = load_collection(self.kv.as_ref(), NOTES_KEY);

        if notes.is_empty() {
            if let Some(mirror) = &self.mirror {
                debug!("No stored notes, reading mirror at {}", mirror.dir().display());
                notes = mirror.load_all();
            }
        }

        let notes = with_unique_ids(notes);
        let count = notes.len();
        self.history.reset(notes);
        info!("Loaded {} notes into store", count);
        count
    }

    /// Writes the current snapshot to the key-value store.
    pub fn save(&self) -> crate::Result<()> {
        save_collection(self.kv.as_ref(), NOTES_KEY, self.notes())
    }

    /// Computes `mutator(present)` and commits it.
    ///
    /// With `record_history` the previous snapshot becomes undoable and the
    /// redo stack is cleared. Persistence failures are logged; the in-memory
    /// commit always happens.
    pub fn apply<F>(&mut self, mutator: F, record_history: bool)
    where
        F: FnOnce(&[Note]) -> Vec<Note>,
    {
        let before = self.history.present().clone();
        self.history.apply(|notes| mutator(notes.as_slice()), record_history);
        trace!(
            "Applied mutation (recorded={}): {} -> {} notes",
            record_history,
            before.len(),
            self.notes().len()
        );
        self.commit(&before);
    }

    /// Adds a note at the front of the list.
    pub fn add_note(&mut self, content: String, tags: Vec<String>) -> Note {
        let note = Note::new(content, tags);
        self.insert(note.clone());
        info!("Added note {}", note.id);
        note
    }

    /// Removes the note with `note_id`.
    ///
    /// # Returns
    ///
    /// false when no such note exists; nothing is recorded in that case
    pub fn delete_note(&mut self, note_id: &str) -> bool {
        if self.get_note(note_id).is_none() {
            debug!("Cannot delete note {}: not found", note_id);
            return false;
        }
        self.apply(
            |notes| notes.iter().filter(|n| n.id != note_id).cloned().collect(),
            true,
        );
        info!("Deleted note {}", note_id);
        true
    }

    /// Removes every note as a single undoable step.
    pub fn clear(&mut self) {
        let count = self.notes().len();
        self.apply(|_| Vec::new(), true);
        info!("Cleared {} notes", count);
    }

    /// Replaces the whole list as a single undoable step.
    ///
    /// Notes with malformed or repeated ids get fresh ids; none are merged
    /// or dropped.
    pub fn replace_all(&mut self, notes: Vec<Note>) {
        let notes = with_unique_ids(notes);
        let count = notes.len();
        self.apply(move |_| notes, true);
        info!("Replaced note list with {} notes", count);
    }

    /// Clipboard entry point.
    ///
    /// Text identical to the most recent note is dropped, so repeated reads
    /// of an unchanged clipboard add nothing. Only the latest note is
    /// compared.
    ///
    /// # Returns
    ///
    /// The created note, or `None` for a duplicate
    pub fn ingest_external(&mut self, text: &str) -> Option<Note> {
        if self.latest().is_some_and(|latest| latest.content == text) {
            trace!("Dropping clipboard text identical to the latest note");
            return None;
        }
        let note = Note::from_clipboard(text.to_string());
        self.insert(note.clone());
        info!("Captured clipboard text as note {}", note.id);
        Some(note)
    }

    /// Restores the previous snapshot. No-op when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let before = self.history.present().clone();
        if !self.history.undo() {
            debug!("Nothing to undo");
            return false;
        }
        self.commit(&before);
        true
    }

    /// Re-applies the last undone snapshot. No-op when there is nothing to
    /// redo.
    pub fn redo(&mut self) -> bool {
        let before = self.history.present().clone();
        if !self.history.redo() {
            debug!("Nothing to redo");
            return false;
        }
        self.commit(&before);
        true
    }

    pub fn notes(&self) -> &[Note] {
        self.history.present()
    }

    /// The most recently added note.
    pub fn latest(&self) -> Option<&Note> {
        self.notes().first()
    }

    pub fn get_note(&self, note_id: &str) -> Option<&Note> {
        self.notes().iter().find(|n| n.id == note_id)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryStack<Vec<Note>> {
        &self.history
    }

    /// Retrieves all notes with a specific tag, newest first
    pub fn notes_by_tag(&self, tag: &str) -> Vec<Note> {
        let matching: Vec<Note> = self
            .notes()
            .iter()
            .filter(|note| note.has_tag(tag))
            .cloned()
            .collect();
        debug!("Found {} notes with tag: {}", matching.len(), tag);
        matching
    }

    /// Searches note content and tags using fuzzy matching
    /// Returns notes sorted by relevance score
    pub fn search(&self, query: &str) -> Vec<Note> {
        let matcher = SkimMatcherV2::default();

        let mut scored: Vec<(i64, &Note)> = self
            .notes()
            .iter()
            .filter_map(|note| {
                let content_score = matcher.fuzzy_match(&note.content, query).unwrap_or(0);
                let tag_score = note
                    .tags
                    .iter()
                    .filter_map(|t| matcher.fuzzy_match(t, query))
                    .max()
                    .unwrap_or(0);
                // Tag hits outweigh body text
                let score = content_score + tag_score * 2;
                (score > 0).then_some((score, note))
            })
            .collect();

        // Stable sort keeps newest-first order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        debug!("Search '{}' matched {} notes", query, scored.len());
        scored.into_iter().map(|(_, note)| note.clone()).collect()
    }

    fn insert(&mut self, note: Note) {
        self.apply(
            move |notes| {
                let mut next = Vec::with_capacity(notes.len() + 1);
                next.push(note);
                next.extend_from_slice(notes);
                next
            },
            true,
        );
    }

    fn commit(&self, before: &[Note]) {
        if let Err(e) = self.save() {
            warn!("Failed to persist notes snapshot: {}", e);
        }
        if let Some(mirror) = &self.mirror {
            mirror.reconcile(before, self.notes());
        }
    }
}

/// Gives every note a well-formed id, unique within the list.
///
/// Valid ids are registered with the generator first so that reissued ids
/// sort after all of them.
fn with_unique_ids(notes: Vec<Note>) -> Vec<Note> {
    for note in &notes {
        observe_note_id(&note.id);
    }

    let mut seen = HashSet::with_capacity(notes.len());
    notes
        .into_iter()
        .map(|note| {
            if is_valid_note_id(&note.id) && seen.insert(note.id.clone()) {
                return note;
            }
            let old_id = note.id.clone();
            let note = note.with_fresh_id();
            warn!("Reissued note id {:?} as {}", old_id, note.id);
            seen.insert(note.id.clone());
            note
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryKvStore, AUTO_CAPTURE_TAG, HISTORY_LIMIT};

    fn store() -> (NoteStore, Arc<MemoryKvStore>) {
        let kv = Arc::new(MemoryKvStore::new());
        (NoteStore::new(kv.clone(), None), kv)
    }

    fn contents(store: &NoteStore) -> Vec<&str> {
        store.notes().iter().map(|n| n.content.as_str()).collect()
    }

    #[test]
    fn add_and_undo_walkthrough() {
        let (mut store, _) = store();
        store.add_note("A".into(), vec![]);
        store.add_note("B".into(), vec![]);
        assert_eq!(contents(&store), vec!["B", "A"]);
        assert_eq!(store.history().past_len(), 2);

        assert!(store.undo());
        assert_eq!(contents(&store), vec!["A"]);
        assert!(store.undo());
        assert!(contents(&store).is_empty());
        assert_eq!(store.history().future_len(), 2);

        assert!(store.redo());
        assert_eq!(contents(&store), vec!["A"]);
    }

    #[test]
    fn ingest_external_is_idempotent_for_the_latest_note() {
        let (mut store, _) = store();
        let note = store.ingest_external("X").expect("first ingest adds a note");
        assert_eq!(note.tags, vec![AUTO_CAPTURE_TAG.to_string()]);
        assert_eq!(note.content, "X");

        assert!(store.ingest_external("X").is_none());
        assert_eq!(store.notes().len(), 1);
    }

    #[test]
    fn ingest_only_compares_with_the_latest_note() {
        let (mut store, _) = store();
        store.ingest_external("X");
        store.add_note("typed".into(), vec![]);
        assert!(store.ingest_external("X").is_some());
        assert_eq!(contents(&store), vec!["X", "typed", "X"]);
    }

    #[test]
    fn unrecorded_apply_is_not_undoable() {
        let (mut store, _) = store();
        store.add_note("A".into(), vec![]);
        store.apply(|notes| notes.iter().rev().cloned().collect(), false);
        assert_eq!(store.history().past_len(), 1);
        assert_eq!(store.history().future_len(), 0);
    }

    #[test]
    fn new_edit_after_undo_drops_redo() {
        let (mut store, _) = store();
        store.add_note("A".into(), vec![]);
        store.undo();
        assert!(store.can_redo());
        store.add_note("B".into(), vec![]);
        assert!(!store.can_redo());
        assert!(!store.redo());
    }

    #[test]
    fn history_depth_is_bounded() {
        let (mut store, _) = store();
        for i in 0..(HISTORY_LIMIT + 5) {
            store.add_note(format!("note {}", i), vec![]);
        }
        assert_eq!(store.history().past_len(), HISTORY_LIMIT);
    }

    #[test]
    fn delete_and_clear_are_undoable() {
        let (mut store, _) = store();
        let a = store.add_note("A".into(), vec![]);
        store.add_note("B".into(), vec![]);

        assert!(store.delete_note(&a.id));
        assert_eq!(contents(&store), vec!["B"]);
        assert!(!store.delete_note("missing"));

        store.clear();
        assert!(store.notes().is_empty());
        store.undo();
        assert_eq!(contents(&store), vec!["B"]);
        store.undo();
        assert_eq!(contents(&store), vec!["B", "A"]);
    }

    #[test]
    fn every_commit_is_persisted() {
        let (mut store, kv) = store();
        store.add_note("A".into(), vec![]);
        store.add_note("B".into(), vec![]);
        store.undo();

        let saved: Vec<Note> = load_collection(kv.as_ref(), NOTES_KEY);
        assert_eq!(saved, store.notes());

        let mut reloaded = NoteStore::new(kv.clone(), None);
        assert_eq!(reloaded.load(), 1);
        assert_eq!(reloaded.notes(), store.notes());
        assert!(!reloaded.can_undo());
    }

    #[test]
    fn tag_filter_and_search() {
        let (mut store, _) = store();
        store.add_note("photosynthesis in plants".into(), vec!["biology".into()]);
        store.add_note("french verbs".into(), vec!["language".into()]);
        store.ingest_external("copied paragraph");

        assert_eq!(store.notes_by_tag("BIOLOGY").len(), 1);
        assert_eq!(store.notes_by_tag(AUTO_CAPTURE_TAG).len(), 1);

        let hits = store.search("verbs");
        assert_eq!(hits.first().map(|n| n.content.as_str()), Some("french verbs"));
        assert!(store.search("zzzzqqq").is_empty());
    }

    #[test]
    fn mirror_follows_undo_and_redo() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = NoteMirror::new(dir.path()).unwrap();
        let kv = Arc::new(MemoryKvStore::new());
        let mut store = NoteStore::new(kv, Some(mirror.clone()));

        let note = store.add_note("mirrored".into(), vec!["t".into()]);
        let path = dir.path().join(format!("{}.txt", note.id));
        assert!(path.exists());

        store.undo();
        assert!(!path.exists());
        store.redo();
        assert!(path.exists());

        assert_eq!(mirror.load_all(), vec![note]);
    }

    #[test]
    fn load_falls_back_to_mirror_when_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = NoteMirror::new(dir.path()).unwrap();
        let note = Note::new("from disk".into(), vec![]);
        mirror.write_note(&note).unwrap();

        let mut store = NoteStore::new(Arc::new(MemoryKvStore::new()), Some(mirror));
        assert_eq!(store.load(), 1);
        assert_eq!(store.notes(), &[note]);
    }

    #[test]
    fn replace_all_reissues_malformed_and_repeated_ids() {
        let (mut store, _) = store();
        let mut first = Note::new("first".into(), vec![]);
        first.id = "1".into();
        let mut second = first.clone();
        second.content = "second".into();
        let mut hostile = Note::new("hostile".into(), vec![]);
        hostile.id = "../escaped".into();

        store.replace_all(vec![first, second, hostile]);

        let ids: HashSet<&str> = store.notes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(store.notes().iter().all(|n| is_valid_note_id(&n.id)));
        assert_eq!(contents(&store), vec!["first", "second", "hostile"]);
        assert_eq!(store.notes()[0].id, "1");

        assert!(store.delete_note("1"));
        assert_eq!(contents(&store), vec!["second", "hostile"]);
    }
}
