//! Core note record.
//!
//! Notes are values: once created their content never changes, edits are
//! modelled as delete + recreate through the store.
use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicI64, Ordering},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag attached to every note created from a clipboard event.
pub const AUTO_CAPTURE_TAG: &str = "clipboard";

/// Last id handed out, as milliseconds since the epoch.
static LAST_NOTE_ID: AtomicI64 = AtomicI64::new(0);

/// Largest accepted id: the last millisecond of year 9999.
const MAX_NOTE_ID: i64 = 253_402_300_799_999;

/// Represents a single note in our system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier for the note
    pub id: String,
    /// Raw note text
    pub content: String,
    /// Tags for organization
    pub tags: Vec<String>,
    /// When the note was created
    pub created_at: DateTime<Utc>,
}

impl Note {
    /// Creates a new note with the given content and tags
    pub fn new(content: String, tags: Vec<String>) -> Self {
        let now = Utc::now();
        Note {
            id: next_note_id(now.timestamp_millis()).to_string(),
            content,
            tags,
            created_at: now,
        }
    }

    /// Creates a note for text captured from the clipboard
    pub fn from_clipboard(content: String) -> Self {
        Self::new(content, vec![AUTO_CAPTURE_TAG.to_string()])
    }

    /// Whether the note was captured from the clipboard
    pub fn is_auto_captured(&self) -> bool {
        self.has_tag(AUTO_CAPTURE_TAG)
    }

    /// Case-insensitive tag check
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.trim().to_lowercase();
        self.tags.iter().any(|t| t.trim().to_lowercase() == wanted)
    }

    /// Same note under a newly generated id
    pub fn with_fresh_id(mut self) -> Self {
        self.id = next_note_id(Utc::now().timestamp_millis()).to_string();
        self
    }

    fn tag_set(&self) -> BTreeSet<&str> {
        self.tags.iter().map(String::as_str).collect()
    }
}

// Tags compare as a set; display order is not part of identity.
impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.content == other.content
            && self.created_at == other.created_at
            && self.tag_set() == other.tag_set()
    }
}

impl Eq for Note {}

/// Returns a millisecond-derived id strictly greater than any handed out
/// or observed before in this process.
fn next_note_id(now_millis: i64) -> i64 {
    let mut last = LAST_NOTE_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now_millis.max(last.saturating_add(1));
        match LAST_NOTE_ID.compare_exchange_weak(
            last,
            candidate,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// Parses a well-formed note id: plain decimal digits within the
/// timestamp range.
fn parse_note_id(id: &str) -> Option<i64> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse::<i64>().ok().filter(|value| *value <= MAX_NOTE_ID)
}

/// Whether `id` is a well-formed note id, safe to use as a file name.
pub fn is_valid_note_id(id: &str) -> bool {
    parse_note_id(id).is_some()
}

/// Records an id loaded from storage so fresh ids never collide with it.
/// Malformed ids are ignored.
pub fn observe_note_id(id: &str) {
    if let Some(value) = parse_note_id(id) {
        LAST_NOTE_ID.fetch_max(value, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_within_the_same_millisecond() {
        let a = Note::new("a".into(), vec![]);
        let b = Note::new("a".into(), vec![]);
        assert_ne!(a.id, b.id);
        assert!(b.id.parse::<i64>().unwrap() > a.id.parse::<i64>().unwrap());
    }

    #[test]
    fn observed_ids_push_the_generator_forward() {
        let far_future = (Utc::now().timestamp_millis() + 10_000_000).to_string();
        observe_note_id(&far_future);
        let note = Note::new("after".into(), vec![]);
        assert!(note.id.parse::<i64>().unwrap() > far_future.parse::<i64>().unwrap());
    }

    #[test]
    fn only_plain_timestamps_are_valid_ids() {
        assert!(is_valid_note_id("1700000000000"));
        assert!(!is_valid_note_id(""));
        assert!(!is_valid_note_id("../escaped"));
        assert!(!is_valid_note_id("-5"));
        assert!(!is_valid_note_id("12a"));
        assert!(!is_valid_note_id(&i64::MAX.to_string()));
    }

    #[test]
    fn out_of_range_ids_do_not_exhaust_the_generator() {
        observe_note_id(&i64::MAX.to_string());
        observe_note_id("99999999999999999999999");
        let a = Note::new("a".into(), vec![]);
        let b = Note::new("b".into(), vec![]);
        assert!(is_valid_note_id(&a.id));
        assert!(b.id.parse::<i64>().unwrap() > a.id.parse::<i64>().unwrap());
    }

    #[test]
    fn tag_order_does_not_affect_equality() {
        let mut a = Note::new("x".into(), vec!["one".into(), "two".into()]);
        let mut b = a.clone();
        b.tags.reverse();
        assert_eq!(a, b);

        a.tags.push("three".into());
        assert_ne!(a, b);
    }

    #[test]
    fn clipboard_notes_carry_the_sentinel_tag() {
        let note = Note::from_clipboard("copied".into());
        assert!(note.is_auto_captured());
        assert_eq!(note.tags, vec![AUTO_CAPTURE_TAG.to_string()]);
        assert!(!Note::new("typed".into(), vec![]).is_auto_captured());
    }
}
