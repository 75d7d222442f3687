//! Media library: uploaded documents, videos and images with per-page
//! annotations.
use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{load_collection, save_collection, DeskError, KeyValueStore, Result, BOOKS_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookKind {
    Document,
    Video,
    Image,
}

impl fmt::Display for BookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookKind::Document => "document",
            BookKind::Video => "video",
            BookKind::Image => "image",
        };
        f.write_str(name)
    }
}

impl FromStr for BookKind {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "document" | "doc" | "pdf" => Ok(BookKind::Document),
            "video" => Ok(BookKind::Video),
            "image" | "img" => Ok(BookKind::Image),
            other => Err(DeskError::InvalidFormat {
                message: format!(
                    "unknown book type '{}', expected document, video or image",
                    other
                ),
            }),
        }
    }
}

/// A free-hand pen stroke in page coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<(f32, f32)>,
    pub color: String,
    pub width: f32,
}

/// A text memo pinned at a page position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMemo {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

/// Annotations for one page; both lists only grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageAnnotations {
    #[serde(default)]
    pub strokes: Vec<Stroke>,
    #[serde(default)]
    pub memos: Vec<TextMemo>,
}

/// Media-library entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    /// Short snippet shown in listings
    pub content: String,
    /// Completion percentage, 0-100
    pub progress: u8,
    pub kind: BookKind,
    /// Where the media bytes live, if stored externally
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<u32, PageAnnotations>,
    pub added_at: DateTime<Utc>,
}

/// Ordered collection of books, persisted under `books`.
///
/// Books are never removed here; callers that need deletion splice the
/// list themselves.
pub struct Library {
    books: Vec<Book>,
    kv: Arc<dyn KeyValueStore>,
}

impl Library {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            books: Vec::new(),
            kv,
        }
    }

    pub fn load(&mut self) -> usize {
        self.books = load_collection(self.kv.as_ref(), BOOKS_KEY);
        info!("Loaded {} books", self.books.len());
        self.books.len()
    }

    pub fn save(&self) -> Result<()> {
        save_collection(self.kv.as_ref(), BOOKS_KEY, &self.books)
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn get(&self, id: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    /// Registers an uploaded item; newest first.
    pub fn add_book(
        &mut self,
        title: String,
        content: String,
        kind: BookKind,
        media_ref: Option<String>,
    ) -> Book {
        let now = Utc::now();
        let book = Book {
            id: self.unique_id(format!("book-{}", now.timestamp_millis())),
            title,
            content,
            progress: 0,
            kind,
            media_ref,
            annotations: BTreeMap::new(),
            added_at: now,
        };
        self.books.insert(0, book.clone());
        info!("Added {} '{}' as {}", book.kind, book.title, book.id);
        self.persist();
        book
    }

    /// Sets the completion percentage, clamped to 100.
    pub fn set_progress(&mut self, id: &str, progress: u8) -> Result<&Book> {
        let book = self.book_mut(id)?;
        book.progress = progress.min(100);
        debug!("Progress of {} set to {}%", id, book.progress);
        self.persist();
        self.get(id).ok_or_else(|| DeskError::BookNotFound { id: id.to_string() })
    }

    /// Appends a pen stroke to `page`.
    pub fn add_stroke(&mut self, id: &str, page: u32, stroke: Stroke) -> Result<()> {
        let book = self.book_mut(id)?;
        book.annotations.entry(page).or_default().strokes.push(stroke);
        debug!("Added stroke to {} page {}", id, page);
        self.persist();
        Ok(())
    }

    /// Appends a text memo to `page`.
    pub fn add_memo(&mut self, id: &str, page: u32, memo: TextMemo) -> Result<()> {
        let book = self.book_mut(id)?;
        book.annotations.entry(page).or_default().memos.push(memo);
        debug!("Added memo to {} page {}", id, page);
        self.persist();
        Ok(())
    }

    pub fn page_annotations(&self, id: &str, page: u32) -> Option<&PageAnnotations> {
        self.get(id).and_then(|b| b.annotations.get(&page))
    }

    /// Replaces every book, used by archive import.
    pub fn replace_all(&mut self, books: Vec<Book>) {
        self.books = books;
        self.persist();
    }

    fn book_mut(&mut self, id: &str) -> Result<&mut Book> {
        self.books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| DeskError::BookNotFound { id: id.to_string() })
    }

    fn unique_id(&self, base: String) -> String {
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.get(&candidate).is_some() {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        candidate
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("Failed to persist library: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKvStore;

    fn library() -> (Library, Arc<MemoryKvStore>) {
        let kv = Arc::new(MemoryKvStore::new());
        (Library::new(kv.clone()), kv)
    }

    #[test]
    fn books_get_distinct_ids() {
        let (mut lib, _) = library();
        let a = lib.add_book("A".into(), String::new(), BookKind::Document, None);
        let b = lib.add_book("B".into(), String::new(), BookKind::Video, None);
        assert_ne!(a.id, b.id);
        assert_eq!(lib.books()[0].title, "B");
    }

    #[test]
    fn annotations_append_within_a_page() {
        let (mut lib, kv) = library();
        let book = lib.add_book("Physics".into(), "ch1".into(), BookKind::Document, None);

        lib.add_memo(
            &book.id,
            3,
            TextMemo {
                x: 10.0,
                y: 20.0,
                text: "check units".into(),
            },
        )
        .unwrap();
        lib.add_memo(
            &book.id,
            3,
            TextMemo {
                x: 5.0,
                y: 5.0,
                text: "see fig 2".into(),
            },
        )
        .unwrap();
        lib.add_stroke(
            &book.id,
            4,
            Stroke {
                points: vec![(0.0, 0.0), (1.0, 1.0)],
                color: "#ff0000".into(),
                width: 2.0,
            },
        )
        .unwrap();

        let page = lib.page_annotations(&book.id, 3).unwrap();
        assert_eq!(page.memos.len(), 2);
        assert_eq!(page.memos[0].text, "check units");
        assert!(page.strokes.is_empty());

        let mut reloaded = Library::new(kv);
        reloaded.load();
        assert_eq!(reloaded.books(), lib.books());
    }

    #[test]
    fn progress_is_clamped() {
        let (mut lib, _) = library();
        let book = lib.add_book("Clip".into(), String::new(), BookKind::Image, None);
        assert_eq!(lib.set_progress(&book.id, 250).unwrap().progress, 100);
        assert!(matches!(
            lib.set_progress("nope", 10),
            Err(DeskError::BookNotFound { .. })
        ));
    }

    #[test]
    fn kinds_parse_and_serialize_lowercase() {
        assert_eq!("PDF".parse::<BookKind>().unwrap(), BookKind::Document);
        assert!("audio".parse::<BookKind>().is_err());
        assert_eq!(
            serde_json::to_string(&BookKind::Video).unwrap(),
            "\"video\""
        );
    }
}
