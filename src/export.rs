//! ZIP archives of the whole desk.
//!
//! An archive holds one JSON entry per collection (`notes.json`,
//! `checkins.json`, `books.json`) in the same layout the key-value store
//! uses.
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use chrono::Utc;
use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use zip::{write::FileOptions, ZipArchive, ZipWriter};

use crate::{
    Book, DailyCheckIn, DeskError, DeskState, Note, Result, BOOKS_KEY, CHECKINS_KEY, NOTES_KEY,
};

/// Collections read back from an archive
#[derive(Debug, Default)]
pub struct ArchiveContents {
    pub notes: Vec<Note>,
    pub checkins: Vec<DailyCheckIn>,
    pub books: Vec<Book>,
}

/// Outcome of importing an archive into the desk
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub archive: PathBuf,
    pub notes: usize,
    pub checkins: usize,
    pub books: usize,
}

fn entry_name(key: &str) -> String {
    format!("{}.json", key)
}

/// Writes every collection of `desk` into a timestamped archive under `dir`.
pub fn export_desk(desk: &DeskState, dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|_| DeskError::DirectoryError {
            path: dir.to_path_buf(),
        })?;
    }

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("studydesk_export_{}.zip", timestamp));
    write_archive(
        &path,
        desk.notes.notes(),
        desk.checkins.records(),
        desk.library.books(),
    )?;

    info!(
        "Exported {} notes, {} check-ins and {} books to {}",
        desk.notes.notes().len(),
        desk.checkins.records().len(),
        desk.library.books().len(),
        path.display()
    );
    Ok(path)
}

/// Writes the three collections into a new archive at `path`.
pub fn write_archive(
    path: &Path,
    notes: &[Note],
    checkins: &[DailyCheckIn],
    books: &[Book],
) -> Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);

    add_entry(&mut zip, NOTES_KEY, notes)?;
    add_entry(&mut zip, CHECKINS_KEY, checkins)?;
    add_entry(&mut zip, BOOKS_KEY, books)?;

    zip.finish()?;
    Ok(())
}

fn add_entry<T: Serialize>(zip: &mut ZipWriter<File>, key: &str, items: &[T]) -> Result<()> {
    let options = FileOptions::<zip::write::ExtendedFileOptions>::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let json = serde_json::to_string_pretty(items)?;
    zip.start_file(entry_name(key), options)?;
    zip.write_all(json.as_bytes())?;
    debug!("Wrote {} {} to archive", items.len(), key);
    Ok(())
}

/// Reads an archive written by [`write_archive`].
///
/// A missing or malformed entry yields an empty collection; only an
/// unreadable archive is an error.
pub fn read_archive(path: &Path) -> Result<ArchiveContents> {
    if !path.is_file() {
        return Err(DeskError::ApplicationError {
            message: format!("Archive not found: {}", path.display()),
        });
    }
    if path.extension().map_or(true, |ext| ext != "zip") {
        return Err(DeskError::ApplicationError {
            message: format!("Not a valid ZIP file: {}", path.display()),
        });
    }

    let mut archive = ZipArchive::new(File::open(path)?)?;
    Ok(ArchiveContents {
        notes: read_entry(&mut archive, NOTES_KEY),
        checkins: read_entry(&mut archive, CHECKINS_KEY),
        books: read_entry(&mut archive, BOOKS_KEY),
    })
}

fn read_entry<T: DeserializeOwned>(archive: &mut ZipArchive<File>, key: &str) -> Vec<T> {
    let name = entry_name(key);
    let mut raw = String::new();
    match archive.by_name(&name) {
        Ok(mut entry) => {
            if let Err(e) = entry.read_to_string(&mut raw) {
                warn!("Failed to read {} from archive: {}", name, e);
                return Vec::new();
            }
        }
        Err(_) => {
            warn!("Archive has no {} entry", name);
            return Vec::new();
        }
    }

    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Ignoring malformed {} in archive: {}", name, e);
        Vec::new()
    })
}

/// Replaces the desk's collections with the archive's.
///
/// The note replacement is a recorded history step, so it can be undone
/// within the same session.
pub fn import_desk(desk: &mut DeskState, path: &Path) -> Result<ImportSummary> {
    let contents = read_archive(path)?;
    let summary = ImportSummary {
        archive: path.to_path_buf(),
        notes: contents.notes.len(),
        checkins: contents.checkins.len(),
        books: contents.books.len(),
    };

    desk.notes.replace_all(contents.notes);
    desk.checkins.replace_all(contents.checkins);
    desk.library.replace_all(contents.books);

    info!(
        "Imported {} notes, {} check-ins and {} books from {}",
        summary.notes,
        summary.checkins,
        summary.books,
        path.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{is_valid_note_id, parse_day, BookKind, MemoryKvStore, NoteMirror};

    fn desk() -> DeskState {
        DeskState::new(Arc::new(MemoryKvStore::new()), None)
    }

    #[test]
    fn export_then_import_restores_every_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = desk();
        source.notes.add_note("mitochondria".into(), vec!["bio".into()]);
        source.notes.add_note("krebs cycle".into(), vec![]);
        source.checkins.toggle(parse_day("2024-03-01").unwrap(), "read ch. 2");
        source
            .library
            .add_book("Cell Biology".into(), "text".into(), BookKind::Document, None);

        let path = export_desk(&source, dir.path()).unwrap();
        assert!(path.extension().is_some_and(|ext| ext == "zip"));

        let mut target = desk();
        target.notes.add_note("to be replaced".into(), vec![]);
        let summary = import_desk(&mut target, &path).unwrap();

        assert_eq!((summary.notes, summary.checkins, summary.books), (2, 1, 1));
        assert_eq!(target.notes.notes(), source.notes.notes());
        assert_eq!(target.checkins.records(), source.checkins.records());
        assert_eq!(target.library.books()[0].title, "Cell Biology");

        // Import is undoable
        assert!(target.notes.undo());
        assert_eq!(target.notes.notes()[0].content, "to be replaced");
    }

    fn note_with_id(id: &str, content: &str) -> Note {
        Note {
            id: id.to_string(),
            ..Note::new(content.to_string(), vec![])
        }
    }

    fn checkin(date: &str, notes: &str) -> DailyCheckIn {
        DailyCheckIn {
            date: parse_day(date).unwrap(),
            status: true,
            notes: notes.to_string(),
        }
    }

    #[test]
    fn imported_ids_cannot_escape_the_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("hostile.zip");
        write_archive(
            &archive,
            &[note_with_id("../escaped", "outside"), note_with_id("a/b", "nested")],
            &[],
            &[],
        )
        .unwrap();

        let mirror = NoteMirror::new(dir.path().join("mirror")).unwrap();
        let mut target = DeskState::new(Arc::new(MemoryKvStore::new()), Some(mirror));
        import_desk(&mut target, &archive).unwrap();

        assert!(!dir.path().join("escaped.txt").exists());
        assert!(!dir.path().join("mirror").join("a").exists());
        assert_eq!(target.notes.notes().len(), 2);
        assert!(target.notes.notes().iter().all(|n| is_valid_note_id(&n.id)));
    }

    #[test]
    fn imported_duplicate_ids_stay_distinct_notes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("dupes.zip");
        write_archive(
            &archive,
            &[note_with_id("1", "first"), note_with_id("1", "second")],
            &[],
            &[],
        )
        .unwrap();

        let mut target = desk();
        import_desk(&mut target, &archive).unwrap();
        assert!(target.notes.delete_note("1"));

        let left = target.notes.notes();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "second");
    }

    #[test]
    fn imported_duplicate_dates_collapse_to_one_checkin() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("days.zip");
        write_archive(
            &archive,
            &[],
            &[checkin("2024-01-01", "kept"), checkin("2024-01-01", "dropped")],
            &[],
        )
        .unwrap();

        let mut target = desk();
        import_desk(&mut target, &archive).unwrap();
        assert_eq!(target.checkins.records().len(), 1);
        assert_eq!(target.checkins.records()[0].notes, "kept");

        let day = parse_day("2024-01-01").unwrap();
        target.checkins.toggle(day, "");
        assert!(!target.checkins.is_checked_in(day));
    }

    #[test]
    fn missing_and_malformed_entries_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.zip");
        {
            let mut zip = ZipWriter::new(File::create(&path).unwrap());
            let options = FileOptions::<zip::write::ExtendedFileOptions>::default();
            zip.start_file("notes.json", options).unwrap();
            zip.write_all(b"{not json").unwrap();
            zip.finish().unwrap();
        }

        let contents = read_archive(&path).unwrap();
        assert!(contents.notes.is_empty());
        assert!(contents.checkins.is_empty());
        assert!(contents.books.is_empty());
    }

    #[test]
    fn rejects_non_archives() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        fs::write(&text, "hello").unwrap();
        assert!(read_archive(&text).is_err());
        assert!(read_archive(&dir.path().join("absent.zip")).is_err());
    }
}
