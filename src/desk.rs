//! Process-wide application state.
use std::sync::Arc;

use log::{info, warn};

use crate::{
    CheckInLog, Config, FileKvStore, KeyValueStore, Library, NoteMirror, NoteStore, Result,
};

/// Owns every persisted collection.
///
/// Components receive the desk by reference (usually behind an
/// `Arc<tokio::sync::Mutex<_>>`); nothing else holds the collections.
pub struct DeskState {
    pub notes: NoteStore,
    pub checkins: CheckInLog,
    pub library: Library,
}

impl DeskState {
    /// Builds empty collections over `kv`; call [`DeskState::load`] next.
    pub fn new(kv: Arc<dyn KeyValueStore>, mirror: Option<NoteMirror>) -> Self {
        Self {
            notes: NoteStore::new(kv.clone(), mirror),
            checkins: CheckInLog::new(kv.clone()),
            library: Library::new(kv),
        }
    }

    /// Opens the file-backed store and mirror described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(FileKvStore::open(&config.data_dir)?);
        let mirror = if config.mirror_notes {
            Some(NoteMirror::new(&config.mirror_dir)?)
        } else {
            None
        };
        Ok(Self::new(kv, mirror))
    }

    /// Hydrates every collection. Never fails; unreadable data loads empty.
    pub fn load(&mut self) {
        let notes = self.notes.load();
        let checkins = self.checkins.load();
        let books = self.library.load();
        info!(
            "Desk loaded: {} notes, {} check-ins, {} books",
            notes, checkins, books
        );
    }

    /// Writes every collection, attempting all of them before reporting the
    /// first failure.
    pub fn save(&self) -> Result<()> {
        let results = [
            ("notes", self.notes.save()),
            ("checkins", self.checkins.save()),
            ("books", self.library.save()),
        ];

        let mut first_error = None;
        for (name, result) in results {
            if let Err(e) = result {
                warn!("Failed to save {}: {}", name, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_load_and_save_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().join("data"),
            mirror_dir: dir.path().join("mirror"),
            mirror_notes: true,
            ..Config::default()
        };

        {
            let mut desk = DeskState::open(&config).unwrap();
            desk.load();
            desk.notes.add_note("kept".into(), vec![]);
            desk.checkins
                .toggle(crate::parse_day("2024-01-01").unwrap(), "");
            desk.save().unwrap();
        }

        let mut desk = DeskState::open(&config).unwrap();
        desk.load();
        assert_eq!(desk.notes.notes().len(), 1);
        assert_eq!(desk.checkins.records().len(), 1);
        assert!(desk.library.books().is_empty());
        assert!(dir.path().join("mirror").read_dir().unwrap().next().is_some());
    }
}
