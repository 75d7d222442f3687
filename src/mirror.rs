//! Flat-file mirror of the note list.
//!
//! Every note is written as `<id>.txt` with a small header followed by the
//! raw content:
//!
//! ```text
//! ID: 1718000000000
//! Tags: clipboard, reading
//! Created: 2024-06-10T06:13:20+00:00
//! ---
//! raw content...
//! ```
use std::{
    collections::{HashMap, HashSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{is_valid_note_id, parse_tags, DeskError, Note, Result};

const ID_PREFIX: &str = "ID: ";
const TAGS_PREFIX: &str = "Tags: ";
const CREATED_PREFIX: &str = "Created: ";
const SEPARATOR: &str = "---";

/// Renders a note in the mirror record layout.
pub fn format_record(note: &Note) -> String {
    format!(
        "{}{}\n{}{}\n{}{}\n{}\n{}",
        ID_PREFIX,
        note.id,
        TAGS_PREFIX,
        note.tags.join(", "),
        CREATED_PREFIX,
        note.created_at.to_rfc3339(),
        SEPARATOR,
        note.content
    )
}

/// Parses a mirror record back into a note.
pub fn parse_record(record: &str) -> Result<Note> {
    let mut parts = record.splitn(5, '\n');
    let mut header = |prefix: &str| -> Result<String> {
        let line = parts.next().ok_or_else(|| DeskError::InvalidFormat {
            message: format!("record truncated before '{}'", prefix.trim()),
        })?;
        let line = line.strip_suffix('\r').unwrap_or(line);
        line.strip_prefix(prefix)
            .map(str::to_string)
            .ok_or_else(|| DeskError::InvalidFormat {
                message: format!("expected '{}' line, found '{}'", prefix.trim(), line),
            })
    };

    let id = header(ID_PREFIX)?;
    let tags = header(TAGS_PREFIX)?;
    let created = header(CREATED_PREFIX)?;

    let separator = parts.next().map(|l| l.trim_end_matches('\r'));
    if separator != Some(SEPARATOR) {
        return Err(DeskError::InvalidFormat {
            message: "missing content separator".to_string(),
        });
    }
    let content = parts.next().unwrap_or_default().to_string();

    if id.trim().is_empty() {
        return Err(DeskError::InvalidFormat {
            message: "record has an empty ID".to_string(),
        });
    }

    let created_at = DateTime::parse_from_rfc3339(created.trim())
        .map_err(|e| DeskError::InvalidFormat {
            message: format!("bad creation timestamp '{}': {}", created, e),
        })?
        .with_timezone(&Utc);

    Ok(Note {
        id: id.trim().to_string(),
        content,
        tags: parse_tags(Some(tags)),
        created_at,
    })
}

/// Writes and removes per-note files in a mirror directory.
#[derive(Debug, Clone)]
pub struct NoteMirror {
    dir: PathBuf,
}

impl NoteMirror {
    /// Creates a mirror rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            debug!("Mirror directory does not exist, creating: {}", dir.display());
            fs::create_dir_all(&dir).map_err(|e| {
                error!("Failed to create mirror directory: {}", e);
                DeskError::DirectoryError { path: dir.clone() }
            })?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, note_id: &str) -> Result<PathBuf> {
        if !is_valid_note_id(note_id) {
            return Err(DeskError::InvalidFormat {
                message: format!("refusing to mirror note with id '{}'", note_id),
            });
        }
        Ok(self.dir.join(format!("{}.txt", note_id)))
    }

    /// Writes one note record atomically.
    pub fn write_note(&self, note: &Note) -> Result<()> {
        let path = self.record_path(&note.id)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(format_record(note).as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(&path).map_err(|e| {
            error!("Failed to persist mirror record {}: {}", path.display(), e.error);
            DeskError::Io(e.error)
        })?;
        trace!("Mirrored note {} to {}", note.id, path.display());
        Ok(())
    }

    /// Removes a note record if present.
    pub fn remove_note(&self, note_id: &str) -> Result<()> {
        let path = self.record_path(note_id)?;
        if path.exists() {
            fs::remove_file(&path)?;
            trace!("Removed mirror record {}", path.display());
        }
        Ok(())
    }

    /// Brings the directory from `before` to `after`: writes notes that
    /// appeared or changed and removes notes that disappeared.
    ///
    /// Failures are logged per record and never abort the pass.
    pub fn reconcile(&self, before: &[Note], after: &[Note]) {
        let before_by_id: HashMap<&str, &Note> =
            before.iter().map(|n| (n.id.as_str(), n)).collect();
        let after_ids: HashSet<&str> = after.iter().map(|n| n.id.as_str()).collect();

        for note in after
            .iter()
            .filter(|n| before_by_id.get(n.id.as_str()).copied() != Some(*n))
        {
            if let Err(e) = self.write_note(note) {
                warn!("Failed to mirror note {}: {}", note.id, e);
            }
        }
        for note in before.iter().filter(|n| !after_ids.contains(n.id.as_str())) {
            if let Err(e) = self.remove_note(&note.id) {
                warn!("Failed to remove mirrored note {}: {}", note.id, e);
            }
        }
    }

    /// Reads every record in the directory, newest first.
    ///
    /// Records that fail to parse are logged and skipped.
    pub fn load_all(&self) -> Vec<Note> {
        let mut notes = Vec::new();
        let mut skipped = 0;

        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "txt") {
                continue;
            }

            match fs::read_to_string(path)
                .map_err(DeskError::Io)
                .and_then(|raw| parse_record(&raw))
            {
                Ok(note) => notes.push(note),
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping mirror record {}: {}", path.display(), e);
                }
            }
        }

        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        info!(
            "Loaded {} mirrored notes from {} ({} skipped)",
            notes.len(),
            self.dir.display(),
            skipped
        );
        notes
    }
}
