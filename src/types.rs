//! Shared types for the studydesk application.
//!
//! This module holds the crate-wide `Result` alias and the command-line
//! subcommand definitions.
use std::path::PathBuf;

use clap::Subcommand;

use crate::DeskError;

/// A specialized Result type for studydesk operations.
pub type Result<T> = std::result::Result<T, DeskError>;

/// Available subcommands for the studydesk application
#[derive(Subcommand)]
pub enum Commands {
    /// Add a note
    Add {
        /// Text of the note
        content: Option<String>,

        /// Tags to associate with the note (comma-separated)
        #[clap(short = 't', long)]
        tags: Option<String>,

        /// Path to a file containing the note's content
        #[clap(short, long)]
        file: Option<PathBuf>,
    },

    /// List notes, newest first
    List {
        /// Filter notes by tag
        #[clap(short, long)]
        tag: Option<String>,

        /// Limit the number of notes returned (0 for all)
        #[clap(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,

        /// Print full note content
        #[clap(short, long)]
        detailed: bool,
    },

    /// Fuzzy search over note content and tags
    Search {
        /// Search query text
        query: String,

        /// Limit the number of search results
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Delete a note by ID
    Delete {
        /// ID of the note to delete
        id: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Remove every note
    Clear {
        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Interactive session with clipboard capture and undo/redo
    Watch {
        /// Run without the clipboard bridge
        #[clap(long)]
        no_clipboard: bool,
    },

    /// Toggle the check-in for a day
    Checkin {
        /// Day as YYYY-MM-DD (defaults to today)
        #[clap(short, long)]
        date: Option<String>,

        /// Remarks stored with a new check-in
        #[clap(short, long, default_value = "")]
        notes: String,
    },

    /// Show check-in history and the current streak
    Checkins {
        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Book library operations
    #[clap(subcommand)]
    Book(BookCommand),

    /// AI study assistant
    #[clap(subcommand)]
    Ask(AskCommand),

    /// Export notes, check-ins and books to a ZIP archive
    Export {
        /// Directory for the archive (default uses config setting)
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace all data with the contents of an archive
    Import {
        /// Path to the archive
        archive: PathBuf,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Update a configuration setting (key=value)
        #[clap(short, long)]
        set: Option<String>,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,
    },
}

#[derive(Subcommand)]
pub enum BookCommand {
    /// Register a document, video or image
    Add {
        /// Title shown in the library
        title: String,

        /// Item type: document, video or image
        #[clap(short = 'k', long, default_value = "document")]
        kind: String,

        /// Short description or excerpt
        #[clap(short, long, default_value = "")]
        content: String,

        /// Path or URL of the media
        #[clap(short, long)]
        media: Option<String>,
    },

    /// List the library
    List {
        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Show one book with its annotations
    Show {
        id: String,
    },

    /// Set reading progress (0-100)
    Progress {
        id: String,
        percent: u8,
    },

    /// Pin a text memo on a page
    Memo {
        id: String,

        #[clap(short, long, default_value_t = 1)]
        page: u32,

        text: String,

        #[clap(short, long, default_value_t = 0.0)]
        x: f32,

        #[clap(short, long, default_value_t = 0.0)]
        y: f32,
    },

    /// Record a pen stroke on a page
    Stroke {
        id: String,

        #[clap(short, long, default_value_t = 1)]
        page: u32,

        /// Points as "x,y x,y ..."
        points: String,

        #[clap(short, long, default_value = "#000000")]
        color: String,

        #[clap(short, long, default_value_t = 2.0)]
        width: f32,
    },
}

#[derive(Subcommand)]
pub enum AskCommand {
    /// Summarize a note (or the latest note)
    Summarize {
        /// Note ID, defaults to the most recent note
        id: Option<String>,
    },

    /// Translate a note
    Translate {
        /// Target language
        #[clap(short, long, default_value = "English")]
        to: String,

        /// Note ID, defaults to the most recent note
        id: Option<String>,
    },

    /// Build a mind map from a note
    Mindmap {
        /// Note ID, defaults to the most recent note
        id: Option<String>,
    },

    /// Ask a question about an image, video or document file
    Analyze {
        file: PathBuf,

        #[clap(short, long, default_value = "Explain this for a student.")]
        question: String,
    },

    /// Read text aloud, writing the audio to a file
    Speak {
        text: String,

        #[clap(short, long, default_value = "speech.pcm")]
        output: PathBuf,
    },

    /// Generate an illustration
    Image {
        prompt: String,

        #[clap(short, long, default_value = "image.png")]
        output: PathBuf,
    },

    /// Generate a short video and print its URI
    Video {
        prompt: String,
    },

    /// Voice chat: stream 16 kHz mono PCM and record the spoken reply
    Live {
        /// Raw PCM file to send, or "-" for stdin
        input: PathBuf,

        /// File receiving 24 kHz mono PCM of the reply
        #[clap(short, long, default_value = "reply.pcm")]
        output: PathBuf,

        /// Seconds to keep listening after the input ends
        #[clap(short, long, default_value_t = 15)]
        listen: u64,
    },
}
