//! CLI module for the studydesk application
//!
//! This module turns parsed commands into operations on the shared desk
//! state and renders the results to the terminal.
use std::{
    fs::{self, read_to_string},
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Local;
use log::{info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::{mpsc, Mutex},
    time::{self, Duration},
};

use crate::{
    content_preview, export_desk, forward_to_store, import_desk, mime_for_path, parse_day,
    parse_points, parse_tags, play_into, stream_pcm, AskCommand, Book, BookCommand, BookKind,
    CheckInToggle, ClipboardBridge, Commands, CommandClipboard, Config, DeskError, DeskState,
    GeminiGateway, GeminiLiveTransport, LiveSession, Note, Result, SessionState, Stroke,
    StudyAssistant, TextMemo, DEFAULT_VOICE, OUTPUT_SAMPLE_RATE,
};

/// 100 ms of 16 kHz mono microphone audio
const LIVE_CHUNK_BYTES: usize = 3200;

/// CLI Application handler - processes CLI commands against the desk state
pub struct App {
    /// Notes, check-ins and books
    desk: Arc<Mutex<DeskState>>,

    /// Application configuration
    config: Config,

    /// Where the configuration was loaded from
    config_path: PathBuf,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    pub fn new(
        desk: Arc<Mutex<DeskState>>,
        config: Config,
        config_path: PathBuf,
        verbose: bool,
    ) -> Self {
        Self {
            desk,
            config,
            config_path,
            verbose,
        }
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Add {
                content,
                tags,
                file,
            } => self.add_note(content, tags, file).await?,

            Commands::List {
                tag,
                limit,
                json,
                detailed,
            } => self.list_notes(tag, limit, json, detailed).await?,

            Commands::Search { query, limit, json } => {
                self.handle_search(query, limit, json).await?
            }

            Commands::Delete { id, force } => self.handle_delete(id, force).await?,

            Commands::Clear { force } => self.handle_clear(force).await?,

            Commands::Watch { no_clipboard } => self.watch(!no_clipboard).await?,

            Commands::Checkin { date, notes } => self.handle_checkin(date, notes).await?,

            Commands::Checkins { json } => self.show_checkins(json).await?,

            Commands::Book(command) => self.handle_book(command).await?,

            Commands::Ask(command) => self.handle_ask(command).await?,

            Commands::Export { output } => {
                let dir = output.unwrap_or_else(|| self.config.export_dir.clone());
                let path = export_desk(&*self.desk.lock().await, &dir)?;
                println!("Exported to {}", path.display());
            }

            Commands::Import { archive, force } => {
                if !force
                    && !confirm("Importing replaces all notes, check-ins and books. Continue?")?
                {
                    println!("Import cancelled.");
                    return Ok(());
                }
                let summary = import_desk(&mut *self.desk.lock().await, &archive)?;
                println!(
                    "Imported {} notes, {} check-ins and {} books",
                    summary.notes, summary.checkins, summary.books
                );
            }

            Commands::Config { show, set, reset } => self.handle_config(show, set, reset)?,
        }

        Ok(())
    }

    async fn add_note(
        &self,
        content: Option<String>,
        tags: Option<String>,
        file: Option<PathBuf>,
    ) -> Result<()> {
        let note_content = match (content, file) {
            (Some(c), _) => c,
            (None, Some(file_path)) => read_to_string(file_path)?,
            (None, None) => {
                return Err(DeskError::ApplicationError {
                    message: "Provide the note text or --file".to_string(),
                })
            }
        };
        if note_content.trim().is_empty() {
            return Err(DeskError::ApplicationError {
                message: "Refusing to add an empty note".to_string(),
            });
        }

        let note = self
            .desk
            .lock()
            .await
            .notes
            .add_note(note_content, parse_tags(tags));
        println!("Note created with ID: {}", note.id);
        Ok(())
    }

    async fn list_notes(
        &self,
        tag: Option<String>,
        limit: usize,
        json: bool,
        detailed: bool,
    ) -> Result<()> {
        let mut notes = {
            let desk = self.desk.lock().await;
            match tag {
                Some(tag) => desk.notes.notes_by_tag(&tag),
                None => desk.notes.notes().to_vec(),
            }
        };
        if limit > 0 {
            notes.truncate(limit);
        }
        self.display_notes(&notes, json, detailed)
    }

    async fn handle_search(&self, query: String, limit: usize, json: bool) -> Result<()> {
        let mut results = self.desk.lock().await.notes.search(&query);
        if limit > 0 {
            results.truncate(limit);
        }
        self.display_notes(&results, json, false)
    }

    async fn handle_delete(&self, id: String, force: bool) -> Result<()> {
        let note = self
            .desk
            .lock()
            .await
            .notes
            .get_note(&id)
            .cloned()
            .ok_or_else(|| DeskError::NoteNotFound { id: id.clone() })?;

        if !force {
            println!("You are about to delete the following note:");
            println!("ID:      {}", note.id);
            println!("Tags:    {}", note.tags.join(", "));
            println!("Created: {}", note.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!("\n{}", content_preview(&note.content, 100));
            if !confirm("\nAre you sure you want to delete this note?")? {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        self.desk.lock().await.notes.delete_note(&id);
        println!("Note {} has been deleted.", note.id);
        Ok(())
    }

    async fn handle_clear(&self, force: bool) -> Result<()> {
        let count = self.desk.lock().await.notes.notes().len();
        if count == 0 {
            println!("There are no notes to clear.");
            return Ok(());
        }
        if !force && !confirm(&format!("Delete all {} notes?", count))? {
            println!("Clear cancelled.");
            return Ok(());
        }
        self.desk.lock().await.notes.clear();
        println!("Cleared {} notes.", count);
        Ok(())
    }

    /// Interactive companion session.
    ///
    /// Undo and redo only reach back to the start of the session; history
    /// is not persisted.
    async fn watch(&self, with_clipboard: bool) -> Result<()> {
        let mut bridge = ClipboardBridge::from_config(&self.config);
        let mut forwarder = None;

        if with_clipboard {
            match CommandClipboard::from_config(&self.config) {
                Ok(source) => {
                    let events = bridge.start(source)?;
                    forwarder = Some(forward_to_store(events, self.desk.clone()));
                    println!("{}", console::style("Watching the clipboard.").green());
                }
                Err(e) => {
                    warn!("Clipboard capture disabled: {}", e);
                    println!("{}", console::style(e.user_message()).yellow());
                }
            }
        }
        println!("Commands: add <text>, undo, redo, list, delete <id>, search <query>, quit");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };

            if !self.handle_watch_line(line.trim()).await? {
                break;
            }
        }

        bridge.dispose().await?;
        if let Some(forwarder) = forwarder {
            match forwarder.await {
                Ok(captured) => info!("Captured {} notes from the clipboard", captured),
                Err(e) => warn!("Clipboard forwarder failed: {}", e),
            }
        }
        Ok(())
    }

    /// Returns `false` when the session should end.
    async fn handle_watch_line(&self, line: &str) -> Result<bool> {
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let mut desk = self.desk.lock().await;

        match verb {
            "" => {}
            "quit" | "exit" | "q" => return Ok(false),
            "add" if !rest.is_empty() => {
                let note = desk.notes.add_note(rest.to_string(), Vec::new());
                println!("Added {}", note.id);
            }
            "undo" => {
                if desk.notes.undo() {
                    println!("Undone ({} notes)", desk.notes.notes().len());
                } else {
                    println!("Nothing to undo");
                }
            }
            "redo" => {
                if desk.notes.redo() {
                    println!("Redone ({} notes)", desk.notes.notes().len());
                } else {
                    println!("Nothing to redo");
                }
            }
            "list" => {
                let notes = desk.notes.notes().to_vec();
                drop(desk);
                self.display_notes(&notes, false, false)?;
            }
            "search" if !rest.is_empty() => {
                let notes = desk.notes.search(rest);
                drop(desk);
                self.display_notes(&notes, false, false)?;
            }
            "delete" if !rest.is_empty() => {
                if desk.notes.delete_note(rest) {
                    println!("Deleted {}", rest);
                } else {
                    println!("No note with ID {}", rest);
                }
            }
            _ => println!("Unknown command: {}", line),
        }
        Ok(true)
    }

    async fn handle_checkin(&self, date: Option<String>, notes: String) -> Result<()> {
        let today = Local::now().date_naive();
        let date = match date {
            Some(value) => parse_day(&value)?,
            None => today,
        };

        let mut desk = self.desk.lock().await;
        match desk.checkins.toggle(date, notes) {
            CheckInToggle::Added(record) => {
                println!("{} {}", console::style("Checked in for").green(), record.date)
            }
            CheckInToggle::Removed(record) => {
                println!("{} {}", console::style("Removed check-in for").yellow(), record.date)
            }
        }
        println!("Current streak: {} days", desk.checkins.current_streak(today));
        Ok(())
    }

    async fn show_checkins(&self, json: bool) -> Result<()> {
        let desk = self.desk.lock().await;
        let records = desk.checkins.sorted();

        if json {
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }
        if records.is_empty() {
            println!("No check-ins yet.");
            return Ok(());
        }
        for record in &records {
            if record.notes.is_empty() {
                println!("{}", record.date);
            } else {
                println!("{}  {}", record.date, console::style(&record.notes).dim());
            }
        }
        println!(
            "\n{} check-ins, current streak {} days",
            records.len(),
            desk.checkins.current_streak(Local::now().date_naive())
        );
        Ok(())
    }

    async fn handle_book(&self, command: BookCommand) -> Result<()> {
        let mut desk = self.desk.lock().await;
        match command {
            BookCommand::Add {
                title,
                kind,
                content,
                media,
            } => {
                let kind: BookKind = kind.parse()?;
                let book = desk.library.add_book(title, content, kind, media);
                println!("Added {} with ID: {}", book.kind, book.id);
            }
            BookCommand::List { json } => {
                let books = desk.library.books();
                if json {
                    println!("{}", serde_json::to_string_pretty(books)?);
                } else if books.is_empty() {
                    println!("The library is empty.");
                } else {
                    for book in books {
                        self.print_book_line(book);
                    }
                }
            }
            BookCommand::Show { id } => {
                let book = desk
                    .library
                    .get(&id)
                    .ok_or_else(|| DeskError::BookNotFound { id: id.clone() })?;
                self.print_book_details(book);
            }
            BookCommand::Progress { id, percent } => {
                let book = desk.library.set_progress(&id, percent)?;
                println!("{} is {}% complete", book.title, book.progress);
            }
            BookCommand::Memo {
                id,
                page,
                text,
                x,
                y,
            } => {
                desk.library.add_memo(&id, page, TextMemo { x, y, text })?;
                println!("Memo added to page {}", page);
            }
            BookCommand::Stroke {
                id,
                page,
                points,
                color,
                width,
            } => {
                let points = parse_points(&points)?;
                desk.library.add_stroke(
                    &id,
                    page,
                    Stroke {
                        points,
                        color,
                        width,
                    },
                )?;
                println!("Stroke added to page {}", page);
            }
        }
        Ok(())
    }

    fn print_book_line(&self, book: &Book) {
        println!(
            "{}  {}  [{}] {}%",
            book.id,
            console::style(&book.title).bold(),
            book.kind,
            book.progress
        );
    }

    fn print_book_details(&self, book: &Book) {
        self.print_book_line(book);
        println!("Added: {}", book.added_at.format("%Y-%m-%d %H:%M"));
        if let Some(media) = &book.media_ref {
            println!("Media: {}", media);
        }
        if !book.content.is_empty() {
            println!("\n{}", book.content);
        }
        for (page, annotations) in &book.annotations {
            println!(
                "\nPage {}: {} strokes",
                page,
                annotations.strokes.len()
            );
            for memo in &annotations.memos {
                println!("  ({:.0}, {:.0}) {}", memo.x, memo.y, memo.text);
            }
        }
    }

    fn assistant(&self) -> Result<StudyAssistant<GeminiGateway>> {
        Ok(StudyAssistant::new(
            GeminiGateway::new(&self.config.gateway)?,
            self.config.gateway.clone(),
        ))
    }

    async fn handle_ask(&self, command: AskCommand) -> Result<()> {
        match command {
            AskCommand::Summarize { id } => {
                let note = self.note_or_latest(id).await?;
                println!("{}", self.assistant()?.summarize(&note.content).await?);
            }
            AskCommand::Translate { to, id } => {
                let note = self.note_or_latest(id).await?;
                println!("{}", self.assistant()?.translate(&note.content, &to).await?);
            }
            AskCommand::Mindmap { id } => {
                let note = self.note_or_latest(id).await?;
                print!("{}", self.assistant()?.mind_map(&note.content).await?.outline());
            }
            AskCommand::Analyze { file, question } => {
                let data = fs::read(&file)?;
                let mime = mime_for_path(&file);
                let answer = self.assistant()?.analyze_media(data, mime, &question).await?;
                println!("{}", answer);
            }
            AskCommand::Speak { text, output } => {
                let audio = self.assistant()?.speak(&text).await?;
                write_media(&output, &audio.data)?;
                println!("Wrote {} audio to {}", audio.mime_type, output.display());
            }
            AskCommand::Image { prompt, output } => {
                let image = self.assistant()?.generate_image(&prompt).await?;
                write_media(&output, &image.data)?;
                println!("Wrote {} to {}", image.mime_type, output.display());
            }
            AskCommand::Video { prompt } => {
                let assistant = self.assistant()?;
                println!("Generating video, this can take a few minutes...");
                println!("{}", assistant.generate_video(&prompt).await?);
            }
            AskCommand::Live {
                input,
                output,
                listen,
            } => self.live_chat(&input, &output, listen).await?,
        }
        Ok(())
    }

    /// Voice chat over a live session.
    ///
    /// Input PCM is sent at microphone pace and the reply is written to
    /// `output` as it plays. Ctrl-C ends the session at any point; the
    /// connection is closed on every exit path.
    async fn live_chat(&self, input: &Path, output: &Path, listen: u64) -> Result<()> {
        let source: Box<dyn AsyncRead + Unpin + Send> = if input == Path::new("-") {
            Box::new(tokio::io::stdin())
        } else {
            Box::new(tokio::fs::File::open(input).await?)
        };
        let reply = tokio::fs::File::create(output).await?;

        let transport = GeminiLiveTransport::new(&self.config.gateway, DEFAULT_VOICE)?;
        let (playback_tx, playback_rx) = mpsc::channel(64);
        let mut session = LiveSession::spawn(transport, playback_tx);
        let player = tokio::spawn(play_into(playback_rx, reply, OUTPUT_SAMPLE_RATE));

        if session.wait_until_ready().await != SessionState::Open {
            session.dispose().await?;
            return Err(DeskError::SessionError {
                message: "session closed before it opened".to_string(),
            });
        }
        println!("{}", console::style("Live session open. Ctrl-C ends it.").green());

        let streamed = tokio::select! {
            sent = stream_pcm(&session, source, LIVE_CHUNK_BYTES, true) => Some(sent),
            _ = tokio::signal::ctrl_c() => None,
        };
        if matches!(streamed, Some(Ok(_))) {
            tokio::select! {
                _ = time::sleep(Duration::from_secs(listen)) => {}
                _ = session.closed() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }

        let summary = session.dispose().await;
        let playback = player.await.map_err(|e| DeskError::ApplicationError {
            message: format!("Playback task failed: {}", e),
        })?;
        streamed.transpose()?;
        let summary = summary?;
        let playback = playback?;

        println!(
            "Sent {} chunks, received {} ({} interrupted replies). Wrote {} bytes to {}",
            summary.chunks_sent,
            summary.chunks_received,
            summary.interruptions,
            playback.bytes_played,
            output.display()
        );
        Ok(())
    }

    async fn note_or_latest(&self, id: Option<String>) -> Result<Note> {
        let desk = self.desk.lock().await;
        match id {
            Some(id) => desk
                .notes
                .get_note(&id)
                .cloned()
                .ok_or(DeskError::NoteNotFound { id }),
            None => desk
                .notes
                .latest()
                .cloned()
                .ok_or_else(|| DeskError::ApplicationError {
                    message: "There are no notes yet".to_string(),
                }),
        }
    }

    fn handle_config(&self, show: bool, set: Option<String>, reset: bool) -> Result<()> {
        if reset {
            Config::default().save(&self.config_path)?;
            println!("Configuration reset to defaults.");
            return Ok(());
        }

        if let Some(assignment) = set {
            let mut config = self.config.clone();
            config.set(&assignment)?;
            config.save(&self.config_path)?;
            println!("Updated {}", assignment);
        }

        if show || self.verbose {
            println!("# {}", self.config_path.display());
            println!("{}", serde_json::to_string_pretty(&self.config)?);
        }
        Ok(())
    }

    /// Display notes as JSON or text
    fn display_notes(&self, notes: &[Note], json: bool, detailed: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(notes)?);
            return Ok(());
        }
        if notes.is_empty() {
            println!("No notes found matching the criteria.");
            return Ok(());
        }

        // Use terminal width for formatting if available
        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (i, note) in notes.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }

            let created_at = note.created_at.format("%Y-%m-%d %H:%M");
            println!("ID: {} | Created: {}", note.id, created_at);

            if !note.tags.is_empty() {
                let tags = note
                    .tags
                    .iter()
                    .map(|tag| format!("#{}", tag))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("Tags: {}", console::style(tags).cyan());
            }

            if detailed {
                println!("\n{}", note.content);
            } else {
                let width = term_width.saturating_sub(4).max(20);
                println!("{}", content_preview(&note.content, width));
            }
        }

        println!(
            "\nFound {} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    stdout().flush().map_err(DeskError::Io)?;

    let mut input = String::new();
    stdin().read_line(&mut input).map_err(DeskError::Io)?;
    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

fn write_media(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, data)?;
    Ok(())
}
