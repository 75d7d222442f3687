//! Study companion library
//!
//! This library provides a history-tracked note store with bounded undo and
//! redo, clipboard capture, daily check-ins, a book library with page
//! annotations, and a client for the hosted AI service used by the study
//! assistant.

mod assistant;
mod checkin;
mod cli;
mod clipboard;
mod config;
mod desk;
mod errors;
mod export;
mod gateway;
mod helper;
mod history;
mod library;
mod mirror;
mod note;
mod persistence;
mod store;
mod types;

// Re-export key components
pub use assistant::*;
pub use checkin::*;
pub use cli::*;
pub use clipboard::*;
pub use config::*;
pub use desk::*;
pub use errors::*;
pub use export::*;
pub use gateway::*;
pub use helper::*;
pub use history::*;
pub use library::*;
pub use mirror::*;
pub use note::*;
pub use persistence::*;
pub use store::*;
pub use types::*;
