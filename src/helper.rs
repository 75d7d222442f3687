use std::path::Path;

use chrono::NaiveDate;

use crate::{DeskError, Result};

// Helper method for parsing tags
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// First non-empty line of `content`, cut to at most `max_chars` characters.
pub fn content_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim();

    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Parses a `YYYY-MM-DD` day key.
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| DeskError::InvalidFormat {
        message: format!("invalid date '{}', expected YYYY-MM-DD: {}", value, e),
    })
}

/// Parses stroke points written as `"x,y x,y ..."`.
pub fn parse_points(value: &str) -> Result<Vec<(f32, f32)>> {
    value
        .split_whitespace()
        .map(|pair| {
            let parsed = pair.split_once(',').and_then(|(x, y)| {
                Some((x.trim().parse::<f32>().ok()?, y.trim().parse::<f32>().ok()?))
            });
            parsed.ok_or_else(|| DeskError::InvalidFormat {
                message: format!("invalid point '{}', expected x,y", pair),
            })
        })
        .collect()
}

/// Guesses a MIME type from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        _ => "application/octet-stream",
    }
}
