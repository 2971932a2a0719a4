// crates/core/src/media.rs
//! Size ceilings and text encoding for outgoing attachments.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};

/// Ceiling for files picked from disk.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Ceiling for recorded voice notes.
pub const MAX_AUDIO_BYTES: usize = 5 * 1024 * 1024;

pub const AUDIO_MIME: &str = "audio/webm";

pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];
pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "ogg"];

/// MIME type guessed from a file name's extension.
pub fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" => "video/ogg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// `data:<mime>;base64,<payload>`, the form the server expects in `file`.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// File name for a voice note recorded at `at`.
pub fn audio_file_name(at: DateTime<Utc>) -> String {
    format!("{}_audio.webm", at.to_rfc3339_opts(SecondsFormat::Millis, true))
}
