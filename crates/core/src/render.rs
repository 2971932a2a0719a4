// crates/core/src/render.rs
//! Transcript rendering: date separators, alignment and body kind.
//!
//! Everything here is a pure function of the transcript, the viewer and a
//! fixed `now`, so rendering the same messages twice gives the same output.

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate};
use helpdesk_types::{ChatMessage, Id, MessageType};

use crate::media::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};

pub const IMAGE_DIR: &str = "helpdesk-images/";
pub const AUDIO_DIR: &str = "helpdesk-audio/";
pub const DEFAULT_VIDEO_NAME: &str = "video.mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Image {
        url: String,
    },
    Video {
        url: String,
        download_url: String,
        file_name: String,
    },
    Audio {
        url: String,
    },
    Text {
        lines: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Day label shown above this message, if the day changed.
    pub separator: Option<String>,
    pub alignment: Alignment,
    pub body: Body,
    /// `hh:mm AM/PM`.
    pub time: String,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    viewer: Id,
    media_base_url: String,
    now: DateTime<FixedOffset>,
}

impl Renderer {
    /// `now` fixes both the reference day and the local time zone.
    pub fn new(viewer: Id, media_base_url: impl Into<String>, now: DateTime<FixedOffset>) -> Self {
        let mut media_base_url = media_base_url.into();
        if !media_base_url.ends_with('/') {
            media_base_url.push('/');
        }
        Self {
            viewer,
            media_base_url,
            now,
        }
    }

    pub fn render(&self, messages: &[ChatMessage]) -> Vec<RenderedMessage> {
        messages
            .iter()
            .enumerate()
            .map(|(index, message)| RenderedMessage {
                separator: self.separator(messages, index),
                alignment: self.alignment(message),
                body: self.body(message),
                time: self.local(message).format("%I:%M %p").to_string(),
            })
            .collect()
    }

    /// Day label before `messages[index]`: on the first message and on every
    /// change of local calendar day.
    pub fn separator(&self, messages: &[ChatMessage], index: usize) -> Option<String> {
        let day = self.local(messages.get(index)?).date_naive();
        let changed = match index.checked_sub(1).and_then(|prev| messages.get(prev)) {
            None => true,
            Some(prev) => self.local(prev).date_naive() != day,
        };
        changed.then(|| self.day_label(day))
    }

    pub fn day_label(&self, day: NaiveDate) -> String {
        let today = self.now.date_naive();
        if day == today {
            return "Today".into();
        }
        if today.checked_sub_days(Days::new(1)) == Some(day) {
            return "Yesterday".into();
        }
        if week_start(day) == week_start(today) {
            return day.format("%A").to_string();
        }
        day.format("%d/%m/%Y").to_string()
    }

    /// Sent when the viewer wrote it, or when no sender is recorded (bot).
    pub fn alignment(&self, message: &ChatMessage) -> Alignment {
        match &message.sender_id {
            Some(sender) if *sender != self.viewer => Alignment::Received,
            _ => Alignment::Sent,
        }
    }

    pub fn body(&self, message: &ChatMessage) -> Body {
        let name = &message.message;
        match message.kind {
            MessageType::Audio => Body::Audio {
                url: self.media_url(AUDIO_DIR, name),
            },
            MessageType::Media => match message.extension().as_deref() {
                Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Body::Image {
                    url: self.media_url(IMAGE_DIR, name),
                },
                Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => Body::Video {
                    url: self.media_url(IMAGE_DIR, name),
                    download_url: self.media_url(AUDIO_DIR, name),
                    file_name: message
                        .file_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_VIDEO_NAME.into()),
                },
                _ => text(name),
            },
            MessageType::Text => text(name),
        }
    }

    fn media_url(&self, dir: &str, name: &str) -> String {
        format!("{}{dir}{name}", self.media_base_url)
    }

    fn local(&self, message: &ChatMessage) -> DateTime<FixedOffset> {
        message
            .timestamp
            .map_or(self.now, |t| t.with_timezone(&self.now.timezone()))
    }
}

/// Always at least one line, so a kept message still gets a bubble.
fn text(body: &str) -> Body {
    let mut lines: Vec<String> = body.lines().map(str::to_string).collect();
    if lines.is_empty() {
        lines.push(String::new());
    }
    Body::Text { lines }
}

/// The Sunday that starts `day`'s week.
fn week_start(day: NaiveDate) -> NaiveDate {
    let back = u64::from(day.weekday().num_days_from_sunday());
    day.checked_sub_days(Days::new(back)).unwrap_or(day)
}
