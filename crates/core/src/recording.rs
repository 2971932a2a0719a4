// crates/core/src/recording.rs
//! Voice-note capture.
//!
//! The microphone itself lives behind [`Microphone`]; the recorder only
//! buffers chunks and enforces the size ceiling.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::RecordingError;
use crate::media::{self, MAX_AUDIO_BYTES};

/// A capture device that must be released when recording stops.
pub trait Microphone {
    fn acquire(&mut self) -> Result<(), RecordingError>;
    fn release(&mut self);
}

/// A finished recording, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

#[derive(Debug)]
pub struct Recorder<M: Microphone> {
    microphone: M,
    state: RecorderState,
    chunks: Vec<Vec<u8>>,
}

impl<M: Microphone> Recorder<M> {
    pub fn new(microphone: M) -> Self {
        Self {
            microphone,
            state: RecorderState::Idle,
            chunks: Vec::new(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn microphone_mut(&mut self) -> &mut M {
        &mut self.microphone
    }

    /// Bytes buffered so far.
    pub fn buffered(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn start(&mut self) -> Result<(), RecordingError> {
        if self.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        self.microphone.acquire()?;
        self.chunks.clear();
        self.state = RecorderState::Recording;
        info!("recording started");
        Ok(())
    }

    /// Buffer a chunk from the device. Empty chunks are dropped.
    pub fn push_chunk(&mut self, chunk: Vec<u8>) -> Result<(), RecordingError> {
        if !self.is_recording() {
            return Err(RecordingError::NotRecording);
        }
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
        Ok(())
    }

    /// Stop, release the device, and assemble the clip. The device is
    /// released even when the clip is too large to send.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<AudioClip, RecordingError> {
        if !self.is_recording() {
            return Err(RecordingError::NotRecording);
        }
        self.microphone.release();
        self.state = RecorderState::Idle;

        let bytes = std::mem::take(&mut self.chunks).concat();
        debug!(size = bytes.len(), "recording stopped");
        if bytes.len() > MAX_AUDIO_BYTES {
            return Err(RecordingError::TooLarge {
                size: bytes.len(),
                limit: MAX_AUDIO_BYTES,
            });
        }
        Ok(AudioClip {
            file_name: media::audio_file_name(now),
            bytes,
        })
    }

    /// Start when idle, stop when recording. Returns the clip on stop.
    pub fn toggle(&mut self, now: DateTime<Utc>) -> Result<Option<AudioClip>, RecordingError> {
        if self.is_recording() {
            self.stop(now).map(Some)
        } else {
            self.start().map(|()| None)
        }
    }
}

impl<M: Microphone> Drop for Recorder<M> {
    fn drop(&mut self) {
        if self.is_recording() {
            self.microphone.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct FakeMic {
        denied: bool,
        held: Rc<Cell<bool>>,
    }

    impl Microphone for FakeMic {
        fn acquire(&mut self) -> Result<(), RecordingError> {
            if self.denied {
                return Err(RecordingError::MicrophoneUnavailable("permission denied".into()));
            }
            self.held.set(true);
            Ok(())
        }

        fn release(&mut self) {
            self.held.set(false);
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[test]
    fn test_record_and_stop() {
        let mic = FakeMic::default();
        let held = mic.held.clone();
        let mut recorder = Recorder::new(mic);

        recorder.start().unwrap();
        assert!(held.get());
        recorder.push_chunk(b"abc".to_vec()).unwrap();
        recorder.push_chunk(Vec::new()).unwrap();
        recorder.push_chunk(b"def".to_vec()).unwrap();
        assert_eq!(recorder.buffered(), 6);

        let clip = recorder.stop(now()).unwrap();
        assert_eq!(clip.bytes, b"abcdef");
        assert_eq!(clip.file_name, "2024-05-01T09:30:00.000Z_audio.webm");
        assert!(!held.get());
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn test_toggle_alternates() {
        let mut recorder = Recorder::new(FakeMic::default());
        assert_eq!(recorder.toggle(now()).unwrap(), None);
        assert!(recorder.is_recording());
        recorder.push_chunk(vec![1]).unwrap();
        let clip = recorder.toggle(now()).unwrap().unwrap();
        assert_eq!(clip.bytes, vec![1]);
    }

    #[test]
    fn test_denied_microphone_stays_idle() {
        let mut recorder = Recorder::new(FakeMic {
            denied: true,
            ..Default::default()
        });
        let err = recorder.start().unwrap_err();
        assert_eq!(err.to_string(), "Failed to access microphone: permission denied");
        assert!(!recorder.is_recording());
    }

    // ========================================================================
    // Misuse
    // ========================================================================

    #[test]
    fn test_double_start_and_idle_stop() {
        let mut recorder = Recorder::new(FakeMic::default());
        assert!(matches!(recorder.stop(now()), Err(RecordingError::NotRecording)));
        assert!(matches!(recorder.push_chunk(vec![1]), Err(RecordingError::NotRecording)));
        recorder.start().unwrap();
        assert!(matches!(recorder.start(), Err(RecordingError::AlreadyRecording)));
    }

    #[test]
    fn test_oversized_clip_rejected_and_released() {
        let mic = FakeMic::default();
        let held = mic.held.clone();
        let mut recorder = Recorder::new(mic);
        recorder.start().unwrap();
        recorder.push_chunk(vec![0; MAX_AUDIO_BYTES]).unwrap();
        recorder.push_chunk(vec![0; 1]).unwrap();
        let err = recorder.stop(now()).unwrap_err();
        assert_eq!(err.to_string(), "Audio file size exceeds 5MB limit");
        assert!(!held.get());
        assert_eq!(recorder.buffered(), 0);
    }

    #[test]
    fn test_drop_releases_microphone() {
        let mic = FakeMic::default();
        let held = mic.held.clone();
        {
            let mut recorder = Recorder::new(mic);
            recorder.start().unwrap();
        }
        assert!(!held.get());
    }
}
