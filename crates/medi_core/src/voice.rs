//! Voice capture: platform speech recognition → draft input text.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capability::{Capability, RecognitionOptions, SpeechEvent, SpeechPlatform, SpeechRecognizer};

/// Text being composed in the chat input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftInput {
    text: String,
}

impl DraftInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Replace the draft with typed text.
    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Append a recognized utterance, space-separated from existing text.
    pub fn append_utterance(&mut self, utterance: &str) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(utterance);
    }

    /// Take the draft, leaving it empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

impl From<&str> for DraftInput {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
}

/// What a start/toggle request resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceOutcome {
    Listening,
    Stopped,
    Unsupported { notice: String },
    Failed { notice: String },
}

/// Bridges a platform recognizer into a `DraftInput`.
pub struct VoiceCapture {
    platform: Arc<dyn SpeechPlatform>,
    options: RecognitionOptions,
    unsupported_notice: String,
    failed_notice: String,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
}

impl VoiceCapture {
    pub fn new(
        platform: Arc<dyn SpeechPlatform>,
        options: RecognitionOptions,
        unsupported_notice: impl Into<String>,
        failed_notice: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            options,
            unsupported_notice: unsupported_notice.into(),
            failed_notice: failed_notice.into(),
            recognizer: None,
        }
    }

    /// Build from application configuration.
    pub fn from_config(platform: Arc<dyn SpeechPlatform>, config: &crate::config::AppConfig) -> Self {
        Self::new(
            platform,
            config.voice.clone(),
            config.notices.speech_unsupported.clone(),
            config.notices.speech_failed.clone(),
        )
    }

    pub fn state(&self) -> VoiceState {
        if self.recognizer.is_some() {
            VoiceState::Listening
        } else {
            VoiceState::Idle
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state() == VoiceState::Listening
    }

    /// Start listening if idle, stop if listening.
    pub fn toggle(&mut self) -> VoiceOutcome {
        if self.is_listening() {
            self.stop();
            VoiceOutcome::Stopped
        } else {
            self.start()
        }
    }

    /// Start listening. Idempotent while already listening.
    pub fn start(&mut self) -> VoiceOutcome {
        if self.is_listening() {
            return VoiceOutcome::Listening;
        }

        let mut recognizer = match self.platform.resolve() {
            Capability::Available(recognizer) => recognizer,
            Capability::Unavailable => {
                info!("Speech recognition unavailable on this platform");
                return VoiceOutcome::Unsupported {
                    notice: self.unsupported_notice.clone(),
                };
            }
        };

        if let Err(e) = recognizer.start(&self.options) {
            warn!("Speech recognizer failed to start: {}", e);
            return VoiceOutcome::Failed {
                notice: self.failed_notice.clone(),
            };
        }

        info!("Listening ({})", self.options.language);
        self.recognizer = Some(recognizer);
        VoiceOutcome::Listening
    }

    /// Stop listening and release the recognizer.
    pub fn stop(&mut self) {
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.stop();
            debug!("Speech recognizer stopped");
        }
    }

    /// Apply a recognizer event to the draft.
    ///
    /// Only final results are applied; any error or end of input returns to
    /// idle without touching the draft.
    pub fn handle_event(&mut self, event: SpeechEvent, draft: &mut DraftInput) {
        if !self.is_listening() {
            debug!("Ignoring speech event while idle: {:?}", event);
            return;
        }

        match event {
            SpeechEvent::Start => debug!("Recognizer reported start"),
            SpeechEvent::Result {
                is_final: false, ..
            } => {}
            SpeechEvent::Result {
                transcript,
                is_final: true,
            } => {
                let transcript = transcript.trim();
                if !transcript.is_empty() {
                    draft.append_utterance(transcript);
                }
                self.stop();
            }
            SpeechEvent::Error(reason) => {
                warn!("Speech recognition error: {}", reason);
                self.stop();
            }
            SpeechEvent::End => {
                self.recognizer = None;
            }
        }
    }
}

impl Drop for VoiceCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
