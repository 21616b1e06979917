//! Audio gate
//!
//! Voice messages arrive as audio URLs in place of text. The gate detects
//! them, obtains a transcript, and — crucially — never fails: every
//! degraded path (no transcriber configured, transcription error, unusable
//! transcript) resolves to a fixed fallback text that routes the engine to
//! its help flow. Transcription problems must never block message
//! delivery.

use std::sync::Arc;
use tracing::{info, warn};

use crate::services::transcribe::{TranscribeService, AUDIO_EXTENSIONS};

/// Transcript the backend returns when it found nothing recognizable;
/// treated the same as an empty transcript.
pub const NO_CONTENT_SENTINEL: &str = "Áudio sem conteúdo reconhecível";

/// Whether the text looks like a reference to an audio file.
///
/// Detection is independent of transcriber availability so the fallback
/// applies even when the capability is absent.
pub fn is_audio_reference(text: &str) -> bool {
    let lower = text.to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Result of resolving a message through the gate
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedText {
    /// The effective text fed to the engine
    pub text: String,
    /// Whether a usable transcript was produced
    pub transcribed: bool,
}

/// The audio gate itself: optional transcriber plus the fallback literal
pub struct AudioGate {
    transcriber: Option<Arc<dyn TranscribeService>>,
    fallback_text: String,
}

impl AudioGate {
    pub fn new(transcriber: Option<Arc<dyn TranscribeService>>, fallback_text: String) -> Self {
        Self {
            transcriber,
            fallback_text,
        }
    }

    pub fn fallback_text(&self) -> &str {
        &self.fallback_text
    }

    /// Resolve the effective message text
    pub async fn resolve(&self, text: &str) -> ResolvedText {
        if !is_audio_reference(text) {
            return ResolvedText {
                text: text.to_string(),
                transcribed: false,
            };
        }

        info!(audio_url = text, "detected audio reference, attempting transcription");

        let Some(transcriber) = &self.transcriber else {
            warn!("transcriber not available, using fallback text");
            return self.fallback();
        };

        match transcriber.transcribe_audio(text).await {
            Err(e) => {
                warn!(error = %e, "transcription failed, using fallback text");
                self.fallback()
            }
            Ok(transcript) => {
                if transcript.trim().is_empty() || transcript == NO_CONTENT_SENTINEL {
                    warn!("transcription returned no usable content, using fallback text");
                    self.fallback()
                } else {
                    info!(
                        transcript_length = transcript.len(),
                        "audio transcribed successfully"
                    );
                    ResolvedText {
                        text: transcript,
                        transcribed: true,
                    }
                }
            }
        }
    }

    fn fallback(&self) -> ResolvedText {
        ResolvedText {
            text: self.fallback_text.clone(),
            transcribed: false,
        }
    }
}
