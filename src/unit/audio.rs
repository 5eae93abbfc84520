//! Audio units.
//!
//! Sample bytes cannot ride a JSON wire directly, so they are carried
//! base64-encoded; the helpers here convert between raw samples and the
//! wire form.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::Payload;

/// Payload of an audio unit: one chunk of samples plus its format.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioPayload {
    /// Base64-encoded sample bytes.
    pub raw_audio: Option<String>,
    /// Number of frames in this chunk.
    pub nframes: Option<u32>,
    /// Sample rate in Hz.
    pub rate: Option<u32>,
    /// Width of a single sample in bytes.
    pub sample_width: Option<u32>,
}

impl AudioPayload {
    /// Encode raw sample bytes into the wire representation.
    pub fn from_samples(samples: &[u8], nframes: u32, rate: u32, sample_width: u32) -> Self {
        Self {
            raw_audio: Some(BASE64.encode(samples)),
            nframes: Some(nframes),
            rate: Some(rate),
            sample_width: Some(sample_width),
        }
    }

    /// Decode the carried samples, if present and valid base64.
    pub fn samples(&self) -> Option<Vec<u8>> {
        self.raw_audio.as_deref().and_then(|raw| BASE64.decode(raw).ok())
    }
}

impl Payload for AudioPayload {
    const KIND: &'static str = "audio";
    const FIELDS: &'static [&'static str] = &["raw_audio", "nframes", "rate", "sample_width"];
}
