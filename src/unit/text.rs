//! Text units.

use serde::{Deserialize, Serialize};

use super::Payload;

/// Payload of a text unit: one stretch of (possibly partial) text.
///
/// `final` marks the terminal unit of a text stream in the host
/// pipeline's own semantics. The envelope converter drops terminal units
/// instead of forwarding them; a terminal marker carries no payload the
/// far side needs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextPayload {
    pub text: Option<String>,
    #[serde(rename = "final")]
    pub final_flag: bool,
}

impl TextPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            final_flag: false,
        }
    }

    /// A terminal marker carrying no text.
    pub fn terminal() -> Self {
        Self {
            text: None,
            final_flag: true,
        }
    }
}

impl Payload for TextPayload {
    const KIND: &'static str = "text";
    const FIELDS: &'static [&'static str] = &["text", "final"];

    fn is_final(&self) -> bool {
        self.final_flag
    }
}
