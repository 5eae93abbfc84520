//! Updates: the pipeline's communication granule.
//!
//! A unit never travels alone; it is paired with an [`UpdateKind`] saying
//! whether it is newly added, retracted, or finalized, and batched into an
//! ordered [`UpdateBatch`].

use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use tracing::warn;

use crate::unit::Unit;

/// Whether a unit is newly added, retracted, or finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Add,
    Revoke,
    Commit,
}

impl UpdateKind {
    /// Parse a wire `update_type` header value.
    ///
    /// Accepts both the bare form (`"REVOKE"`) and the prefixed form the
    /// original producers emit (`"UpdateType.REVOKE"`).
    pub fn from_header(value: &str) -> Option<Self> {
        match value.strip_prefix("UpdateType.").unwrap_or(value) {
            "ADD" => Some(Self::Add),
            "REVOKE" => Some(Self::Revoke),
            "COMMIT" => Some(Self::Commit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Revoke => "REVOKE",
            Self::Commit => "COMMIT",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit paired with how it enters the stream.
#[derive(Clone, Debug)]
pub struct Update {
    pub unit: Arc<dyn Unit>,
    pub kind: UpdateKind,
}

/// An ordered batch of updates. Order is significant.
#[derive(Clone, Debug, Default)]
pub struct UpdateBatch {
    updates: Vec<Update>,
}

impl UpdateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A batch holding exactly one update.
    pub fn single(unit: Arc<dyn Unit>, kind: UpdateKind) -> Self {
        Self {
            updates: vec![Update { unit, kind }],
        }
    }

    pub fn add(&mut self, unit: Arc<dyn Unit>, kind: UpdateKind) {
        self.updates.push(Update { unit, kind });
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Update> {
        self.updates.iter()
    }
}

impl IntoIterator for UpdateBatch {
    type Item = Update;
    type IntoIter = std::vec::IntoIter<Update>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.into_iter()
    }
}

impl<'a> IntoIterator for &'a UpdateBatch {
    type Item = &'a Update;
    type IntoIter = std::slice::Iter<'a, Update>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.iter()
    }
}

/// Downstream consumer of update batches.
///
/// Implemented for `mpsc::Sender<UpdateBatch>`, so tests and channel-fed
/// consumers need no wrapper types.
pub trait UpdateSink: Send + Sync {
    fn emit(&self, batch: UpdateBatch);
}

impl UpdateSink for Sender<UpdateBatch> {
    fn emit(&self, batch: UpdateBatch) {
        if self.send(batch).is_err() {
            warn!("update sink disconnected, batch dropped");
        }
    }
}
