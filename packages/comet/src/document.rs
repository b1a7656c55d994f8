//! The document facade: everything comet needs to know about the host document.
//!
//! The host owns the document model. Comet only reads selection state, cell
//! kinds and a serialized snapshot, and reads/writes one boolean in the
//! document's own metadata (the tracking toggle).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a notebook cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Code,
    Markdown,
    Raw,
}

impl CellKind {
    /// Returns true for cells whose effect is only visible after execution.
    pub fn is_code(&self) -> bool {
        matches!(self, CellKind::Code)
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellKind::Code => write!(f, "code"),
            CellKind::Markdown => write!(f, "markdown"),
            CellKind::Raw => write!(f, "raw"),
        }
    }
}

/// Keyboard mode of the document.
///
/// In `Command` mode keystrokes act on whole cells (so a system clipboard
/// event is a cell cut/copy/paste); in `Edit` mode they go to a cell's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    #[default]
    Command,
    Edit,
}

/// Read access to the live document plus its metadata flags.
///
/// Implementations are shared between interceptors and the correlator, so
/// all methods take `&self`; hosts use interior mutability for the metadata
/// setter.
pub trait DocumentFacade: Send + Sync {
    /// Index of the cell holding the cursor.
    fn selected_index(&self) -> usize;

    /// Indices of every selected cell, in document order.
    fn selected_indices(&self) -> Vec<usize>;

    /// Kind of the cell at `index`, or `None` past the end of the document.
    fn cell_kind(&self, index: usize) -> Option<CellKind>;

    /// Full serialization of the current document model.
    fn serialize(&self) -> serde_json::Value;

    /// Path of the document relative to the server root.
    fn location(&self) -> String;

    /// Base address of the server hosting the document.
    fn base_address(&self) -> String;

    /// Current keyboard mode.
    fn mode(&self) -> EditMode;

    /// Reads a boolean from the document metadata.
    fn metadata_flag(&self, key: &str) -> Option<bool>;

    /// Writes a boolean into the document metadata.
    ///
    /// Persisting it is left to the host's own document save.
    fn set_metadata_flag(&self, key: &str, value: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_value(CellKind::Markdown).unwrap(), "markdown");
        let kind: CellKind = serde_json::from_value("code".into()).unwrap();
        assert!(kind.is_code());
    }

    #[test]
    fn test_edit_mode_defaults_to_command() {
        assert_eq!(EditMode::default(), EditMode::Command);
    }
}
