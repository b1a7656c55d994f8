//! In-memory notebook implementing the host surfaces comet wraps.
//!
//! `MemoryNotebook` is a small stand-in for a real notebook front end: a
//! list of cells, a selection, a keyboard mode, a metadata map, a cell
//! clipboard and a queue of pending executions. It implements
//! [`DocumentFacade`]; [`MemoryActions`] and [`MemoryClipboard`] implement the
//! dispatcher and clipboard surfaces on top of it.
//!
//! Executions are asynchronous like a real kernel: `run-*` actions queue
//! cells and clear their outputs, and [`MemoryNotebook::finish_executions`]
//! completes the queue, after which the host would send a settle signal.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::clipboard::CellClipboard;
use crate::document::{CellKind, DocumentFacade, EditMode};
use crate::interceptor::ActionHandler;

/// Errors raised by the in-memory action handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryActionError {
    #[error("unknown action `{0}`")]
    UnknownAction(String),

    #[error("notebook has no cells")]
    EmptyNotebook,

    #[error("cell {index} has no neighbour to merge with")]
    NoNeighbour { index: usize },

    #[error("no deleted cells to restore")]
    NothingToUndo,
}

/// One notebook cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCell {
    pub kind: CellKind,
    pub source: String,
    pub outputs: Vec<String>,
    pub execution_count: Option<u64>,
}

impl MemoryCell {
    pub fn new(kind: CellKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            outputs: Vec::new(),
            execution_count: None,
        }
    }

    pub fn code(source: impl Into<String>) -> Self {
        Self::new(CellKind::Code, source)
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self::new(CellKind::Markdown, source)
    }

    pub fn raw(source: impl Into<String>) -> Self {
        Self::new(CellKind::Raw, source)
    }

    fn clear_outputs(&mut self) {
        self.outputs.clear();
        self.execution_count = None;
    }

    fn to_json(&self) -> Value {
        match self.kind {
            CellKind::Code => json!({
                "cell_type": self.kind,
                "source": self.source,
                "metadata": {},
                "outputs": self
                    .outputs
                    .iter()
                    .map(|text| json!({"output_type": "stream", "name": "stdout", "text": text}))
                    .collect::<Vec<_>>(),
                "execution_count": self.execution_count,
            }),
            _ => json!({
                "cell_type": self.kind,
                "source": self.source,
                "metadata": {},
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PastePosition {
    Above,
    Below,
    Replace,
}

#[derive(Debug, Default)]
struct NotebookState {
    cells: Vec<MemoryCell>,
    cursor: usize,
    anchor: usize,
    mode: EditMode,
    metadata: BTreeMap<String, bool>,
    clipboard: Vec<MemoryCell>,
    deleted: Vec<(usize, Vec<MemoryCell>)>,
    pending: Vec<usize>,
    execution_counter: u64,
}

impl NotebookState {
    fn selection(&self) -> (usize, usize) {
        (self.cursor.min(self.anchor), self.cursor.max(self.anchor))
    }

    fn selected_indices(&self) -> Vec<usize> {
        if self.cells.is_empty() {
            return Vec::new();
        }
        let (start, end) = self.selection();
        (start..=end).collect()
    }

    fn select(&mut self, index: usize) {
        let index = index.min(self.cells.len().saturating_sub(1));
        self.cursor = index;
        self.anchor = index;
    }

    fn require_cells(&self) -> Result<(), MemoryActionError> {
        if self.cells.is_empty() {
            Err(MemoryActionError::EmptyNotebook)
        } else {
            Ok(())
        }
    }

    fn queue(&mut self, index: usize) {
        if let Some(cell) = self.cells.get_mut(index) {
            if cell.kind.is_code() {
                cell.clear_outputs();
                self.pending.push(index);
            }
        }
    }

    fn queue_range(&mut self, range: std::ops::Range<usize>) {
        for index in range {
            self.queue(index);
        }
    }

    fn insert(&mut self, at: usize, cell: MemoryCell) {
        let at = at.min(self.cells.len());
        self.cells.insert(at, cell);
        self.select(at);
    }

    fn copy_selected(&mut self) {
        let (start, end) = self.selection();
        if let Some(cells) = self.cells.get(start..=end) {
            self.clipboard = cells.to_vec();
        }
    }

    fn delete_selected(&mut self) -> Result<Vec<MemoryCell>, MemoryActionError> {
        self.require_cells()?;
        let (start, end) = self.selection();
        let removed: Vec<_> = self.cells.drain(start..=end).collect();
        self.select(start);
        Ok(removed)
    }

    fn paste(&mut self, position: PastePosition) {
        if self.clipboard.is_empty() {
            return;
        }
        let cells = self.clipboard.clone();
        let count = cells.len();
        let at = match position {
            PastePosition::Above => self.selection().0,
            PastePosition::Below => (self.selection().1 + 1).min(self.cells.len()),
            PastePosition::Replace => {
                if !self.cells.is_empty() {
                    let (start, end) = self.selection();
                    self.cells.drain(start..=end);
                }
                self.selection().0.min(self.cells.len())
            }
        };
        self.cells.splice(at..at, cells);
        self.select(at + count - 1);
    }

    fn merge(&mut self, first: usize, last: usize) {
        let merged = self.cells[first..=last]
            .iter()
            .map(|cell| cell.source.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.cells.drain(first + 1..=last);
        let cell = &mut self.cells[first];
        cell.source = merged;
        cell.clear_outputs();
        self.select(first);
    }

    fn change_kind(&mut self, kind: CellKind) -> Result<(), MemoryActionError> {
        self.require_cells()?;
        let (start, end) = self.selection();
        for cell in &mut self.cells[start..=end] {
            if cell.kind != kind {
                cell.kind = kind;
                cell.clear_outputs();
            }
        }
        Ok(())
    }

    fn apply(&mut self, action: &str) -> Result<(), MemoryActionError> {
        let cursor = self.cursor;
        match action {
            "run-cell" => {
                self.require_cells()?;
                self.queue(cursor);
            }
            "run-cell-and-select-next" => {
                self.require_cells()?;
                self.queue(cursor);
                if cursor + 1 < self.cells.len() {
                    self.select(cursor + 1);
                } else {
                    self.insert(cursor + 1, MemoryCell::code(""));
                }
            }
            "run-cell-and-insert-below" => {
                self.require_cells()?;
                self.queue(cursor);
                self.insert(cursor + 1, MemoryCell::code(""));
            }
            "run-all-cells" => self.queue_range(0..self.cells.len()),
            "run-all-cells-above" => self.queue_range(0..cursor),
            "run-all-cells-below" => self.queue_range(cursor..self.cells.len()),
            "restart-kernel-and-run-all-cells" | "confirm-restart-kernel-and-run-all-cells" => {
                self.execution_counter = 0;
                self.pending.clear();
                self.cells.iter_mut().for_each(MemoryCell::clear_outputs);
                self.queue_range(0..self.cells.len());
            }
            "delete-cell" => {
                let start = self.selection().0;
                let removed = self.delete_selected()?;
                self.deleted.push((start, removed));
            }
            "undo-cell-deletion" => {
                let (at, cells) = self.deleted.pop().ok_or(MemoryActionError::NothingToUndo)?;
                let at = at.min(self.cells.len());
                self.cells.splice(at..at, cells);
                self.select(at);
            }
            "split-cell-at-cursor" => {
                self.require_cells()?;
                let cell = &mut self.cells[cursor];
                let tail = match cell.source.split_once('\n') {
                    Some((head, tail)) => {
                        let tail = tail.to_string();
                        cell.source = head.to_string();
                        tail
                    }
                    None => String::new(),
                };
                let kind = cell.kind;
                self.insert(cursor + 1, MemoryCell::new(kind, tail));
            }
            "merge-cell-with-previous-cell" => {
                self.require_cells()?;
                if cursor == 0 {
                    return Err(MemoryActionError::NoNeighbour { index: cursor });
                }
                self.merge(cursor - 1, cursor);
            }
            "merge-cell-with-next-cell" => {
                self.require_cells()?;
                if cursor + 1 >= self.cells.len() {
                    return Err(MemoryActionError::NoNeighbour { index: cursor });
                }
                self.merge(cursor, cursor + 1);
            }
            "merge-selected-cells" | "merge-cells" => {
                self.require_cells()?;
                let (start, end) = self.selection();
                if start < end {
                    self.merge(start, end);
                }
            }
            "cut-cell" => {
                self.copy_selected();
                self.delete_selected()?;
            }
            "copy-cell" => self.copy_selected(),
            "paste-cell-above" => self.paste(PastePosition::Above),
            "paste-cell-below" => self.paste(PastePosition::Below),
            "paste-cell-replace" => self.paste(PastePosition::Replace),
            "insert-cell-above" => self.insert(cursor, MemoryCell::code("")),
            "insert-cell-below" => {
                let at = if self.cells.is_empty() { 0 } else { cursor + 1 };
                self.insert(at, MemoryCell::code(""));
            }
            "move-cell-down" => {
                if cursor + 1 < self.cells.len() {
                    self.cells.swap(cursor, cursor + 1);
                    self.select(cursor + 1);
                }
            }
            "move-cell-up" => {
                if cursor > 0 && cursor < self.cells.len() {
                    self.cells.swap(cursor, cursor - 1);
                    self.select(cursor - 1);
                }
            }
            "change-cell-to-markdown" => self.change_kind(CellKind::Markdown)?,
            "change-cell-to-code" => self.change_kind(CellKind::Code)?,
            "change-cell-to-raw" => self.change_kind(CellKind::Raw)?,
            "clear-cell-output" => {
                let (start, end) = self.selection();
                if let Some(cells) = self.cells.get_mut(start..=end) {
                    cells.iter_mut().for_each(MemoryCell::clear_outputs);
                }
            }
            "clear-all-cells-output" => {
                self.cells.iter_mut().for_each(MemoryCell::clear_outputs);
            }
            "select-next-cell" => self.select(cursor + 1),
            "select-previous-cell" => self.select(cursor.saturating_sub(1)),
            "enter-edit-mode" => self.mode = EditMode::Edit,
            "enter-command-mode" => self.mode = EditMode::Command,
            other => return Err(MemoryActionError::UnknownAction(other.to_string())),
        }
        Ok(())
    }
}

// =============================================================================
// Memory Notebook
// =============================================================================

/// A notebook document held in memory.
#[derive(Debug)]
pub struct MemoryNotebook {
    path: String,
    base_address: String,
    state: Mutex<NotebookState>,
}

impl MemoryNotebook {
    /// An empty notebook at `path` served from `base_address`.
    pub fn new(path: impl Into<String>, base_address: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base_address: base_address.into(),
            state: Mutex::new(NotebookState::default()),
        }
    }

    /// A four-cell notebook: markdown, code, code, markdown.
    pub fn sample() -> Self {
        Self::new("work/analysis.ipynb", "http://localhost:8888/").with_cells(vec![
            MemoryCell::markdown("# Analysis"),
            MemoryCell::code("import pandas as pd"),
            MemoryCell::code("df = pd.read_csv('data.csv')\ndf.describe()"),
            MemoryCell::markdown("Notes"),
        ])
    }

    pub fn with_cells(self, cells: Vec<MemoryCell>) -> Self {
        self.lock().cells = cells;
        self
    }

    fn lock(&self) -> MutexGuard<'_, NotebookState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a notebook action by canonical name.
    pub fn apply(&self, action: &str) -> Result<(), MemoryActionError> {
        self.lock().apply(action)
    }

    pub fn push_cell(&self, cell: MemoryCell) {
        self.lock().cells.push(cell);
    }

    /// Select a single cell (clamped to the last cell).
    pub fn select(&self, index: usize) {
        self.lock().select(index);
    }

    /// Select the cells between `anchor` and `cursor`, inclusive.
    pub fn select_range(&self, anchor: usize, cursor: usize) {
        let mut state = self.lock();
        let last = state.cells.len().saturating_sub(1);
        state.anchor = anchor.min(last);
        state.cursor = cursor.min(last);
    }

    pub fn set_mode(&self, mode: EditMode) {
        self.lock().mode = mode;
    }

    pub fn set_outputs(&self, index: usize, outputs: Vec<String>) {
        if let Some(cell) = self.lock().cells.get_mut(index) {
            cell.outputs = outputs;
        }
    }

    pub fn cell(&self, index: usize) -> Option<MemoryCell> {
        self.lock().cells.get(index).cloned()
    }

    pub fn cells(&self) -> Vec<MemoryCell> {
        self.lock().cells.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().cells.is_empty()
    }

    /// Number of queued executions.
    pub fn pending_executions(&self) -> usize {
        self.lock().pending.len()
    }

    /// Complete every queued execution. Returns how many ran.
    pub fn finish_executions(&self) -> usize {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        let mut ran = 0;
        for index in pending {
            state.execution_counter += 1;
            let count = state.execution_counter;
            if let Some(cell) = state.cells.get_mut(index).filter(|c| c.kind.is_code()) {
                cell.execution_count = Some(count);
                cell.outputs = vec![format!("Out[{count}]")];
                ran += 1;
            }
        }
        debug!(ran, "executions finished");
        ran
    }

    fn copy_selected(&self) {
        self.lock().copy_selected();
    }

    fn delete_selected(&self) -> Result<Vec<MemoryCell>, MemoryActionError> {
        self.lock().delete_selected()
    }

    fn paste(&self, position: PastePosition) {
        self.lock().paste(position);
    }
}

impl DocumentFacade for MemoryNotebook {
    fn selected_index(&self) -> usize {
        self.lock().cursor
    }

    fn selected_indices(&self) -> Vec<usize> {
        self.lock().selected_indices()
    }

    fn cell_kind(&self, index: usize) -> Option<CellKind> {
        self.lock().cells.get(index).map(|cell| cell.kind)
    }

    fn serialize(&self) -> Value {
        let state = self.lock();
        json!({
            "cells": state.cells.iter().map(MemoryCell::to_json).collect::<Vec<_>>(),
            "metadata": state.metadata,
            "nbformat": 4,
            "nbformat_minor": 2,
        })
    }

    fn location(&self) -> String {
        self.path.clone()
    }

    fn base_address(&self) -> String {
        self.base_address.clone()
    }

    fn mode(&self) -> EditMode {
        self.lock().mode
    }

    fn metadata_flag(&self, key: &str) -> Option<bool> {
        self.lock().metadata.get(key).copied()
    }

    fn set_metadata_flag(&self, key: &str, value: bool) {
        self.lock().metadata.insert(key.to_string(), value);
    }
}

// =============================================================================
// Host Surfaces
// =============================================================================

/// Action handler executing notebook actions on a [`MemoryNotebook`].
///
/// Accepts qualified (`namespace:action`) or bare action names.
#[derive(Debug, Clone)]
pub struct MemoryActions {
    notebook: Arc<MemoryNotebook>,
}

impl MemoryActions {
    pub fn new(notebook: Arc<MemoryNotebook>) -> Self {
        Self { notebook }
    }
}

impl ActionHandler for MemoryActions {
    type Args = ();
    type Output = ();
    type Error = MemoryActionError;

    fn call(&self, action: &str, _args: ()) -> Result<(), MemoryActionError> {
        let name = action.split_once(':').map_or(action, |(_, name)| name);
        self.notebook.apply(name)
    }
}

/// Cell clipboard of a [`MemoryNotebook`].
#[derive(Debug, Clone)]
pub struct MemoryClipboard {
    notebook: Arc<MemoryNotebook>,
}

impl MemoryClipboard {
    pub fn new(notebook: Arc<MemoryNotebook>) -> Self {
        Self { notebook }
    }
}

impl CellClipboard for MemoryClipboard {
    fn copy_cell(&self) {
        self.notebook.copy_selected();
    }

    fn delete_cells(&self) {
        if let Err(e) = self.notebook.delete_selected() {
            debug!(error = %e, "nothing to delete");
        }
    }

    fn paste_cell_above(&self) {
        self.notebook.paste(PastePosition::Above);
    }

    fn paste_cell_below(&self) {
        self.notebook.paste(PastePosition::Below);
    }

    fn paste_cell_replace(&self) {
        self.notebook.paste(PastePosition::Replace);
    }
}
