//! The catalog of tracked actions and how each one is observed.
//!
//! Hosts dispatch actions by qualified name (`jupyter-notebook:run-cell`).
//! The catalog strips the namespace prefix, decides whether the action is
//! tracked at all, and classifies it:
//!
//! | Class        | Examples                                | Observed                           |
//! |--------------|-----------------------------------------|------------------------------------|
//! | `Edit`       | `delete-cell`, `move-cell-up`           | immediately after the call         |
//! | `Execute`    | `run-cell`, `run-cell-and-select-next`  | after settle, if target is code    |
//! | `ExecuteAll` | `run-all-cells`, restart-and-run-all    | always after settle                |
//!
//! The catalog is immutable once built and shared behind an `Arc`.

use std::collections::BTreeMap;

use crate::document::CellKind;

/// Namespace the notebook front end uses for its built-in actions.
pub const DEFAULT_NAMESPACE: &str = "jupyter-notebook";

const EDIT_ACTIONS: &[&str] = &[
    // delete cells
    "delete-cell",
    "undo-cell-deletion",
    // split and merge
    "split-cell-at-cursor",
    "merge-cell-with-previous-cell",
    "merge-cell-with-next-cell",
    "merge-selected-cells",
    "merge-cells",
    // cut and paste
    "cut-cell",
    "paste-cell-above",
    "paste-cell-below",
    // insert
    "insert-cell-above",
    "insert-cell-below",
    // move
    "move-cell-down",
    "move-cell-up",
    // change cell type
    "change-cell-to-markdown",
    "change-cell-to-code",
    "change-cell-to-raw",
    // outputs
    "clear-cell-output",
    "clear-all-cells-output",
];

const EXECUTE_ACTIONS: &[&str] = &[
    "run-cell",
    "run-cell-and-select-next",
    "run-cell-and-insert-below",
];

const EXECUTE_ALL_ACTIONS: &[&str] = &[
    "run-all-cells",
    "run-all-cells-above",
    "run-all-cells-below",
    "restart-kernel-and-run-all-cells",
    "confirm-restart-kernel-and-run-all-cells",
];

/// How an action's effect becomes observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// Effect is visible as soon as the call returns.
    Edit,
    /// Executes the target cell; code cells settle asynchronously.
    Execute,
    /// Executes many cells; always settles asynchronously.
    ExecuteAll,
}

impl ActionClass {
    /// Returns true for the execution-class subset.
    pub fn is_execution(&self) -> bool {
        matches!(self, ActionClass::Execute | ActionClass::ExecuteAll)
    }

    /// Decide when to capture, given the kind of the targeted cell.
    pub fn capture_path(&self, target: Option<CellKind>) -> CapturePath {
        match self {
            ActionClass::ExecuteAll => CapturePath::Deferred,
            ActionClass::Execute if target.is_some_and(|kind| kind.is_code()) => {
                CapturePath::Deferred
            }
            _ => CapturePath::Immediate,
        }
    }
}

/// When an intercepted action is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePath {
    /// Capture right after the host call returns.
    Immediate,
    /// Arm the correlator and capture on the next matching settle signal.
    Deferred,
}

/// Immutable set of tracked actions.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    namespace: String,
    actions: BTreeMap<String, ActionClass>,
}

impl ActionCatalog {
    /// An empty catalog for the given namespace.
    pub fn empty(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            actions: BTreeMap::new(),
        }
    }

    /// The notebook's tracked actions under the default namespace.
    pub fn notebook() -> Self {
        Self::notebook_in(DEFAULT_NAMESPACE)
    }

    /// The notebook's tracked actions under a custom namespace.
    pub fn notebook_in(namespace: impl Into<String>) -> Self {
        let catalog = Self::empty(namespace);
        let catalog = EDIT_ACTIONS
            .iter()
            .fold(catalog, |c, name| c.with_action(*name, ActionClass::Edit));
        let catalog = EXECUTE_ACTIONS
            .iter()
            .fold(catalog, |c, name| c.with_action(*name, ActionClass::Execute));
        EXECUTE_ALL_ACTIONS
            .iter()
            .fold(catalog, |c, name| c.with_action(*name, ActionClass::ExecuteAll))
    }

    /// Add (or reclassify) a tracked action.
    pub fn with_action(mut self, name: impl Into<String>, class: ActionClass) -> Self {
        self.actions.insert(name.into(), class);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Strip the namespace prefix from a qualified action name.
    ///
    /// Returns `None` for names outside this catalog's namespace.
    pub fn canonical_name<'a>(&self, qualified: &'a str) -> Option<&'a str> {
        let (namespace, name) = qualified.split_once(':')?;
        (namespace == self.namespace && !name.is_empty()).then_some(name)
    }

    /// Class of a canonical action name, if tracked.
    pub fn class_of(&self, name: &str) -> Option<ActionClass> {
        self.actions.get(name).copied()
    }

    /// Resolve a qualified name to its canonical name and class.
    pub fn resolve<'a>(&self, qualified: &'a str) -> Option<(&'a str, ActionClass)> {
        let name = self.canonical_name(qualified)?;
        Some((name, self.class_of(name)?))
    }

    /// Iterate over tracked actions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ActionClass)> {
        self.actions.iter().map(|(name, class)| (name.as_str(), *class))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::notebook()
    }
}
