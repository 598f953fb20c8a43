//! Undo/redo history over board state.

use std::cell::Cell;

use crate::board::BoardState;
use crate::command::{Command, Origin};
use crate::image::{CanvasImage, ImageId};

/// Maximum number of undo operations to keep.
pub const MAX_UNDO_OPERATIONS: usize = 50;

/// A recorded command with its provenance.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub command: Command,
    pub origin: Origin,
}

/// Bounded undo/redo stacks. Commands are applied through here so that
/// every mutation of the board stays reversible; programmatic apply
/// runs inside a scoped guard observable via `is_applying`, so state
/// watchers never record an undo as a fresh edit.
#[derive(Debug)]
pub struct CommandStack {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_ops: usize,
    applying: Cell<bool>,
}

/// Marks the stack as applying for the enclosing scope. Clearing lives
/// in `Drop` so an early return cannot leave the flag set.
struct ApplyScope<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> ApplyScope<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for ApplyScope<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

impl Default for CommandStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandStack {
    pub fn new() -> Self {
        Self::with_limit(MAX_UNDO_OPERATIONS)
    }

    /// Create a stack keeping at most `max_ops` undo entries.
    pub fn with_limit(max_ops: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_ops,
            applying: Cell::new(false),
        }
    }

    /// Apply a command and record it.
    ///
    /// New edits invalidate the redo stack. If the history bound is
    /// exceeded the oldest entry is evicted; the returned ids are
    /// images whose pixel data was held only by evicted entries
    /// (checked against the board, the clipboard, and the remaining
    /// history), so the caller can drop derived artifacts for them.
    pub fn execute(
        &mut self,
        board: &mut BoardState,
        command: Command,
        origin: Origin,
        clipboard: &[CanvasImage],
    ) -> Vec<ImageId> {
        if self.applying.get() {
            log::warn!("execute called while a command is being applied, ignoring");
            return Vec::new();
        }

        self.redo_stack.clear();
        {
            let _scope = ApplyScope::enter(&self.applying);
            command.apply(board);
        }
        self.undo_stack.push(HistoryEntry { command, origin });

        let mut released = Vec::new();
        while self.undo_stack.len() > self.max_ops {
            let evicted = self.undo_stack.remove(0);
            for id in evicted.command.held_image_ids() {
                if !self.is_referenced(id, board, clipboard) {
                    released.push(id);
                }
            }
        }
        released
    }

    /// Undo the most recent command.
    /// Returns true if an undo was performed, false if nothing to undo.
    pub fn undo(&mut self, board: &mut BoardState) -> bool {
        if self.applying.get() {
            return false;
        }
        if let Some(entry) = self.undo_stack.pop() {
            {
                let _scope = ApplyScope::enter(&self.applying);
                entry.command.revert(board);
            }
            self.redo_stack.push(entry);
            true
        } else {
            false
        }
    }

    /// Redo the most recently undone command.
    /// Returns true if a redo was performed, false if nothing to redo.
    pub fn redo(&mut self, board: &mut BoardState) -> bool {
        if self.applying.get() {
            return false;
        }
        if let Some(entry) = self.redo_stack.pop() {
            {
                let _scope = ApplyScope::enter(&self.applying);
                entry.command.apply(board);
            }
            self.undo_stack.push(entry);
            true
        } else {
            false
        }
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// True while a command is being applied, undone, or redone.
    pub fn is_applying(&self) -> bool {
        self.applying.get()
    }

    /// The entry the next `undo` would revert.
    pub fn peek_undo(&self) -> Option<&HistoryEntry> {
        self.undo_stack.last()
    }

    /// Every image id held anywhere in history, deduplicated.
    pub fn held_image_ids(&self) -> Vec<ImageId> {
        let mut ids: Vec<ImageId> = self
            .undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .flat_map(|e| e.command.held_image_ids())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Drop both stacks, keeping the configured bound.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn is_referenced(&self, id: ImageId, board: &BoardState, clipboard: &[CanvasImage]) -> bool {
        board.contains_image(id)
            || clipboard.iter().any(|i| i.id == id)
            || self
                .undo_stack
                .iter()
                .chain(self.redo_stack.iter())
                .any(|e| e.command.held_image_ids().contains(&id))
    }
}
