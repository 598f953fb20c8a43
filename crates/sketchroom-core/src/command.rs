//! Reversible edit commands, the unit of undo/redo.

use kurbo::Affine;

use crate::board::BoardState;
use crate::image::{CanvasImage, ImageId};
use crate::stroke::Stroke;

/// Where an edit came from. Remote edits stay undoable locally but are
/// never re-broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// One image's transform change, holding both endpoints so the command
/// inverts without recomputing deltas.
#[derive(Debug, Clone, Copy)]
pub struct TransformChange {
    pub id: ImageId,
    pub old: Affine,
    pub new: Affine,
}

/// A reversible edit. Each variant carries exactly the data needed to
/// invert itself; removal variants keep `(draw index, item)` pairs in
/// ascending order so revert can re-insert at the original positions.
#[derive(Debug, Clone)]
pub enum Command {
    AddStrokes(Vec<Stroke>),
    RemoveStrokes(Vec<(usize, Stroke)>),
    AddImages(Vec<CanvasImage>),
    RemoveImages(Vec<(usize, CanvasImage)>),
    TransformImages(Vec<TransformChange>),
}

impl Command {
    /// Apply the forward effect to the board.
    pub fn apply(&self, board: &mut BoardState) {
        match self {
            Command::AddStrokes(strokes) => {
                for stroke in strokes {
                    board.add_stroke(stroke.clone());
                }
            }
            Command::RemoveStrokes(entries) => {
                for (_, stroke) in entries {
                    board.remove_stroke(stroke.id);
                }
            }
            Command::AddImages(images) => {
                for image in images {
                    board.add_image(image.clone());
                }
            }
            Command::RemoveImages(entries) => {
                for (_, image) in entries {
                    board.remove_image(image.id);
                }
            }
            Command::TransformImages(changes) => {
                for change in changes {
                    if let Some(image) = board.image_mut(change.id) {
                        image.set_transform(change.new);
                    }
                }
            }
        }
    }

    /// Undo the forward effect. Re-insertion walks the captured pairs
    /// in ascending index order, which restores the original draw order.
    pub fn revert(&self, board: &mut BoardState) {
        match self {
            Command::AddStrokes(strokes) => {
                for stroke in strokes {
                    board.remove_stroke(stroke.id);
                }
            }
            Command::RemoveStrokes(entries) => {
                for (index, stroke) in entries {
                    board.insert_stroke(*index, stroke.clone());
                }
            }
            Command::AddImages(images) => {
                for image in images {
                    board.remove_image(image.id);
                }
            }
            Command::RemoveImages(entries) => {
                for (index, image) in entries {
                    board.insert_image(*index, image.clone());
                }
            }
            Command::TransformImages(changes) => {
                for change in changes {
                    if let Some(image) = board.image_mut(change.id) {
                        image.set_transform(change.old);
                    }
                }
            }
        }
    }

    /// Ids of images whose pixel data this command keeps alive.
    /// Transform changes reference ids without holding pixels, so they
    /// do not count.
    pub fn held_image_ids(&self) -> Vec<ImageId> {
        match self {
            Command::AddImages(images) => images.iter().map(|i| i.id).collect(),
            Command::RemoveImages(entries) => entries.iter().map(|(_, i)| i.id).collect(),
            _ => Vec::new(),
        }
    }

    /// A command with nothing to do is never recorded.
    pub fn is_empty(&self) -> bool {
        match self {
            Command::AddStrokes(strokes) => strokes.is_empty(),
            Command::RemoveStrokes(entries) => entries.is_empty(),
            Command::AddImages(images) => images.is_empty(),
            Command::RemoveImages(entries) => entries.is_empty(),
            Command::TransformImages(changes) => changes.is_empty(),
        }
    }
}
