//! Board state: the strokes and images making up the shared canvas.

use kurbo::Point;

use crate::image::{CanvasImage, ImageId};
use crate::stroke::{Stroke, StrokeId};

/// Mutable canvas content. Strokes and images are kept in draw order
/// (back to front); all edits flow through commands so they stay
/// reversible.
#[derive(Debug, Clone)]
pub struct BoardState {
    /// Strokes in draw order.
    pub strokes: Vec<Stroke>,
    /// Images in draw order.
    pub images: Vec<CanvasImage>,
    /// Currently selected image ids.
    pub selection: Vec<ImageId>,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    /// Create an empty board.
    pub fn new() -> Self {
        Self {
            strokes: Vec::new(),
            images: Vec::new(),
            selection: Vec::new(),
        }
    }

    /// Append a stroke on top.
    pub fn add_stroke(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Insert a stroke at a draw-order position (clamped to the end).
    pub fn insert_stroke(&mut self, index: usize, stroke: Stroke) {
        let index = index.min(self.strokes.len());
        self.strokes.insert(index, stroke);
    }

    /// Remove a stroke by id, returning it with its draw-order position.
    pub fn remove_stroke(&mut self, id: StrokeId) -> Option<(usize, Stroke)> {
        let index = self.strokes.iter().position(|s| s.id == id)?;
        Some((index, self.strokes.remove(index)))
    }

    /// Get a stroke by id.
    pub fn stroke(&self, id: StrokeId) -> Option<&Stroke> {
        self.strokes.iter().find(|s| s.id == id)
    }

    /// Append an image on top.
    pub fn add_image(&mut self, image: CanvasImage) {
        self.images.push(image);
    }

    /// Insert an image at a draw-order position (clamped to the end).
    pub fn insert_image(&mut self, index: usize, image: CanvasImage) {
        let index = index.min(self.images.len());
        self.images.insert(index, image);
    }

    /// Remove an image by id, returning it with its draw-order position.
    /// The image also leaves the selection.
    pub fn remove_image(&mut self, id: ImageId) -> Option<(usize, CanvasImage)> {
        self.selection.retain(|&s| s != id);
        let index = self.images.iter().position(|i| i.id == id)?;
        Some((index, self.images.remove(index)))
    }

    /// Get an image by id.
    pub fn image(&self, id: ImageId) -> Option<&CanvasImage> {
        self.images.iter().find(|i| i.id == id)
    }

    /// Get a mutable reference to an image by id.
    pub fn image_mut(&mut self, id: ImageId) -> Option<&mut CanvasImage> {
        self.images.iter_mut().find(|i| i.id == id)
    }

    /// Check whether an image id is present on the board.
    pub fn contains_image(&self, id: ImageId) -> bool {
        self.images.iter().any(|i| i.id == id)
    }

    /// Find the topmost image containing a world-space point.
    pub fn image_at(&self, point: Point) -> Option<ImageId> {
        self.images.iter().rev().find(|i| i.contains(point)).map(|i| i.id)
    }

    /// Snapshot `(draw index, stroke)` pairs for the given ids, in
    /// ascending draw order. Ids not on the board are skipped.
    pub fn indexed_strokes(&self, ids: &[StrokeId]) -> Vec<(usize, Stroke)> {
        self.strokes
            .iter()
            .enumerate()
            .filter(|(_, s)| ids.contains(&s.id))
            .map(|(i, s)| (i, s.clone()))
            .collect()
    }

    /// Snapshot `(draw index, image)` pairs for the given ids, in
    /// ascending draw order. Ids not on the board are skipped.
    pub fn indexed_images(&self, ids: &[ImageId]) -> Vec<(usize, CanvasImage)> {
        self.images
            .iter()
            .enumerate()
            .filter(|(_, i)| ids.contains(&i.id))
            .map(|(i, img)| (i, img.clone()))
            .collect()
    }

    /// Select a single image (clears previous selection).
    pub fn select(&mut self, id: ImageId) {
        self.selection.clear();
        self.add_to_selection(id);
    }

    /// Add an image to the selection.
    pub fn add_to_selection(&mut self, id: ImageId) {
        if !self.selection.contains(&id) {
            self.selection.push(id);
        }
    }

    /// Clear the selection.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Check if an image is selected.
    pub fn is_selected(&self, id: ImageId) -> bool {
        self.selection.contains(&id)
    }

    /// Check if the board holds no content.
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.images.is_empty()
    }
}
