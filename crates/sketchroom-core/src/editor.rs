//! The editing surface: local edits, remote edits, and undo/redo over
//! one board.
//!
//! [`BoardEditor`] records every mutation through the command stack and
//! queues the wire form of local edits for broadcast. Remote edits take
//! the same path minus the queue, so they stay undoable without looping
//! back to the network. Undo and redo are always local: inverses are
//! never broadcast.

use std::mem;

use chrono::Utc;
use kurbo::Affine;

use crate::board::BoardState;
use crate::command::{Command, Origin, TransformChange};
use crate::error::ResourceError;
use crate::history::{CommandStack, MAX_UNDO_OPERATIONS};
use crate::image::{CanvasImage, ImageId};
use crate::protocol::{Envelope, Payload};
use crate::session::RoomEvent;
use crate::stroke::{Stroke, StrokeId};

/// How far a pasted image lands from its source.
pub const PASTE_OFFSET: f64 = 16.0;

/// Local editing state for one user on one board.
pub struct BoardEditor {
    user_id: String,
    user_name: String,
    board: BoardState,
    history: CommandStack,
    clipboard: Vec<CanvasImage>,
    outgoing: Vec<Envelope>,
    released: Vec<ImageId>,
}

impl BoardEditor {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self::with_history_limit(user_id, user_name, MAX_UNDO_OPERATIONS)
    }

    pub fn with_history_limit(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        max_ops: usize,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            board: BoardState::new(),
            history: CommandStack::with_limit(max_ops),
            clipboard: Vec::new(),
            outgoing: Vec::new(),
            released: Vec::new(),
        }
    }

    /// Finish a local stroke: record it and queue it for broadcast.
    pub fn add_stroke(&mut self, stroke: Stroke) {
        self.queue(Payload::Stroke {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            stroke: stroke.to_wire(),
        });
        self.record(Command::AddStrokes(vec![stroke]), Origin::Local);
    }

    /// Erase strokes. The wire protocol cannot express stroke removal,
    /// so erasures stay local.
    pub fn remove_strokes(&mut self, ids: &[StrokeId]) {
        let removed = self.board.indexed_strokes(ids);
        if removed.is_empty() {
            return;
        }
        self.record(Command::RemoveStrokes(removed), Origin::Local);
    }

    /// Decode and place an image, recording and broadcasting it.
    pub fn add_image(&mut self, data: Vec<u8>, transform: Affine) -> Result<ImageId, ResourceError> {
        let image = CanvasImage::from_bytes(data, transform)?;
        let id = image.id;
        self.queue(Payload::ImageAdd {
            user_id: self.user_id.clone(),
            image: image.to_wire(),
        });
        self.record(Command::AddImages(vec![image]), Origin::Local);
        Ok(id)
    }

    pub fn remove_images(&mut self, ids: &[ImageId]) {
        let removed = self.board.indexed_images(ids);
        if removed.is_empty() {
            return;
        }
        for (_, image) in &removed {
            self.queue(Payload::ImageRemove {
                user_id: self.user_id.clone(),
                id: image.id,
            });
        }
        self.record(Command::RemoveImages(removed), Origin::Local);
    }

    /// Apply one world-frame delta to each image, as a single undoable
    /// step. Peers receive the resulting absolute transforms.
    pub fn transform_images(&mut self, ids: &[ImageId], delta: Affine) {
        let mut changes = Vec::new();
        for &id in ids {
            if let Some(image) = self.board.image(id) {
                let old = image.transform();
                changes.push(TransformChange {
                    id,
                    old,
                    new: delta * old,
                });
            }
        }
        self.record_transforms(changes);
    }

    /// Put images back at their creation placement.
    pub fn reset_image_transforms(&mut self, ids: &[ImageId]) {
        let mut changes = Vec::new();
        for &id in ids {
            if let Some(image) = self.board.image(id) {
                let old = image.transform();
                let new = image.original_transform;
                if old != new {
                    changes.push(TransformChange { id, old, new });
                }
            }
        }
        self.record_transforms(changes);
    }

    /// Wipe the whole canvas, for everyone. Peers receive one clear
    /// message; locally the wipe is recorded as removal commands, so
    /// each half stays undoable.
    pub fn clear_canvas(&mut self) {
        self.queue(Payload::ClearCanvas {
            user_id: self.user_id.clone(),
        });
        self.wipe(Origin::Local);
    }

    pub fn copy_images(&mut self, ids: &[ImageId]) {
        let copies: Vec<CanvasImage> = ids
            .iter()
            .filter_map(|&id| self.board.image(id).cloned())
            .collect();
        if !copies.is_empty() {
            self.clipboard = copies;
        }
    }

    pub fn cut_images(&mut self, ids: &[ImageId]) {
        self.copy_images(ids);
        self.remove_images(ids);
    }

    /// Place clipboard images as new board entries, offset from their
    /// sources, and return the ids they were given.
    pub fn paste(&mut self) -> Vec<ImageId> {
        if self.clipboard.is_empty() {
            return Vec::new();
        }
        let mut pasted = Vec::with_capacity(self.clipboard.len());
        for source in &self.clipboard {
            let mut copy = source.clone();
            copy.id = ImageId::new_v4();
            copy.apply_delta(Affine::translate((PASTE_OFFSET, PASTE_OFFSET)));
            copy.original_transform = copy.transform();
            copy.created_at = Utc::now();
            pasted.push(copy);
        }
        let ids: Vec<ImageId> = pasted.iter().map(|image| image.id).collect();
        for image in &pasted {
            self.queue(Payload::ImageAdd {
                user_id: self.user_id.clone(),
                image: image.to_wire(),
            });
        }
        self.record(Command::AddImages(pasted), Origin::Local);
        ids
    }

    /// Revert the most recent command. Inverses are not broadcast.
    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.board)
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.board)
    }

    /// Record a peer's stroke so it is locally undoable without being
    /// re-broadcast.
    pub fn apply_remote_stroke(&mut self, stroke: Stroke) {
        self.record(Command::AddStrokes(vec![stroke]), Origin::Remote);
    }

    pub fn apply_remote_image(&mut self, image: CanvasImage) {
        self.record(Command::AddImages(vec![image]), Origin::Remote);
    }

    /// Apply a peer's absolute transform for an image we hold.
    pub fn apply_remote_transform(&mut self, id: ImageId, transform: Affine) {
        let Some(image) = self.board.image(id) else {
            log::debug!("transform for unknown image {id}, ignored");
            return;
        };
        let old = image.transform();
        self.record(
            Command::TransformImages(vec![TransformChange {
                id,
                old,
                new: transform,
            }]),
            Origin::Remote,
        );
    }

    pub fn apply_remote_removal(&mut self, id: ImageId) {
        let removed = self.board.indexed_images(&[id]);
        if removed.is_empty() {
            log::debug!("removal of unknown image {id}, ignored");
            return;
        }
        self.record(Command::RemoveImages(removed), Origin::Remote);
    }

    pub fn apply_remote_clear(&mut self) {
        self.wipe(Origin::Remote);
    }

    /// Route a canvas event from the session into local state.
    /// Connection and presence events pass back to the caller.
    pub fn apply_room_event(&mut self, event: RoomEvent) -> Option<RoomEvent> {
        match event {
            RoomEvent::StrokeReceived { stroke, .. } => {
                self.apply_remote_stroke(stroke);
                None
            }
            RoomEvent::ImageAdded { image, .. } => {
                self.apply_remote_image(image);
                None
            }
            RoomEvent::ImageTransformed { id, transform, .. } => {
                self.apply_remote_transform(id, transform);
                None
            }
            RoomEvent::ImageRemoved { id, .. } => {
                self.apply_remote_removal(id);
                None
            }
            RoomEvent::CanvasCleared { .. } => {
                self.apply_remote_clear();
                None
            }
            other => Some(other),
        }
    }

    /// Envelopes queued by local edits since the last call, in order.
    pub fn take_outgoing(&mut self) -> Vec<Envelope> {
        mem::take(&mut self.outgoing)
    }

    /// Image ids no longer referenced by board, clipboard, or history.
    /// The painter-side cache uses these to purge derived artifacts.
    pub fn take_released_images(&mut self) -> Vec<ImageId> {
        mem::take(&mut self.released)
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn history(&self) -> &CommandStack {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Selection is view state, not an edit: it bypasses history.
    pub fn select(&mut self, id: ImageId) {
        self.board.select(id);
    }

    pub fn add_to_selection(&mut self, id: ImageId) {
        self.board.add_to_selection(id);
    }

    pub fn clear_selection(&mut self) {
        self.board.clear_selection();
    }

    fn record(&mut self, command: Command, origin: Origin) {
        let released = self
            .history
            .execute(&mut self.board, command, origin, &self.clipboard);
        self.released.extend(released);
    }

    fn record_transforms(&mut self, changes: Vec<TransformChange>) {
        if changes.is_empty() {
            return;
        }
        for change in &changes {
            self.queue(Payload::ImageUpdate {
                user_id: self.user_id.clone(),
                id: change.id,
                transform: change.new,
            });
        }
        self.record(Command::TransformImages(changes), Origin::Local);
    }

    fn wipe(&mut self, origin: Origin) {
        let stroke_ids: Vec<StrokeId> = self.board.strokes.iter().map(|stroke| stroke.id).collect();
        let strokes = self.board.indexed_strokes(&stroke_ids);
        if !strokes.is_empty() {
            self.record(Command::RemoveStrokes(strokes), origin);
        }
        let image_ids: Vec<ImageId> = self.board.images.iter().map(|image| image.id).collect();
        let images = self.board.indexed_images(&image_ids);
        if !images.is_empty() {
            self.record(Command::RemoveImages(images), origin);
        }
    }

    fn queue(&mut self, payload: Payload) {
        self.outgoing.push(Envelope::new(payload));
    }
}
