//! Sketchroom Core Library
//!
//! Board state, reversible edit history, and the room synchronization
//! engine for the Sketchroom collaborative drawing board.

pub mod board;
pub mod cache;
pub mod command;
pub mod editor;
pub mod error;
pub mod history;
pub mod image;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod stroke;
pub mod timers;
pub mod transform;
pub mod transport;

pub use board::BoardState;
pub use cache::{Disposable, PictureCache};
pub use command::{Command, Origin, TransformChange};
pub use editor::BoardEditor;
pub use error::{EngineError, NetworkError, ProtocolError, ResourceError, StateError};
pub use history::{CommandStack, MAX_UNDO_OPERATIONS};
pub use image::{CanvasImage, ImageId, PixelHandle, Pixels};
pub use presence::{Presence, PresenceEvent, PresenceTracker};
pub use protocol::{Envelope, Payload};
pub use session::{ConnectionState, LocalUser, Role, RoomConfig, RoomEvent, RoomSession};
pub use stroke::{Color32, Stroke, StrokeId, StrokeKind};
pub use timers::{TimerKind, TimerQueue};
pub use transform::{Handle, HandleKind, Placement};
pub use transport::{RoomTransport, TokenRequest, TransportEvent};

#[cfg(not(target_arch = "wasm32"))]
pub use transport::NetTransport;
