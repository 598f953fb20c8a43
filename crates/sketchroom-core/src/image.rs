//! Canvas images: encoded source bytes, decoded pixel handles, and
//! board placement.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kurbo::{Affine, Point, Size};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ResourceError;
use crate::transform::Placement;

/// Unique identifier for a canvas image. Stable across the room: peers
/// reference images by id in update and remove messages.
pub type ImageId = Uuid;

/// Encoded image format, detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    /// Detect format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(ImageFormat::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        None
    }
}

/// Decoded RGBA8 pixels. Handed out behind an `Arc` so board state,
/// clipboard, and undo history can share one decode.
pub struct Pixels {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, row-major, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// Shared reference to decoded pixels.
pub type PixelHandle = Arc<Pixels>;

impl Pixels {
    /// Decode encoded image bytes (PNG, JPEG, or WebP) into RGBA8.
    pub fn decode(data: &[u8]) -> Result<PixelHandle, ResourceError> {
        if ImageFormat::from_magic_bytes(data).is_none() {
            return Err(ResourceError::Decode("unrecognized image format".into()));
        }
        let decoded =
            ::image::load_from_memory(data).map_err(|err| ResourceError::Decode(err.to_string()))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Arc::new(Pixels {
            width,
            height,
            rgba: rgba.into_vec(),
        }))
    }

    pub fn size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }
}

impl fmt::Debug for Pixels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pixels")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

/// An image placed on the board.
///
/// `placement.transform` is the single source of truth for position,
/// scale, and rotation. The encoded source bytes are kept so the image
/// can be put back on the wire (paste, re-broadcast) without
/// re-encoding pixels.
#[derive(Debug, Clone)]
pub struct CanvasImage {
    pub id: ImageId,
    /// Encoded source bytes (PNG, JPEG, or WebP).
    pub data: Arc<Vec<u8>>,
    pub pixels: PixelHandle,
    pub placement: Placement,
    /// Transform at creation time, for reset.
    pub original_transform: Affine,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl CanvasImage {
    /// Decode `data` and place the image with a fresh id.
    pub fn from_bytes(data: Vec<u8>, transform: Affine) -> Result<Self, ResourceError> {
        Self::from_bytes_with_id(ImageId::new_v4(), data, transform)
    }

    /// Decode `data` and place the image under a known id. Used for
    /// images arriving from peers, whose ids must be preserved.
    pub fn from_bytes_with_id(
        id: ImageId,
        data: Vec<u8>,
        transform: Affine,
    ) -> Result<Self, ResourceError> {
        let pixels = Pixels::decode(&data)?;
        let now = Utc::now();
        Ok(Self {
            id,
            data: Arc::new(data),
            placement: Placement::with_transform(transform, pixels.size()),
            pixels,
            original_transform: transform,
            created_at: now,
            last_modified: now,
        })
    }

    /// Compose a world-frame delta onto the current placement.
    pub fn apply_delta(&mut self, delta: Affine) {
        self.placement.apply_delta(delta);
        self.last_modified = Utc::now();
    }

    /// Replace the transform outright (absolute updates from peers).
    pub fn set_transform(&mut self, transform: Affine) {
        self.placement.transform = transform;
        self.last_modified = Utc::now();
    }

    pub fn transform(&self) -> Affine {
        self.placement.transform
    }

    pub fn contains(&self, point: Point) -> bool {
        self.placement.contains(point)
    }

    /// Wire form: id, base64 source bytes, and the current transform.
    pub fn to_wire(&self) -> WireImage {
        use base64::{Engine, engine::general_purpose::STANDARD};

        WireImage {
            id: self.id,
            data: STANDARD.encode(self.data.as_slice()),
            transform: self.placement.transform,
        }
    }

    /// Rebuild an image from its wire form, preserving the sender's id.
    pub fn from_wire(wire: &WireImage) -> Result<Self, ResourceError> {
        use base64::{Engine, engine::general_purpose::STANDARD};

        let data = STANDARD
            .decode(&wire.data)
            .map_err(|err| ResourceError::Decode(format!("bad base64 image data: {err}")))?;
        Self::from_bytes_with_id(wire.id, data, wire.transform)
    }
}

/// JSON form of a placed image. The transform serializes as the six
/// affine coefficients `[a, b, c, d, e, f]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireImage {
    pub id: ImageId,
    /// Base64-encoded source bytes.
    pub data: String,
    pub transform: Affine,
}
