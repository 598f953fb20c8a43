//! Stroke model and its wire form.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for strokes.
pub type StrokeId = Uuid;

/// An RGBA color with 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color32 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    /// Unpack from the wire's packed ARGB integer.
    pub fn from_argb_u32(value: u32) -> Self {
        Self {
            a: (value >> 24) as u8,
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }

    /// Pack into the wire's ARGB integer.
    pub fn to_argb_u32(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | (self.b as u32)
    }
}

/// Tool-specific stroke data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrokeKind {
    /// Freehand pen path.
    Pen,
    /// Regular polygon outline or fill.
    Polygon { sides: u32, filled: bool },
    /// Text placed at the first point.
    Text { content: String, font_size: f64 },
}

/// A single drawn stroke. Immutable once created; edits clone into a
/// new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    pub points: Vec<Point>,
    pub color: Color32,
    pub width: f64,
    pub opacity: f64,
    pub kind: StrokeKind,
}

impl Stroke {
    /// Create a pen stroke with full opacity.
    pub fn new(points: Vec<Point>, color: Color32, width: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            points,
            color,
            width,
            opacity: 1.0,
            kind: StrokeKind::Pen,
        }
    }

    /// Create a regular polygon stroke.
    pub fn polygon(points: Vec<Point>, color: Color32, width: f64, sides: u32, filled: bool) -> Self {
        Self {
            kind: StrokeKind::Polygon { sides, filled },
            ..Self::new(points, color, width)
        }
    }

    /// Create a text stroke anchored at `origin`.
    pub fn text(origin: Point, content: String, font_size: f64, color: Color32) -> Self {
        Self {
            kind: StrokeKind::Text { content, font_size },
            ..Self::new(vec![origin], color, 1.0)
        }
    }

    /// Convert to the wire form broadcast to peers.
    pub fn to_wire(&self) -> WireStroke {
        let (stroke_type, sides, filled, text, font_size) = match &self.kind {
            StrokeKind::Pen => ("pen", None, None, None, None),
            StrokeKind::Polygon { sides, filled } => {
                ("polygon", Some(*sides), Some(*filled), None, None)
            }
            StrokeKind::Text { content, font_size } => {
                ("text", None, None, Some(content.clone()), Some(*font_size))
            }
        };
        WireStroke {
            points: self.points.iter().map(|p| [p.x, p.y]).collect(),
            color: self.color.to_argb_u32(),
            size: self.width,
            opacity: self.opacity,
            stroke_type: stroke_type.to_string(),
            sides,
            filled,
            text,
            font_size,
        }
    }

    /// Rebuild a stroke from its wire form. The wire carries no id, so
    /// the stroke gets a fresh local one. An unrecognized `strokeType`
    /// falls back to a pen stroke.
    pub fn from_wire(wire: WireStroke) -> Self {
        let kind = match wire.stroke_type.as_str() {
            "polygon" => StrokeKind::Polygon {
                sides: wire.sides.unwrap_or(3),
                filled: wire.filled.unwrap_or(false),
            },
            "text" => StrokeKind::Text {
                content: wire.text.unwrap_or_default(),
                font_size: wire.font_size.unwrap_or(16.0),
            },
            "pen" => StrokeKind::Pen,
            other => {
                log::debug!("unrecognized stroke type {other:?}, treating as pen");
                StrokeKind::Pen
            }
        };
        Self {
            id: Uuid::new_v4(),
            points: wire.points.iter().map(|[x, y]| Point::new(*x, *y)).collect(),
            color: Color32::from_argb_u32(wire.color),
            width: wire.size,
            opacity: wire.opacity,
            kind,
        }
    }
}

/// Serialized stroke as carried inside `stroke` envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireStroke {
    pub points: Vec<[f64; 2]>,
    pub color: u32,
    pub size: f64,
    pub opacity: f64,
    pub stroke_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sides: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}
