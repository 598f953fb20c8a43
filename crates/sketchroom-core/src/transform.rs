//! Affine placement of images: decomposition, hit-testing, and
//! manipulation handle geometry.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Distance of the rotation handle above the image's top edge, in
/// local (unscaled) units.
pub const ROTATE_HANDLE_OFFSET: f64 = 30.0;

/// Determinant magnitude below which a transform is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// Where an image sits on the board: its natural pixel size plus the
/// affine mapping local pixel space into world space. The affine is the
/// single source of truth; position, scale, and rotation are derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub transform: Affine,
    /// Natural size of the content in local units.
    pub size: Size,
}

impl Placement {
    /// Identity placement for content of the given natural size.
    pub fn new(size: Size) -> Self {
        Self { transform: Affine::IDENTITY, size }
    }

    pub fn with_transform(transform: Affine, size: Size) -> Self {
        Self { transform, size }
    }

    /// Translation component of the transform.
    pub fn position(&self) -> Point {
        let [_, _, _, _, e, f] = self.transform.as_coeffs();
        Point::new(e, f)
    }

    /// Length of the transformed x basis vector. Assumes uniform scale;
    /// a non-uniform scale is not distinguished from rotation plus skew.
    pub fn scale(&self) -> f64 {
        let [a, b, _, _, _, _] = self.transform.as_coeffs();
        (a * a + b * b).sqrt()
    }

    /// Rotation angle in radians, from the transformed x basis vector.
    pub fn rotation(&self) -> f64 {
        let [a, b, _, _, _, _] = self.transform.as_coeffs();
        b.atan2(a)
    }

    /// Axis-aligned rect from position and scaled size. Rotation is
    /// ignored here; the selection outline is drawn from `corners()`.
    pub fn bounds(&self) -> Rect {
        let scale = self.scale();
        Rect::from_origin_size(
            self.position(),
            Size::new(self.size.width * scale, self.size.height * scale),
        )
    }

    /// World-space corners, in top-left, top-right, bottom-right,
    /// bottom-left order.
    pub fn corners(&self) -> [Point; 4] {
        let w = self.size.width;
        let h = self.size.height;
        [
            self.transform * Point::new(0.0, 0.0),
            self.transform * Point::new(w, 0.0),
            self.transform * Point::new(w, h),
            self.transform * Point::new(0.0, h),
        ]
    }

    /// Hit-test a world-space point by inverse-transforming it into
    /// local space. A singular transform contains nothing.
    pub fn contains(&self, point: Point) -> bool {
        if self.transform.determinant().abs() < SINGULAR_EPS {
            return false;
        }
        let local = self.transform.inverse() * point;
        local.x >= 0.0 && local.x <= self.size.width && local.y >= 0.0 && local.y <= self.size.height
    }

    /// Compose a world-frame delta onto this placement. The delta is
    /// always applied on the outside, so pivots expressed in world
    /// space behave correctly under accumulated rotation and scale.
    pub fn apply_delta(&mut self, delta: Affine) {
        self.transform = delta * self.transform;
    }

    /// Manipulation handles: eight resize handles at the local corners
    /// and edge midpoints plus one rotation handle above top-center,
    /// all forward-transformed into world space so they follow rotation
    /// and scale.
    pub fn handles(&self) -> Vec<Handle> {
        let w = self.size.width;
        let h = self.size.height;
        let locals = [
            (Point::new(0.0, 0.0), HandleKind::Corner(Corner::TopLeft)),
            (Point::new(w, 0.0), HandleKind::Corner(Corner::TopRight)),
            (Point::new(0.0, h), HandleKind::Corner(Corner::BottomLeft)),
            (Point::new(w, h), HandleKind::Corner(Corner::BottomRight)),
            (Point::new(w / 2.0, 0.0), HandleKind::Edge(Edge::Top)),
            (Point::new(w, h / 2.0), HandleKind::Edge(Edge::Right)),
            (Point::new(w / 2.0, h), HandleKind::Edge(Edge::Bottom)),
            (Point::new(0.0, h / 2.0), HandleKind::Edge(Edge::Left)),
            (
                Point::new(w / 2.0, -ROTATE_HANDLE_OFFSET),
                HandleKind::Rotate,
            ),
        ];
        locals
            .into_iter()
            .map(|(p, kind)| Handle::new(self.transform * p, kind))
            .collect()
    }
}

/// World-frame delta rotating by `angle` radians around `pivot`.
pub fn rotate_about(pivot: Point, angle: f64) -> Affine {
    Affine::translate(pivot.to_vec2()) * Affine::rotate(angle) * Affine::translate(-pivot.to_vec2())
}

/// World-frame delta scaling by `factor` around `pivot`.
pub fn scale_about(pivot: Point, factor: f64) -> Affine {
    Affine::translate(pivot.to_vec2()) * Affine::scale(factor) * Affine::translate(-pivot.to_vec2())
}

/// World-frame translation delta.
pub fn translate_by(offset: Vec2) -> Affine {
    Affine::translate(offset)
}

/// Type of manipulation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Corner resize handle.
    Corner(Corner),
    /// Edge midpoint resize handle.
    Edge(Edge),
    /// Rotation handle (positioned above the image).
    Rotate,
}

/// Corner positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Edge positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

/// A manipulation handle with its world-space position.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub position: Point,
    pub kind: HandleKind,
}

impl Handle {
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    /// Check if a world-space point hits this handle.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let dx = point.x - self.position.x;
        let dy = point.y - self.position.y;
        dx * dx + dy * dy <= tolerance * tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_decomposition() {
        let mut placement = Placement::new(Size::new(100.0, 50.0));
        placement.apply_delta(Affine::rotate(FRAC_PI_2));
        placement.apply_delta(Affine::scale(2.0));
        placement.apply_delta(Affine::translate(Vec2::new(30.0, 40.0)));

        assert_close(placement.position().x, 30.0);
        assert_close(placement.position().y, 40.0);
        assert_close(placement.scale(), 2.0);
        assert_close(placement.rotation(), FRAC_PI_2);
    }

    #[test]
    fn test_bounds_ignores_rotation() {
        let mut placement = Placement::new(Size::new(10.0, 20.0));
        placement.apply_delta(Affine::scale(3.0));
        let bounds = placement.bounds();
        assert_close(bounds.width(), 30.0);
        assert_close(bounds.height(), 60.0);
    }

    #[test]
    fn test_contains_follows_rotation() {
        let mut placement = Placement::new(Size::new(100.0, 100.0));
        placement.apply_delta(rotate_about(Point::new(50.0, 50.0), FRAC_PI_2));

        // rotation around the center keeps the center inside
        assert!(placement.contains(Point::new(50.0, 50.0)));
        assert!(placement.contains(Point::new(10.0, 10.0)));
        assert!(!placement.contains(Point::new(150.0, 50.0)));
    }

    #[test]
    fn test_singular_transform_contains_nothing() {
        let placement = Placement::with_transform(
            Affine::scale_non_uniform(0.0, 1.0),
            Size::new(100.0, 100.0),
        );
        assert!(!placement.contains(Point::new(0.0, 0.0)));
        assert!(!placement.contains(Point::new(50.0, 50.0)));
    }

    #[test]
    fn test_rotate_about_fixes_pivot() {
        let pivot = Point::new(50.0, 50.0);
        let delta = rotate_about(pivot, 1.234);
        let moved = delta * pivot;
        assert_close(moved.x, pivot.x);
        assert_close(moved.y, pivot.y);
    }

    #[test]
    fn test_handles_follow_transform() {
        let mut placement = Placement::new(Size::new(100.0, 100.0));
        placement.apply_delta(rotate_about(Point::new(0.0, 0.0), FRAC_PI_2));

        let handles = placement.handles();
        assert_eq!(handles.len(), 9);

        // local (100, 0) rotates to (0, 100) around the origin
        let top_right = handles
            .iter()
            .find(|h| h.kind == HandleKind::Corner(Corner::TopRight))
            .unwrap();
        assert_close(top_right.position.x, 0.0);
        assert_close(top_right.position.y, 100.0);

        // the rotation handle sits 30 local units above top-center
        let rotate = handles.iter().find(|h| h.kind == HandleKind::Rotate).unwrap();
        assert_close(rotate.position.x, ROTATE_HANDLE_OFFSET);
        assert_close(rotate.position.y, 50.0);
    }

    #[test]
    fn test_handle_hit_test() {
        let handle = Handle::new(Point::new(10.0, 10.0), HandleKind::Rotate);
        assert!(handle.hit_test(Point::new(12.0, 11.0), 4.0));
        assert!(!handle.hit_test(Point::new(20.0, 10.0), 4.0));
    }
}
