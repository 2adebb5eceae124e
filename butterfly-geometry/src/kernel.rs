//! Vector math, orientation and area, segment intersection, tile rectangles.

use std::ops::{Add, Mul, Sub};

use butterfly_common::{Error, Result};

/// Tolerance band applied to segment parameters when deciding whether an
/// intersection lies on both segments. Wider than `f64::EPSILON` so that a
/// vertex lying on a tile border still yields its crossing after rounding.
pub const PARAM_TOLERANCE: f64 = 1e-10;

/// 2D vector, `x` is longitude and `y` latitude.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product.
    pub fn cross(self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f64 {
        (other - self).length()
    }

    /// Distance from `self` to the infinite line through `a` and `b`.
    ///
    /// Falls back to the point distance when `a == b`.
    pub fn perpendicular_distance(self, a: Vec2, b: Vec2) -> f64 {
        let ab = b - a;
        let len = ab.length();
        if len == 0.0 {
            return self.distance(a);
        }
        (ab.cross(self - a)).abs() / len
    }

    pub fn homogeneous(self) -> Vec3 {
        Vec3::new(self.x, self.y, 1.0)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// 3D vector, used for homogeneous line/point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Anything carrying a position that the clipper and merger can move around.
pub trait Vertex: Clone {
    fn lat(&self) -> f64;
    fn lon(&self) -> f64;

    /// A vertex created by the geometry code, e.g. a tile-border crossing.
    fn synthetic(lat: f64, lon: f64) -> Self;

    fn is_synthetic(&self) -> bool {
        false
    }

    fn pos(&self) -> Vec2 {
        Vec2::new(self.lon(), self.lat())
    }
}

impl Vertex for Vec2 {
    fn lat(&self) -> f64 {
        self.y
    }
    fn lon(&self) -> f64 {
        self.x
    }
    fn synthetic(lat: f64, lon: f64) -> Self {
        Vec2::new(lon, lat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Left,
    Right,
    Colinear,
}

/// Side of the directed line `a -> b` that `c` lies on.
pub fn orientation(a: Vec2, b: Vec2, c: Vec2) -> Orientation {
    let turn = (b - a).cross(c - a);
    if turn > 0.0 {
        Orientation::Left
    } else if turn < 0.0 {
        Orientation::Right
    } else {
        Orientation::Colinear
    }
}

pub fn triangle_area(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    0.5 * (b - a).cross(c - a).abs()
}

/// Shoelace signed area, positive for counter-clockwise rings.
///
/// Works on open or closed rings; a repeated closing point adds nothing.
pub fn signed_area(ring: &[Vec2]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a.cross(b);
    }
    sum / 2.0
}

pub fn polygon_area(ring: &[Vec2]) -> f64 {
    signed_area(ring).abs()
}

pub fn is_counter_clockwise(ring: &[Vec2]) -> bool {
    signed_area(ring) > 0.0
}

/// Intersection point of segments `p1p2` and `q1q2`.
///
/// Both lines are taken in homogeneous form; parallel lines (`z == 0`) and
/// intersections outside either segment give `None`.
pub fn segment_intersection(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2) -> Option<Vec2> {
    let l1 = p1.homogeneous().cross(p2.homogeneous());
    let l2 = q1.homogeneous().cross(q2.homogeneous());
    let cut = l1.cross(l2);
    if cut.z == 0.0 {
        return None;
    }
    let at = Vec2::new(cut.x / cut.z, cut.y / cut.z);

    let within = |lambda: f64| (-PARAM_TOLERANCE..=1.0 + PARAM_TOLERANCE).contains(&lambda);
    if within(parameter(p1, p2, at)) && within(parameter(q1, q2, at)) {
        Some(at)
    } else {
        None
    }
}

/// Position of `at` along `a -> b`, measured on the dominant axis.
fn parameter(a: Vec2, b: Vec2, at: Vec2) -> f64 {
    let d = b - a;
    if d.x.abs() >= d.y.abs() {
        (at.x - a.x) / d.x
    } else {
        (at.y - a.y) / d.y
    }
}

/// Edge of a tile rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Axis-aligned lat/lon rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BBox {
    pub const WORLD: BBox = BBox {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };

    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Inclusive on all four borders.
    pub fn contains(&self, p: Vec2) -> bool {
        p.y >= self.min_lat && p.y <= self.max_lat && p.x >= self.min_lon && p.x <= self.max_lon
    }

    /// Edges an outside point could reach the rectangle through: one when it
    /// lies beside a side, two when it lies in a corner region.
    pub fn facing_edges(&self, p: Vec2) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(2);
        if p.y > self.max_lat {
            edges.push(Edge::Top);
        } else if p.y < self.min_lat {
            edges.push(Edge::Bottom);
        }
        if p.x < self.min_lon {
            edges.push(Edge::Left);
        } else if p.x > self.max_lon {
            edges.push(Edge::Right);
        }
        edges
    }

    pub fn edge(&self, edge: Edge) -> (Vec2, Vec2) {
        match edge {
            Edge::Top => (
                Vec2::new(self.min_lon, self.max_lat),
                Vec2::new(self.max_lon, self.max_lat),
            ),
            Edge::Bottom => (
                Vec2::new(self.min_lon, self.min_lat),
                Vec2::new(self.max_lon, self.min_lat),
            ),
            Edge::Left => (
                Vec2::new(self.min_lon, self.min_lat),
                Vec2::new(self.min_lon, self.max_lat),
            ),
            Edge::Right => (
                Vec2::new(self.max_lon, self.min_lat),
                Vec2::new(self.max_lon, self.max_lat),
            ),
        }
    }

    /// Point where the segment from `inside` to `outside` leaves the rectangle.
    pub fn border_crossing(&self, inside: Vec2, outside: Vec2) -> Result<Vec2> {
        for edge in self.facing_edges(outside) {
            let (a, b) = self.edge(edge);
            if let Some(at) = segment_intersection(inside, outside, a, b) {
                return Ok(at);
            }
        }
        Err(Error::LogicError(format!(
            "segment ({}, {}) -> ({}, {}) does not cross tile {self:?}",
            inside.y, inside.x, outside.y, outside.x
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_products() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(x.cross(y), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(Vec2::new(1.0, 0.0).cross(Vec2::new(0.0, 1.0)), 1.0);
    }

    #[test]
    fn perpendicular_distance_to_line() {
        let p = Vec2::new(1.0, 2.0);
        let d = p.perpendicular_distance(Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0));
        assert!((d - 2.0).abs() < 1e-12);
        // degenerate line
        let d = p.perpendicular_distance(Vec2::new(1.0, 0.0), Vec2::new(1.0, 0.0));
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn orientation_and_area() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(1.0, 0.0);
        assert_eq!(orientation(a, b, Vec2::new(0.5, 1.0)), Orientation::Left);
        assert_eq!(orientation(a, b, Vec2::new(0.5, -1.0)), Orientation::Right);
        assert_eq!(orientation(a, b, Vec2::new(2.0, 0.0)), Orientation::Colinear);
        assert!((triangle_area(a, b, Vec2::new(0.0, 2.0)) - 1.0).abs() < 1e-12);

        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(0.0, 0.0),
        ];
        assert!((signed_area(&square) - 4.0).abs() < 1e-12);
        assert!(is_counter_clockwise(&square));
        let mut reversed = square;
        reversed.reverse();
        assert!((signed_area(&reversed) + 4.0).abs() < 1e-12);
        assert_eq!(polygon_area(&reversed), 4.0);
    }

    #[test]
    fn crossing_segments_intersect() {
        let at = segment_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(2.0, 0.0),
        )
        .unwrap();
        assert!((at.x - 1.0).abs() < 1e-12 && (at.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn parallel_and_disjoint_segments_do_not() {
        assert!(segment_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
        )
        .is_none());
        // lines cross at (3, 3), outside the first segment
        assert!(segment_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 6.0),
            Vec2::new(6.0, 0.0),
        )
        .is_none());
    }

    #[test]
    fn touching_endpoint_counts() {
        let at = segment_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
        );
        assert_eq!(at, Some(Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn endpoint_on_a_border_survives_rounding() {
        for k in 1..50 {
            let x = k as f64 * 0.1 + 0.03;
            let end = Vec2::new(x, 0.2 + 0.01 * k as f64);
            let at = segment_intersection(
                Vec2::new(x - 0.37, 0.2),
                end,
                Vec2::new(x, -1.0),
                Vec2::new(x, 5.0),
            );
            let at = at.unwrap_or_else(|| panic!("no crossing at x = {x}"));
            assert!((at.x - x).abs() < 1e-12);
            assert!((at.y - end.y).abs() < 1e-12);
        }
    }

    #[test]
    fn bbox_is_inclusive() {
        let tile = BBox::new(0.0, 1.0, 0.0, 1.0);
        assert!(tile.contains(Vec2::new(0.0, 0.0)));
        assert!(tile.contains(Vec2::new(1.0, 1.0)));
        assert!(!tile.contains(Vec2::new(1.0 + 1e-9, 0.5)));
    }

    #[test]
    fn facing_edges_for_sides_and_corners() {
        let tile = BBox::new(0.0, 1.0, 0.0, 1.0);
        assert_eq!(tile.facing_edges(Vec2::new(0.5, 2.0)), vec![Edge::Top]);
        assert_eq!(tile.facing_edges(Vec2::new(-1.0, -1.0)), vec![Edge::Bottom, Edge::Left]);
        assert!(tile.facing_edges(Vec2::new(0.5, 0.5)).is_empty());
    }

    #[test]
    fn border_crossing_through_corner_region() {
        let tile = BBox::new(0.0, 1.0, 0.0, 1.0);
        // leaves through the right edge although the outside point is top-right
        let at = tile
            .border_crossing(Vec2::new(0.5, 0.5), Vec2::new(2.0, 1.25))
            .unwrap();
        assert!((at.x - 1.0).abs() < 1e-12);
        assert!((at.y - 0.75).abs() < 1e-12);
    }

    #[test]
    fn missing_crossing_is_logic_error() {
        let tile = BBox::new(0.0, 1.0, 0.0, 1.0);
        let err = tile
            .border_crossing(Vec2::new(5.0, 5.0), Vec2::new(6.0, 6.0))
            .unwrap_err();
        assert!(matches!(err, Error::LogicError(_)));
    }
}
