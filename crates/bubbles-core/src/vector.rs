//! Planar vector algebra used by movement, influence, and placement.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Point or free vector in the simulation plane.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Construct a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product of two planar vectors.
    #[must_use]
    pub fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    #[must_use]
    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    /// Euclidean norm, always non-negative.
    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Unit vector with the same direction, or `None` for the zero vector.
    #[must_use]
    pub fn normalize(self) -> Option<Self> {
        let length = self.length();
        if length > 0.0 && length.is_finite() {
            Some(self * length.recip())
        } else {
            None
        }
    }

    /// Left-hand perpendicular `(-y, x)`.
    #[must_use]
    pub const fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Distance from `point` to the capsule around segment `a`–`b`.
///
/// When the projection of `point` onto the line falls inside the segment the
/// perpendicular distance competes with both endpoint distances; otherwise
/// only the endpoints count. A degenerate segment reduces to a point.
#[must_use]
pub fn segment_distance(point: Vec2, a: Vec2, b: Vec2) -> f64 {
    let along = b - a;
    let len_sq = along.length_squared();
    let offset = point - a;
    let perpendicular = if len_sq > 0.0 {
        let t = offset.dot(along) / len_sq;
        if (0.0..=1.0).contains(&t) {
            offset.cross(along).abs() / len_sq.sqrt()
        } else {
            f64::INFINITY
        }
    } else {
        f64::INFINITY
    };
    perpendicular.min(offset.length()).min(point.distance(b))
}

/// Reflect `velocity` off a surface with normal `normal`.
///
/// Velocities already heading along the normal are returned unchanged, as is
/// every velocity when the normal has zero length. Otherwise the velocity is
/// mirrored about the tangent line through `p̂⊗p̂ - n̂⊗n̂`.
#[must_use]
pub fn reflect(velocity: Vec2, normal: Vec2) -> Vec2 {
    if velocity.dot(normal) > 0.0 {
        return velocity;
    }
    let Some(n) = normal.normalize() else {
        return velocity;
    };
    let p = Vec2::new(n.y, -n.x);
    let m = [
        [p.x * p.x - n.x * n.x, p.x * p.y - n.x * n.y],
        [p.y * p.x - n.y * n.x, p.y * p.y - n.y * n.y],
    ];
    Vec2::new(
        m[0][0] * velocity.x + m[0][1] * velocity.y,
        m[1][0] * velocity.x + m[1][1] * velocity.y,
    )
}
