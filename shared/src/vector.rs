use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

///Represents a vector on the arena plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching screen coordinates.
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Returns the unit vector pointing along `angle` (radians).
    pub fn from_angle(angle: f32) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    ///Returns the magnitude of the vector.
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector, or zero for a zero-length vector.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.length();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    ///Heading of the vector in radians.
    pub fn angle(&self) -> f32 {
        self.y.atan2(self.x)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    ///Shortens the vector to `max` if it is longer, keeping its direction.
    pub fn clamp_length(&self, max: f32) -> Vec2 {
        let mag = self.length();
        if mag > max {
            self.scale(max / mag)
        } else {
            *self
        }
    }

    ///Clamps each component into the given rectangle.
    pub fn clamp_to(&self, min: Vec2, max: Vec2) -> Vec2 {
        Vec2 {
            x: self.x.clamp(min.x, max.x),
            y: self.y.clamp(min.y, max.y),
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, scalar: f32) -> Vec2 {
        self.scale(scalar)
    }
}

/// Wraps an angle difference into [-PI, PI].
pub fn wrap_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}
