use std::ops::{Add, AddAssign, Mul, Sub};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Velocity of `speed` pointing at `degrees`, measured from +x toward +y (screen down).
    pub fn from_angle_degrees(degrees: f32, speed: f32) -> Self {
        let radians = degrees.to_radians();
        Self {
            x: radians.cos() * speed,
            y: radians.sin() * speed,
        }
    }

    pub fn angle_degrees(self) -> f32 {
        self.y.atan2(self.x).to_degrees()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned box in world pixels, top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn from_rect(position: Vec2, size: Vec2) -> Self {
        Self {
            min: position,
            max: position + size,
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    /// Shared edges do not count as overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        !(other.max.x <= self.min.x
            || self.max.x <= other.min.x
            || other.max.y <= self.min.y
            || self.max.y <= other.min.y)
    }

    /// Same center, extents multiplied per axis.
    pub fn scaled_about_center(&self, factor: Vec2) -> Self {
        let center = self.center();
        let half = Vec2::new(self.width() * factor.x * 0.5, self.height() * factor.y * 0.5);
        Self {
            min: center - half,
            max: center + half,
        }
    }
}
