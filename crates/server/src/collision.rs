//! Circular obstacle checks used by movement admission.
//!
//! There is no physics here: obstacles only decide whether a requested
//! position is accepted.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// A static circular blocker on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Obstacle {
    pub x: f64,
    pub z: f64,
    pub radius: f64,
}

impl Obstacle {
    pub const fn new(x: f64, z: f64, radius: f64) -> Self {
        Self { x, z, radius }
    }

    #[inline]
    pub fn center(&self) -> DVec2 {
        DVec2::new(self.x, self.z)
    }

    /// Whether a point lies strictly inside `radius + margin`.
    #[inline]
    pub fn blocks(&self, x: f64, z: f64, margin: f64) -> bool {
        DVec2::new(x, z).distance(self.center()) < self.radius + margin
    }
}

/// First obstacle blocking the point, if any.
#[inline]
pub fn find_blocking(obstacles: &[Obstacle], x: f64, z: f64, margin: f64) -> Option<&Obstacle> {
    obstacles.iter().find(|o| o.blocks(x, z, margin))
}
