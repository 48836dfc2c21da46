//! Spatial indexing utilities.
//!
//! A uniform grid rebuilt from scratch every tick; queries are answered by
//! bounding box, not by exact distance.

mod grid;

pub use grid::{CellKey, SpatialGrid};
