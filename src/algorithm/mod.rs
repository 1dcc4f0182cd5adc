//! Geometry algorithms applied to records while they stream through an export.

pub mod bounding_rect;
pub mod reproject;

pub use bounding_rect::BoundingRect;
pub use reproject::{CoordinateTransform, Reprojector, TransformFactory, TransformRegistry};
