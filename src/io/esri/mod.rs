//! Write the JSON dialect of Esri feature services: full feature sets and id-only responses.

mod geometry;
mod writer;

pub use geometry::{esri_geometry_type, to_esri_geometry};
pub use writer::{CountOnlyEncoder, EsriJsonEncoder, IdsOnlyEncoder};
