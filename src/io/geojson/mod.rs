//! Write [GeoJSON](https://geojson.org/) feature collections.

pub use writer::GeoJsonEncoder;

pub(crate) mod encode;
mod writer;
