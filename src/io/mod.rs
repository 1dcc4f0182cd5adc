//! Encoders for the supported output formats.
//!
//! Every format implements [`FeatureEncoder`]; [`DefaultEncoderFactory`] builds the encoder for an
//! [`ExportFormat`](crate::export::ExportFormat).

pub mod encoder;
pub mod esri;
#[cfg(feature = "flatgeobuf")]
pub mod flatgeobuf;
pub mod geojson;
pub mod geojson_lines;
#[cfg(feature = "parquet")]
pub mod parquet;
#[cfg(feature = "shp")]
pub mod shapefile;
pub mod wkb;
pub mod wkt;

pub use encoder::{DefaultEncoderFactory, EncoderFactory, ExportSummary, FeatureEncoder, Spool};
