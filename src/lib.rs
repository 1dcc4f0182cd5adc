//! Streaming export of geospatial feature cursors to GeoJSON, WKT, WKB,
//! [FlatGeobuf](https://flatgeobuf.org/), [GeoParquet](https://geoparquet.org/), shapefiles and
//! Esri JSON.
//!
//! An [`ExportEngine`] pulls [`FeatureRecord`]s from a [`FeatureCursor`] one at a time, projects
//! them onto the selected fields, reprojects their geometries, conforms their values to the
//! declared field types and hands them to a fresh encoder for the requested [`ExportFormat`].
//! Encoded output is written to any [`tokio::io::AsyncWrite`] sink as it is produced.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub use crs::Crs;
pub use error::{ExportError, Result};
pub use export::{
    ExportConfig, ExportEngine, ExportFormat, ExportOutcome, FeatureCursor, PipelineState,
    StreamCursor, StreamingExportRequest,
};
pub use record::{AttributeValue, FeatureId, FeatureRecord};
pub use schema::{FieldDef, FieldSchema, FieldType, GeometryKind};

pub mod algorithm;
pub mod crs;
pub mod error;
pub mod export;
pub mod io;
pub mod record;
pub mod schema;
#[cfg(test)]
pub(crate) mod test;
pub mod value;
