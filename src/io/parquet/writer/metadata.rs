use std::collections::{HashMap, HashSet};

use geo::Geometry;
use serde_json::Value;

use crate::algorithm::bounding_rect::BoundingRect;
use crate::io::parquet::metadata::{
    GeoParquetColumnEncoding, GeoParquetColumnMetadata, GeoParquetGeometryType, GeoParquetMetadata,
    GEOPARQUET_VERSION,
};
use crate::schema::GeometryKind;

/// Information for the geometry column being written to Parquet, accumulated while streaming.
#[derive(Debug)]
pub struct ColumnInfo {
    /// The name of this geometry column
    pub name: String,

    /// The serialized encoding for this geometry column.
    pub encoding: GeoParquetColumnEncoding,

    /// The set of geometry types seen in this geometry column
    pub geometry_types: HashSet<GeoParquetGeometryType>,

    /// The bounding box of this column.
    pub bbox: BoundingRect,

    /// The PROJJSON CRS for this geometry column.
    pub crs: Option<Value>,
}

impl ColumnInfo {
    pub fn new(name: String, crs: Option<Value>) -> Self {
        Self {
            name,
            encoding: GeoParquetColumnEncoding::WKB,
            geometry_types: HashSet::new(),
            bbox: BoundingRect::new(),
            crs,
        }
    }

    /// Record the bounds and the type of one written geometry.
    pub fn add_geometry(&mut self, geometry: &Geometry<f64>) {
        self.geometry_types
            .insert(GeometryKind::of(geometry).into());
        self.bbox.add_geometry(geometry);
    }

    /// Returns (column_name, column_metadata)
    pub fn finish(self) -> (String, GeoParquetColumnMetadata) {
        // An empty column has no meaningful extent.
        let bbox = (!self.bbox.is_empty()).then(|| {
            vec![
                self.bbox.minx(),
                self.bbox.miny(),
                self.bbox.maxx(),
                self.bbox.maxy(),
            ]
        });
        let column_meta = GeoParquetColumnMetadata {
            encoding: self.encoding,
            geometry_types: self.geometry_types,
            crs: self.crs,
            bbox,
            edges: None,
        };
        (self.name, column_meta)
    }
}

pub fn build_metadata(column: ColumnInfo) -> GeoParquetMetadata {
    let (primary_column, column_meta) = column.finish();
    let mut columns = HashMap::with_capacity(1);
    columns.insert(primary_column.clone(), column_meta);
    GeoParquetMetadata {
        version: GEOPARQUET_VERSION.to_string(),
        primary_column,
        columns,
    }
}
