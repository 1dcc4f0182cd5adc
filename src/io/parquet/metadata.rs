use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::str::FromStr;

use parquet::file::metadata::FileMetaData;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExportError, Result};
use crate::schema::GeometryKind;

/// The GeoParquet version written to the `geo` metadata key.
pub const GEOPARQUET_VERSION: &str = "1.1.0";

/// The encoding of the geometry column. Only WKB is written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum GeoParquetColumnEncoding {
    WKB,
}

/// Geometry types that are valid to write to GeoParquet 1.1
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeoParquetGeometryType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl From<GeometryKind> for GeoParquetGeometryType {
    fn from(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::Point => Self::Point,
            GeometryKind::LineString => Self::LineString,
            GeometryKind::Polygon => Self::Polygon,
            GeometryKind::MultiPoint => Self::MultiPoint,
            GeometryKind::MultiLineString => Self::MultiLineString,
            GeometryKind::MultiPolygon => Self::MultiPolygon,
            GeometryKind::GeometryCollection => Self::GeometryCollection,
        }
    }
}

impl FromStr for GeoParquetGeometryType {
    type Err = ExportError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let out = match s {
            "Point" => Self::Point,
            "LineString" => Self::LineString,
            "Polygon" => Self::Polygon,
            "MultiPoint" => Self::MultiPoint,
            "MultiLineString" => Self::MultiLineString,
            "MultiPolygon" => Self::MultiPolygon,
            "GeometryCollection" => Self::GeometryCollection,
            other => {
                return Err(ExportError::General(format!(
                    "Unknown value for geometry_type: {other}"
                )))
            }
        };
        Ok(out)
    }
}

impl Display for GeoParquetGeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Point => GeometryKind::Point,
            Self::LineString => GeometryKind::LineString,
            Self::Polygon => GeometryKind::Polygon,
            Self::MultiPoint => GeometryKind::MultiPoint,
            Self::MultiLineString => GeometryKind::MultiLineString,
            Self::MultiPolygon => GeometryKind::MultiPolygon,
            Self::GeometryCollection => GeometryKind::GeometryCollection,
        };
        write!(f, "{}", kind.as_str())
    }
}

/// Top-level GeoParquet file metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeoParquetMetadata {
    /// The version identifier for the GeoParquet specification.
    pub version: String,

    /// The name of the "primary" geometry column.
    pub primary_column: String,

    /// Metadata about geometry columns. Each key is the name of a geometry column in the table.
    pub columns: HashMap<String, GeoParquetColumnMetadata>,
}

/// GeoParquet column metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeoParquetColumnMetadata {
    /// Name of the geometry encoding format.
    pub encoding: GeoParquetColumnEncoding,

    /// The geometry types of all geometries, or an empty array if they are not known.
    ///
    /// A list of multiple values indicates that multiple geometry types are present (e.g.
    /// `["Polygon", "MultiPolygon"]`). The list must be strictly correct: a column holding both
    /// polygons and multipolygons lists both.
    pub geometry_types: HashSet<GeoParquetGeometryType>,

    /// [PROJJSON](https://proj.org/specifications/projjson.html) object representing the
    /// Coordinate Reference System (CRS) of the geometry. If the field is not provided, the
    /// default CRS is [OGC:CRS84](https://www.opengis.net/def/crs/OGC/1.3/CRS84), which means the
    /// data in this column must be stored in longitude, latitude based on the WGS84 datum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crs: Option<Value>,

    /// Name of the coordinate system for the edges. Must be one of `"planar"` or `"spherical"`.
    /// The default value is `"planar"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges: Option<String>,

    /// Bounding Box of the geometries in the file, formatted according to RFC 7946, section 5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
}

impl GeoParquetMetadata {
    /// Construct a [`GeoParquetMetadata`] from Parquet [`FileMetaData`]
    pub fn from_parquet_meta(metadata: &FileMetaData) -> Result<Self> {
        let kv_metadata = metadata.key_value_metadata();

        if let Some(metadata) = kv_metadata {
            for kv in metadata {
                if kv.key == "geo" {
                    if let Some(value) = &kv.value {
                        return Ok(serde_json::from_str(value)?);
                    }
                }
            }
        }

        Err(ExportError::General(
            "expected a 'geo' key in GeoParquet metadata".to_string(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn geometry_type_names() {
        assert_eq!(
            serde_json::to_string(&GeoParquetGeometryType::MultiPolygon).unwrap(),
            "\"MultiPolygon\""
        );
        assert_eq!(
            "LineString".parse::<GeoParquetGeometryType>().unwrap(),
            GeoParquetGeometryType::LineString
        );
        assert_eq!(GeoParquetGeometryType::Point.to_string(), "Point");
        assert!("Point Z".parse::<GeoParquetGeometryType>().is_err());
    }
}
