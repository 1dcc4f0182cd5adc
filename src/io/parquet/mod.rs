//! Write the [GeoParquet](https://github.com/opengeospatial/geoparquet) format.

mod metadata;
mod writer;

pub use metadata::{
    GeoParquetColumnEncoding, GeoParquetColumnMetadata, GeoParquetGeometryType, GeoParquetMetadata,
    GEOPARQUET_VERSION,
};
pub use writer::{GeoParquetEncoder, GEOMETRY_COLUMN};
