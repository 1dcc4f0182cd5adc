use serde::{Deserialize, Serialize};

/// Compression applied to GeoParquet column chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    #[default]
    Uncompressed,
    /// Requires the `parquet_compression` feature.
    Snappy,
    /// Requires the `parquet_compression` feature.
    Zstd,
}

/// Options for writing GeoParquet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoParquetOptions {
    /// Rows per row group. Clamped to `1..=65536`.
    pub batch_size: usize,
    pub compression: ParquetCompression,
}

impl GeoParquetOptions {
    pub const MAX_BATCH_SIZE: usize = 65536;

    pub fn batch_size(&self) -> usize {
        self.batch_size.clamp(1, Self::MAX_BATCH_SIZE)
    }
}

impl Default for GeoParquetOptions {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            compression: ParquetCompression::default(),
        }
    }
}

/// Options for writing FlatGeobuf
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatGeobufOptions {
    /// Dataset title written to the header.
    pub title: Option<String>,
    /// Dataset description written to the header.
    pub description: Option<String>,
}

/// Engine-wide tunables, shared by every export an [`ExportEngine`](super::ExportEngine) runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Bytes of encoded output buffered before they are written to the sink.
    pub flush_threshold: usize,
    /// Size of the chunks in which spooled containers are copied to the sink.
    pub spool_chunk_size: usize,
    /// Layer name for FlatGeobuf headers and the member names of shapefile archives.
    pub layer_name: String,
    pub parquet: GeoParquetOptions,
    pub flatgeobuf: FlatGeobufOptions,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 64 * 1024,
            spool_chunk_size: 64 * 1024,
            layer_name: "features".to_string(),
            parquet: GeoParquetOptions::default(),
            flatgeobuf: FlatGeobufOptions::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: ExportConfig = serde_json::from_str(
            r#"{"flush_threshold": 1024, "parquet": {"compression": "zstd", "batch_size": 0}}"#,
        )
        .unwrap();
        assert_eq!(config.flush_threshold, 1024);
        assert_eq!(config.spool_chunk_size, 64 * 1024);
        assert_eq!(config.layer_name, "features");
        assert_eq!(config.parquet.compression, ParquetCompression::Zstd);
        assert_eq!(config.parquet.batch_size(), 1);
        assert_eq!(config.flatgeobuf, FlatGeobufOptions::default());
    }
}
