mod encode;
mod metadata;

use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::export::{GeoParquetOptions, ParquetCompression};
use crate::io::encoder::{ExportSummary, FeatureEncoder, Spool};
use crate::io::wkb::to_wkb;
use crate::schema::{ProjectedRecord, ProjectedSchema};

pub use encode::GEOMETRY_COLUMN;
use encode::{output_schema, BatchBuilder};
use metadata::{build_metadata, ColumnInfo};

fn compression(compression: ParquetCompression) -> Result<Compression> {
    if compression != ParquetCompression::Uncompressed && !cfg!(feature = "parquet_compression") {
        return Err(ExportError::InvalidConfiguration(format!(
            "{compression:?} compression requires the parquet_compression feature"
        )));
    }
    Ok(match compression {
        ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
    })
}

/// Writes GeoParquet 1.1 with a single WKB `geometry` column.
///
/// Records are buffered into Arrow builders and written as one row group per `batch_size`
/// records. The Parquet footer, which carries the `geo` metadata with the accumulated bounding
/// box and geometry types, is written by [`finish`](FeatureEncoder::finish).
pub struct GeoParquetEncoder {
    writer: Option<ArrowWriter<Vec<u8>>>,
    batch: BatchBuilder,
    column: Option<ColumnInfo>,
}

impl GeoParquetEncoder {
    pub fn try_new(schema: &ProjectedSchema, options: &GeoParquetOptions) -> Result<Self> {
        let arrow_schema = output_schema(schema)?;
        let batch_size = options.batch_size();
        let props = WriterProperties::builder()
            .set_compression(compression(options.compression)?)
            .set_max_row_group_size(batch_size)
            .build();
        let writer = ArrowWriter::try_new(Vec::new(), arrow_schema.clone(), Some(props))?;
        let crs = schema.crs.as_ref().and_then(|crs| crs.to_projjson());

        Ok(Self {
            writer: Some(writer),
            batch: BatchBuilder::new(schema, arrow_schema, batch_size),
            column: Some(ColumnInfo::new(GEOMETRY_COLUMN.to_string(), crs)),
        })
    }

    fn writer(&mut self) -> Result<&mut ArrowWriter<Vec<u8>>> {
        self.writer
            .as_mut()
            .ok_or_else(|| ExportError::General("GeoParquet writer already closed".to_string()))
    }

    /// Write the buffered rows as a row group and move the encoded bytes to `out`.
    fn flush_batch(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let rows = self.batch.len();
        let batch = self.batch.finish()?;
        let writer = self.writer()?;
        writer.write(&batch)?;
        writer.flush()?;
        out.append(writer.inner_mut());
        debug!(rows, "wrote GeoParquet row group");
        Ok(())
    }
}

impl std::fmt::Debug for GeoParquetEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoParquetEncoder")
            .field("buffered", &self.batch.len())
            .finish_non_exhaustive()
    }
}

impl FeatureEncoder for GeoParquetEncoder {
    fn begin(&mut self, out: &mut Vec<u8>) -> Result<()> {
        // The leading magic bytes.
        out.append(self.writer()?.inner_mut());
        Ok(())
    }

    fn encode(&mut self, record: &ProjectedRecord, out: &mut Vec<u8>) -> Result<()> {
        let wkb = to_wkb(&record.geometry)?;
        self.batch.append(record, &wkb)?;
        if let Some(column) = self.column.as_mut() {
            column.add_geometry(&record.geometry);
        }
        if self.batch.is_full() {
            self.flush_batch(out)?;
        }
        Ok(())
    }

    fn finish(&mut self, _summary: &ExportSummary, out: &mut Vec<u8>) -> Result<Option<Spool>> {
        self.flush_batch(out)?;

        let column = self
            .column
            .take()
            .ok_or_else(|| ExportError::General("GeoParquet writer already closed".to_string()))?;
        let geo_meta = build_metadata(column);
        let kv_metadata = KeyValue::new("geo".to_string(), serde_json::to_string(&geo_meta)?);

        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| ExportError::General("GeoParquet writer already closed".to_string()))?;
        writer.append_key_value_metadata(kv_metadata);
        let mut footer = writer.into_inner()?;
        out.append(&mut footer);
        Ok(None)
    }
}
