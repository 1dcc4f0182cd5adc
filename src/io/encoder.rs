//! The capability set shared by every output encoding.

use std::fs::File;
use std::io::{Seek, SeekFrom};

use geo::{CoordsIter, Geometry};

use crate::error::{ExportError, Result};
use crate::export::{ExportConfig, ExportFormat};
use crate::schema::{ProjectedRecord, ProjectedSchema};

/// Totals known to the orchestrator when an export ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub records_written: u64,
    /// Whether the transfer limit cut the output short.
    pub truncated: bool,
    /// The cursor's count hint, when it reported one.
    pub number_matched: Option<u64>,
}

/// A finished container in a temporary file, streamed to the sink after
/// [`FeatureEncoder::finish`].
///
/// Used by encodings whose container cannot be produced front to back.
#[derive(Debug)]
pub struct Spool {
    file: File,
    len: u64,
}

impl Spool {
    /// Takes a file holding the complete output and rewinds it.
    pub fn new(mut file: File) -> Result<Self> {
        let len = file.seek(SeekFrom::End(0))?;
        file.rewind()?;
        Ok(Self { file, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

/// Run `f` against `out`, rolling `out` back to its previous length if `f` fails.
pub(crate) fn append_record(
    out: &mut Vec<u8>,
    f: impl FnOnce(&mut Vec<u8>) -> Result<()>,
) -> Result<()> {
    let start = out.len();
    let result = f(out);
    if result.is_err() {
        out.truncate(start);
    }
    result
}

/// Text encodings have no spelling for NaN or infinity, so such a record is skipped.
pub(crate) fn ensure_finite(geometry: &Geometry<f64>) -> Result<()> {
    match geometry
        .coords_iter()
        .find(|coord| !(coord.x.is_finite() && coord.y.is_finite()))
    {
        Some(coord) => Err(ExportError::RecordSkipped(format!(
            "non-finite coordinate ({}, {})",
            coord.x, coord.y
        ))),
        None => Ok(()),
    }
}

/// One output encoding, instantiated fresh for every export.
///
/// Encoders never touch the sink. They append encoded bytes to the buffer handed in by the
/// orchestrator, which owns every sink write, byte count and cancellation check. A record is
/// either fully appended or, on error, not at all.
pub trait FeatureEncoder: Send {
    /// Called once, before the first record.
    fn begin(&mut self, out: &mut Vec<u8>) -> Result<()>;

    /// Encode one projected, reprojected and conformed record.
    ///
    /// Errors for which [`ExportError::is_record_recoverable`] holds skip the record.
    fn encode(&mut self, record: &ProjectedRecord, out: &mut Vec<u8>) -> Result<()>;

    /// Close the output after the last record. Encoders that assemble a container off to the
    /// side return it as a [`Spool`], written to the sink after `out`.
    fn finish(&mut self, summary: &ExportSummary, out: &mut Vec<u8>) -> Result<Option<Spool>>;

    /// Called instead of [`finish`](Self::finish) when the export is cancelled. May append
    /// whatever is safe to emit; the output is incomplete either way.
    fn abort(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    /// Whether `finish` performs blocking file I/O and must run off the async executor.
    fn spools(&self) -> bool {
        false
    }
}

/// Creates the encoder for one export.
pub trait EncoderFactory: Send + Sync {
    fn create(
        &self,
        format: &ExportFormat,
        schema: &ProjectedSchema,
        config: &ExportConfig,
    ) -> Result<Box<dyn FeatureEncoder>>;
}

/// The encoders of this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEncoderFactory;

impl EncoderFactory for DefaultEncoderFactory {
    fn create(
        &self,
        format: &ExportFormat,
        schema: &ProjectedSchema,
        config: &ExportConfig,
    ) -> Result<Box<dyn FeatureEncoder>> {
        use crate::io::{esri, geojson, geojson_lines, wkb, wkt};

        let encoder: Box<dyn FeatureEncoder> = match format {
            ExportFormat::GeoJson => Box::new(geojson::GeoJsonEncoder::new(schema.clone())),
            ExportFormat::GeoJsonSeq => {
                Box::new(geojson_lines::GeoJsonLinesEncoder::sequence(schema.clone()))
            }
            ExportFormat::GeoJsonLines => {
                Box::new(geojson_lines::GeoJsonLinesEncoder::lines(schema.clone()))
            }
            ExportFormat::Wkt(layout) => Box::new(wkt::WktEncoder::new(*layout, schema.clone())),
            ExportFormat::Wkb(layout) => Box::new(wkb::WkbEncoder::new(*layout, schema.clone())),
            ExportFormat::EsriJson => Box::new(esri::EsriJsonEncoder::new(schema.clone())),
            ExportFormat::IdsOnly => Box::new(esri::IdsOnlyEncoder::new(schema.clone())),
            ExportFormat::CountOnly => Box::new(esri::CountOnlyEncoder),
            #[cfg(feature = "flatgeobuf")]
            ExportFormat::FlatGeobuf => Box::new(crate::io::flatgeobuf::FlatGeobufEncoder::try_new(
                schema,
                &config.layer_name,
                &config.flatgeobuf,
            )?),
            #[cfg(feature = "parquet")]
            ExportFormat::GeoParquet => Box::new(crate::io::parquet::GeoParquetEncoder::try_new(
                schema,
                &config.parquet,
            )?),
            #[cfg(feature = "shp")]
            ExportFormat::Shapefile => Box::new(crate::io::shapefile::ShapefileEncoder::try_new(
                schema,
                &config.layer_name,
            )?),
            #[allow(unreachable_patterns)]
            format => {
                return Err(ExportError::InvalidConfiguration(format!(
                    "{} output is not enabled in this build",
                    format.name()
                )))
            }
        };
        Ok(encoder)
    }
}
