use crate::error::Result;
use crate::io::encoder::{append_record, ExportSummary, FeatureEncoder, Spool};
use crate::io::geojson::encode::write_feature;
use crate::schema::{ProjectedRecord, ProjectedSchema};

/// ASCII record separator, prefixed to every RFC 8142 text.
const RECORD_SEPARATOR: u8 = 0x1E;

/// Writes one GeoJSON `Feature` per line, optionally prefixed with the RFC 8142 record
/// separator. There is no enclosing collection, so every record stands alone.
#[derive(Debug)]
pub struct GeoJsonLinesEncoder {
    schema: ProjectedSchema,
    record_separator: bool,
}

impl GeoJsonLinesEncoder {
    /// `application/geo+json-seq`
    pub fn sequence(schema: ProjectedSchema) -> Self {
        Self {
            schema,
            record_separator: true,
        }
    }

    /// Newline-delimited GeoJSON
    pub fn lines(schema: ProjectedSchema) -> Self {
        Self {
            schema,
            record_separator: false,
        }
    }
}

impl FeatureEncoder for GeoJsonLinesEncoder {
    fn begin(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn encode(&mut self, record: &ProjectedRecord, out: &mut Vec<u8>) -> Result<()> {
        append_record(out, |out| {
            if self.record_separator {
                out.push(RECORD_SEPARATOR);
            }
            write_feature(record, &self.schema, out)?;
            out.push(b'\n');
            Ok(())
        })
    }

    fn finish(&mut self, _summary: &ExportSummary, _out: &mut Vec<u8>) -> Result<Option<Spool>> {
        Ok(None)
    }
}
