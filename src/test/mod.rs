use std::io::Read;

use crate::export::{ExportConfig, ExportFormat, StreamingExportRequest};
use crate::io::encoder::{DefaultEncoderFactory, EncoderFactory, ExportSummary};
use crate::record::FeatureRecord;
use crate::schema::FieldSchema;
use crate::value::ValueMapper;

pub(crate) mod linestring;
pub(crate) mod multipoint;
pub(crate) mod polygon;
pub(crate) mod properties;

/// Run `records` through projection, value mapping and the encoder for `format`, without a
/// sink. Records the encoder rejects are left out of the summary.
pub(crate) fn encode_all(
    format: ExportFormat,
    schema: &FieldSchema,
    selected: &[String],
    records: Vec<FeatureRecord>,
) -> (Vec<u8>, ExportSummary) {
    let request =
        StreamingExportRequest::new(format).with_selected_fields(selected.iter().cloned());
    let projection = request.projection(schema).unwrap();
    let mut encoder = DefaultEncoderFactory
        .create(&format, projection.schema(), &ExportConfig::default())
        .unwrap();

    let mut out = vec![];
    let mut summary = ExportSummary::default();
    encoder.begin(&mut out).unwrap();
    for record in records {
        let mut projected = projection.project(record);
        ValueMapper.conform(&mut projected, projection.schema());
        match encoder.encode(&projected, &mut out) {
            Ok(()) => summary.records_written += 1,
            Err(err) if err.is_record_recoverable() => {}
            Err(err) => panic!("encoding failed: {err}"),
        }
    }
    if let Some(spool) = encoder.finish(&summary, &mut out).unwrap() {
        spool.into_file().read_to_end(&mut out).unwrap();
    }
    (out, summary)
}
