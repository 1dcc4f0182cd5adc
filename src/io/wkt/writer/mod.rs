use std::io::Write;

use wkt::ToWkt;

use crate::error::Result;
use crate::io::encoder::{append_record, ensure_finite, ExportSummary, FeatureEncoder, Spool};
use crate::io::wkt::WktLayout;
use crate::schema::{ProjectedRecord, ProjectedSchema};
use crate::value::text;

/// Writes one WKT geometry per line, or a CSV table with a WKT geometry column.
///
/// The encoder owns its WKT formatter; nothing is shared between exports.
#[derive(Debug)]
pub struct WktEncoder {
    layout: WktLayout,
    schema: ProjectedSchema,
}

impl WktEncoder {
    pub fn new(layout: WktLayout, schema: ProjectedSchema) -> Self {
        Self { layout, schema }
    }
}

impl FeatureEncoder for WktEncoder {
    fn begin(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.layout == WktLayout::WithAttributes {
            write_csv_cell(out, &self.schema.id_field);
            out.extend_from_slice(b",wkt");
            for name in self.schema.field_names() {
                out.push(b',');
                write_csv_cell(out, name);
            }
            out.extend_from_slice(b"\r\n");
        }
        Ok(())
    }

    fn encode(&mut self, record: &ProjectedRecord, out: &mut Vec<u8>) -> Result<()> {
        ensure_finite(&record.geometry)?;
        let wkt = record.geometry.wkt_string();
        append_record(out, |out| {
            match self.layout {
                WktLayout::GeometryOnly => {
                    write!(out, "{wkt}")?;
                    out.push(b'\n');
                }
                WktLayout::WithAttributes => {
                    write_csv_cell(out, &record.id.to_string());
                    out.push(b',');
                    write_csv_cell(out, &wkt);
                    for value in &record.values {
                        out.push(b',');
                        if let Some(value) = text(value) {
                            write_csv_cell(out, &value);
                        }
                    }
                    out.extend_from_slice(b"\r\n");
                }
            }
            Ok(())
        })
    }

    fn finish(&mut self, _summary: &ExportSummary, _out: &mut Vec<u8>) -> Result<Option<Spool>> {
        Ok(None)
    }
}

/// RFC 4180 quoting: cells containing a delimiter, quote or line break are quoted.
fn write_csv_cell(out: &mut Vec<u8>, cell: &str) {
    if cell.contains([',', '"', '\n', '\r']) {
        out.push(b'"');
        out.extend_from_slice(cell.replace('"', "\"\"").as_bytes());
        out.push(b'"');
    } else {
        out.extend_from_slice(cell.as_bytes());
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use geo::Geometry;

    use super::*;
    use crate::crs::Crs;
    use crate::export::ExportFormat;
    use crate::record::FeatureRecord;
    use crate::schema::{FieldSchema, GeometryKind};
    use crate::test::{encode_all, polygon, properties};

    #[test]
    fn geometry_only_lines() {
        let (output, _) = encode_all(
            ExportFormat::Wkt(WktLayout::GeometryOnly),
            &properties::schema(),
            &[],
            properties::records(),
        );
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "POINT(0 1)");

        for (line, record) in lines.iter().zip(properties::records()) {
            let parsed: Geometry<f64> = wkt::Wkt::from_str(line).unwrap().try_into().unwrap();
            assert_eq!(parsed, record.geometry);
        }
    }

    #[test]
    fn polygon_with_hole() {
        let schema = FieldSchema::new(vec![]).with_geometry_type(GeometryKind::Polygon);
        let records = vec![FeatureRecord::new(1, polygon::p1(), Crs::Crs84)];
        let (output, _) = encode_all(ExportFormat::Wkt(WktLayout::GeometryOnly), &schema, &[], records);
        let text = String::from_utf8(output).unwrap();
        let parsed: Geometry<f64> = wkt::Wkt::from_str(text.trim_end()).unwrap().try_into().unwrap();
        assert_eq!(parsed, Geometry::from(polygon::p1()));
    }

    #[test]
    fn non_finite_rows_are_skipped() {
        let mut records = properties::records();
        records.insert(0, FeatureRecord::new(7, geo::point!(x: f64::NAN, y: f64::NAN), Crs::Crs84));
        let (output, summary) = encode_all(
            ExportFormat::Wkt(WktLayout::WithAttributes),
            &properties::schema(),
            &["name".to_string()],
            records,
        );
        assert_eq!(summary.records_written, 3);
        let text = String::from_utf8(output).unwrap();
        let rows: Vec<&str> = text.split("\r\n").filter(|row| !row.is_empty()).collect();
        assert_eq!(rows, vec!["id,wkt,name", "1,POINT(0 1),alpha", "2,POINT(1 2),beta", "3,POINT(2 3),gamma"]);
    }

    #[test]
    fn csv_with_attributes() {
        let (output, _) = encode_all(
            ExportFormat::Wkt(WktLayout::WithAttributes),
            &properties::schema(),
            &["name".to_string(), "ratio".to_string()],
            properties::records(),
        );
        let text = String::from_utf8(output).unwrap();
        let rows: Vec<&str> = text.split("\r\n").filter(|row| !row.is_empty()).collect();
        assert_eq!(rows[0], "id,wkt,name,ratio");
        assert_eq!(rows[1], "1,POINT(0 1),alpha,0.5");
        assert_eq!(rows[2], "2,POINT(1 2),beta,");
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn csv_quoting() {
        let mut out = vec![];
        write_csv_cell(&mut out, "POLYGON((0 0,1 0,0 0))");
        write_csv_cell(&mut out, "say \"hi\"");
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\"POLYGON((0 0,1 0,0 0))\"\"say \"\"hi\"\"\""
        );
    }
}
