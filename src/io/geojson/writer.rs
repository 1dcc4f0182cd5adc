use crate::error::Result;
use crate::io::encoder::{append_record, ExportSummary, FeatureEncoder, Spool};
use crate::io::geojson::encode::write_feature;
use crate::schema::{ProjectedRecord, ProjectedSchema};

/// Writes a GeoJSON `FeatureCollection`, one feature at a time.
///
/// The collection's `numberReturned`, `numberMatched` and `truncated` members are only known at
/// the end of the export, so they follow the `features` array.
///
/// Note: Does not reproject to WGS84 for you
#[derive(Debug)]
pub struct GeoJsonEncoder {
    schema: ProjectedSchema,
    written: u64,
}

impl GeoJsonEncoder {
    pub fn new(schema: ProjectedSchema) -> Self {
        Self { schema, written: 0 }
    }
}

impl FeatureEncoder for GeoJsonEncoder {
    fn begin(&mut self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(br#"{"type":"FeatureCollection","features":["#);
        Ok(())
    }

    fn encode(&mut self, record: &ProjectedRecord, out: &mut Vec<u8>) -> Result<()> {
        let first = self.written == 0;
        append_record(out, |out| {
            if !first {
                out.push(b',');
            }
            write_feature(record, &self.schema, out)
        })?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, summary: &ExportSummary, out: &mut Vec<u8>) -> Result<Option<Spool>> {
        out.extend_from_slice(br#"],"numberReturned":"#);
        out.extend_from_slice(self.written.to_string().as_bytes());
        if let Some(matched) = summary.number_matched {
            out.extend_from_slice(br#","numberMatched":"#);
            out.extend_from_slice(matched.to_string().as_bytes());
        }
        out.extend_from_slice(br#","truncated":"#);
        out.extend_from_slice(if summary.truncated { b"true" } else { b"false" });
        out.push(b'}');
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::export::ExportFormat;
    use crate::test::{encode_all, properties};
    use serde_json::{json, Value};

    #[test]
    fn test_write() {
        let (output, _) = encode_all(ExportFormat::GeoJson, &properties::schema(), &[], properties::records());
        let collection: Value = serde_json::from_slice(&output).unwrap();

        assert_eq!(collection["type"], "FeatureCollection");
        assert_eq!(collection["numberReturned"], 3);
        assert_eq!(collection["truncated"], false);
        let features = collection["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0]["id"], 1);
        assert_eq!(features[0]["geometry"]["type"], "Point");
        let coords = features[0]["geometry"]["coordinates"].as_array().unwrap();
        assert_eq!(coords[0].as_f64(), Some(0.0));
        assert_eq!(coords[1].as_f64(), Some(1.0));
        assert_eq!(
            features[0]["properties"],
            json!({
                "name": "alpha",
                "count": 0,
                "ratio": 0.5,
                "active": true,
                "created_at": "2024-03-01T12:30:00.000Z",
            })
        );
        assert_eq!(features[1]["properties"]["ratio"], Value::Null);
    }

    #[test]
    fn empty_collection() {
        let (output, _) = encode_all(ExportFormat::GeoJson, &properties::schema(), &[], vec![]);
        let collection: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(collection["features"], json!([]));
        assert_eq!(collection["numberReturned"], 0);
    }

    #[test]
    fn non_finite_coordinates_are_skipped() {
        use crate::crs::Crs;
        use crate::record::FeatureRecord;

        let mut records = properties::records();
        records.insert(1, FeatureRecord::new(9, geo::point!(x: f64::NAN, y: 1.0), Crs::Crs84));
        records.push(FeatureRecord::new(10, geo::point!(x: 0.0, y: f64::INFINITY), Crs::Crs84));
        let (output, summary) = encode_all(ExportFormat::GeoJson, &properties::schema(), &[], records);
        assert_eq!(summary.records_written, 3);

        let collection: Value = serde_json::from_slice(&output).unwrap();
        let ids: Vec<i64> = collection["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|feature| feature["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn round_trip_geometries() {
        use geozero::geojson::GeoJson;
        use geozero::ToGeo;

        let (output, _) = encode_all(ExportFormat::GeoJson, &properties::schema(), &[], properties::records());
        let collection: Value = serde_json::from_slice(&output).unwrap();
        for (feature, record) in collection["features"]
            .as_array()
            .unwrap()
            .iter()
            .zip(properties::records())
        {
            let geometry = GeoJson(&feature["geometry"].to_string()).to_geo().unwrap();
            assert_eq!(geometry, record.geometry);
        }
    }
}
