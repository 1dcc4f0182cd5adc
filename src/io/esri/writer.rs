use serde_json::{json, Map, Value};

use crate::error::{ExportError, Result};
use crate::io::encoder::{append_record, ensure_finite, ExportSummary, FeatureEncoder, Spool};
use crate::io::esri::geometry::{esri_geometry_type, to_esri_geometry};
use crate::record::FeatureId;
use crate::schema::{FieldType, GeometryKind, ProjectedRecord, ProjectedSchema};
use crate::value::to_esri_json;

fn esri_field_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer => "esriFieldTypeBigInteger",
        FieldType::Double => "esriFieldTypeDouble",
        FieldType::Boolean => "esriFieldTypeSmallInteger",
        FieldType::Text => "esriFieldTypeString",
        FieldType::Timestamp => "esriFieldTypeDate",
    }
}

fn field(name: &str, field_type: &str) -> Value {
    json!({ "name": name, "alias": name, "type": field_type })
}

fn write_exceeded(summary: &ExportSummary, out: &mut Vec<u8>) {
    out.extend_from_slice(br#","exceededTransferLimit":"#);
    out.extend_from_slice(if summary.truncated { b"true" } else { b"false" });
    out.push(b'}');
}

/// Writes an Esri JSON feature set, as returned by the `query` operation of a feature service.
///
/// The identifier is the object id field. When the layer declares no geometry type, the
/// `geometryType` member is taken from the first written feature and placed after the features.
#[derive(Debug)]
pub struct EsriJsonEncoder {
    schema: ProjectedSchema,
    geometry_type: Option<&'static str>,
    declared: bool,
    written: u64,
}

impl EsriJsonEncoder {
    pub fn new(schema: ProjectedSchema) -> Self {
        let geometry_type = schema.geometry_type.and_then(esri_geometry_type);
        Self {
            schema,
            declared: geometry_type.is_some(),
            geometry_type,
            written: 0,
        }
    }

    fn attributes(&self, record: &ProjectedRecord) -> Value {
        let mut attributes = Map::with_capacity(self.schema.len() + 1);
        let id = match &record.id {
            FeatureId::Int(id) => Value::from(*id),
            FeatureId::String(id) => Value::from(id.as_str()),
        };
        attributes.insert(self.schema.id_field.clone(), id);
        for (field, value) in record.iter(&self.schema) {
            attributes.insert(field.name.clone(), to_esri_json(value));
        }
        Value::Object(attributes)
    }
}

impl FeatureEncoder for EsriJsonEncoder {
    fn begin(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let id_type = match self.schema.id_type {
            FieldType::Text => "esriFieldTypeString",
            _ => "esriFieldTypeOID",
        };
        let fields = std::iter::once(field(&self.schema.id_field, id_type))
            .chain(
                self.schema
                    .fields
                    .iter()
                    .map(|f| field(&f.name, esri_field_type(f.field_type))),
            )
            .collect::<Vec<_>>();

        out.extend_from_slice(br#"{"objectIdFieldName":"#);
        serde_json::to_writer(&mut *out, &self.schema.id_field)?;
        if let Some(geometry_type) = self.geometry_type.filter(|_| self.declared) {
            out.extend_from_slice(br#","geometryType":"#);
            serde_json::to_writer(&mut *out, geometry_type)?;
        }
        if let Some(wkid) = self.schema.crs.as_ref().and_then(|crs| crs.srid()) {
            out.extend_from_slice(br#","spatialReference":"#);
            serde_json::to_writer(&mut *out, &json!({ "wkid": wkid }))?;
        }
        out.extend_from_slice(br#","fields":"#);
        serde_json::to_writer(&mut *out, &fields)?;
        out.extend_from_slice(br#","features":["#);
        Ok(())
    }

    fn encode(&mut self, record: &ProjectedRecord, out: &mut Vec<u8>) -> Result<()> {
        let kind = GeometryKind::of(&record.geometry);
        let record_type = esri_geometry_type(kind).ok_or_else(|| {
            ExportError::RecordSkipped("Esri JSON cannot represent geometry collections".to_string())
        })?;
        ensure_finite(&record.geometry)?;
        match self.geometry_type {
            Some(layer_type) if layer_type != record_type => {
                return Err(ExportError::RecordSkipped(format!(
                    "{} geometry in a {layer_type} layer",
                    kind.as_str()
                )))
            }
            _ => {}
        }

        let feature = json!({
            "attributes": self.attributes(record),
            "geometry": to_esri_geometry(&record.geometry)?,
        });
        let first = self.written == 0;
        append_record(out, |out| {
            if !first {
                out.push(b',');
            }
            serde_json::to_writer(&mut *out, &feature)?;
            Ok(())
        })?;
        self.geometry_type.get_or_insert(record_type);
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, summary: &ExportSummary, out: &mut Vec<u8>) -> Result<Option<Spool>> {
        out.push(b']');
        if let Some(geometry_type) = self.geometry_type.filter(|_| !self.declared) {
            out.extend_from_slice(br#","geometryType":"#);
            serde_json::to_writer(&mut *out, geometry_type)?;
        }
        write_exceeded(summary, out);
        Ok(None)
    }
}

/// Writes only the object ids, as returned by `returnIdsOnly=true`.
#[derive(Debug)]
pub struct IdsOnlyEncoder {
    schema: ProjectedSchema,
    written: u64,
}

impl IdsOnlyEncoder {
    pub fn new(schema: ProjectedSchema) -> Self {
        Self { schema, written: 0 }
    }
}

impl FeatureEncoder for IdsOnlyEncoder {
    fn begin(&mut self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(br#"{"objectIdFieldName":"#);
        serde_json::to_writer(&mut *out, &self.schema.id_field)?;
        out.extend_from_slice(br#","objectIds":["#);
        Ok(())
    }

    fn encode(&mut self, record: &ProjectedRecord, out: &mut Vec<u8>) -> Result<()> {
        let first = self.written == 0;
        append_record(out, |out| {
            if !first {
                out.push(b',');
            }
            serde_json::to_writer(&mut *out, &record.id)?;
            Ok(())
        })?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, summary: &ExportSummary, out: &mut Vec<u8>) -> Result<Option<Spool>> {
        out.push(b']');
        write_exceeded(summary, out);
        Ok(None)
    }
}

/// Writes only the number of features, as returned by `returnCountOnly=true`.
#[derive(Debug, Default)]
pub struct CountOnlyEncoder;

impl FeatureEncoder for CountOnlyEncoder {
    fn begin(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn encode(&mut self, _record: &ProjectedRecord, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, summary: &ExportSummary, out: &mut Vec<u8>) -> Result<Option<Spool>> {
        serde_json::to_writer(&mut *out, &json!({ "count": summary.records_written }))?;
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use serde_json::{json, Value};

    use super::*;
    use crate::crs::Crs;
    use crate::export::ExportFormat;
    use crate::record::FeatureRecord;
    use crate::schema::FieldSchema;
    use crate::test::{encode_all, linestring, point, properties};

    #[test]
    fn feature_set() {
        let (output, _) = encode_all(
            ExportFormat::EsriJson,
            &properties::schema(),
            &["created_at", "active", "count"].map(String::from),
            properties::records(),
        );
        let set: Value = serde_json::from_slice(&output).unwrap();

        assert_eq!(set["objectIdFieldName"], "id");
        assert_eq!(set["geometryType"], "esriGeometryPoint");
        assert_eq!(set["spatialReference"], json!({ "wkid": 4326 }));
        assert_eq!(
            set["fields"],
            json!([
                { "name": "id", "alias": "id", "type": "esriFieldTypeOID" },
                { "name": "created_at", "alias": "created_at", "type": "esriFieldTypeDate" },
                { "name": "active", "alias": "active", "type": "esriFieldTypeSmallInteger" },
                { "name": "count", "alias": "count", "type": "esriFieldTypeBigInteger" },
            ])
        );
        assert_eq!(set["exceededTransferLimit"], false);

        let features = set["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(
            features[0],
            json!({
                "attributes": { "id": 1, "created_at": 1709296200000_i64, "active": 1, "count": 0 },
                "geometry": { "x": 0.0, "y": 1.0 },
            })
        );
    }

    #[test]
    fn undeclared_geometry_type_follows_first_feature() {
        let schema = FieldSchema::new(vec![]);
        let records = vec![
            FeatureRecord::new(1, linestring::ls0(), Crs::Crs84),
            FeatureRecord::new(2, point::p0(), Crs::Crs84),
            FeatureRecord::new(3, linestring::ls1(), Crs::Crs84),
        ];
        let (output, summary) = encode_all(ExportFormat::EsriJson, &schema, &[], records);
        assert_eq!(summary.records_written, 2);

        let set: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(set["geometryType"], "esriGeometryPolyline");
        assert!(set.get("spatialReference").is_none());
        let ids = set["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["attributes"]["id"].clone())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![json!(1), json!(3)]);
    }

    #[test]
    fn ids_only() {
        let (output, _) = encode_all(
            ExportFormat::IdsOnly,
            &properties::schema(),
            &[],
            properties::records(),
        );
        let ids: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(
            ids,
            json!({
                "objectIdFieldName": "id",
                "objectIds": [1, 2, 3],
                "exceededTransferLimit": false,
            })
        );
    }

    #[test]
    fn count_only() {
        let mut records = properties::records();
        records.push(FeatureRecord::new(
            4,
            geo::Geometry::GeometryCollection(geo::GeometryCollection::<f64>::new_from(vec![point::p0().into()])),
            Crs::Crs84,
        ));
        let (output, summary) = encode_all(
            ExportFormat::CountOnly,
            &properties::schema(),
            &["name".to_string()],
            records,
        );
        assert_eq!(summary.records_written, 4);
        let count: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(count, json!({ "count": 4 }));

        let (output, _) = encode_all(ExportFormat::CountOnly, &properties::schema(), &[], vec![]);
        assert_eq!(output, br#"{"count":0}"#);
    }
}
