//! Type-preserving attribute value mapping.
//!
//! Every record passes through [`ValueMapper::conform`] before it reaches an encoder, so encoders
//! may assume each value either matches its field's declared [`FieldType`] or is null. The
//! remaining functions produce the native representation of a conformed value for one family of
//! encodings.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};
use tracing::warn;

use crate::error::{ExportError, Result};
use crate::record::{AttributeValue, FeatureId};
use crate::schema::{FieldType, ProjectedRecord, ProjectedSchema};

/// Coerces projected values to their declared field types.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueMapper;

impl ValueMapper {
    /// Conform every value of `record` to the declared type of its field.
    ///
    /// Integers widen to doubles, integral doubles narrow to integers, RFC 3339 text becomes a
    /// timestamp, and any scalar becomes text for a text field. Values that cannot be represented
    /// are replaced by null. Returns the number of values nulled.
    pub fn conform(&self, record: &mut ProjectedRecord, schema: &ProjectedSchema) -> u32 {
        let mut nulled = 0;
        for (field, value) in schema.fields.iter().zip(record.values.iter_mut()) {
            if value.is_null() {
                continue;
            }
            let current = std::mem::replace(value, AttributeValue::Null);
            match coerce(current, field.field_type) {
                Some(coerced) => *value = coerced,
                None => {
                    warn!(
                        id = %record.id,
                        field = %field.name,
                        field_type = %field.field_type,
                        "attribute value cannot be represented, nulling it"
                    );
                    nulled += 1;
                }
            }
        }
        nulled
    }
}

fn coerce(value: AttributeValue, field_type: FieldType) -> Option<AttributeValue> {
    use AttributeValue as V;

    match (field_type, value) {
        (FieldType::Integer, V::Integer(v)) => Some(V::Integer(v)),
        (FieldType::Integer, V::Double(v)) => {
            (v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64)
                .then_some(V::Integer(v as i64))
        }
        (FieldType::Integer, V::Boolean(v)) => Some(V::Integer(v.into())),
        (FieldType::Integer, V::Text(v)) => v.trim().parse().ok().map(V::Integer),

        (FieldType::Double, V::Double(v)) => Some(V::Double(v)),
        (FieldType::Double, V::Integer(v)) => Some(V::Double(v as f64)),
        (FieldType::Double, V::Text(v)) => v.trim().parse().ok().map(V::Double),

        (FieldType::Boolean, V::Boolean(v)) => Some(V::Boolean(v)),
        (FieldType::Boolean, V::Integer(0)) => Some(V::Boolean(false)),
        (FieldType::Boolean, V::Integer(1)) => Some(V::Boolean(true)),
        (FieldType::Boolean, V::Text(v)) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(V::Boolean(true)),
            "false" | "f" | "0" => Some(V::Boolean(false)),
            _ => None,
        },

        (FieldType::Timestamp, V::Timestamp(v)) => Some(V::Timestamp(v)),
        (FieldType::Timestamp, V::Text(v)) => DateTime::parse_from_rfc3339(v.trim())
            .ok()
            .map(|dt| V::Timestamp(dt.with_timezone(&Utc))),

        (FieldType::Text, V::Text(v)) => Some(V::Text(v)),
        (FieldType::Text, value) => text(&value).map(V::Text),

        _ => None,
    }
}

/// The identifier as a value of the identifier column's type.
///
/// Text identifiers that are not integers cannot be stored in an integer identifier column.
pub fn id_value(id: &FeatureId, id_type: FieldType) -> Result<AttributeValue> {
    match (id, id_type) {
        (FeatureId::Int(v), FieldType::Integer) => Ok(AttributeValue::Integer(*v)),
        (FeatureId::String(v), FieldType::Integer) => v.parse().map(AttributeValue::Integer).map_err(|_| {
            ExportError::RecordSkipped(format!("identifier {v} is not an integer"))
        }),
        (id, _) => Ok(AttributeValue::Text(id.to_string())),
    }
}

/// RFC 3339 with millisecond precision, always in UTC.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The plain text form of a value, `None` for null.
pub fn text(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Null => None,
        AttributeValue::Integer(v) => Some(v.to_string()),
        AttributeValue::Double(v) => Some(v.to_string()),
        AttributeValue::Boolean(v) => Some(v.to_string()),
        AttributeValue::Text(v) => Some(v.clone()),
        AttributeValue::Timestamp(v) => Some(format_timestamp(v)),
    }
}

/// JSON has no temporal type: timestamps become RFC 3339 strings. Non-finite doubles have no
/// JSON representation and become null.
pub fn to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Integer(v) => Value::Number((*v).into()),
        AttributeValue::Double(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        AttributeValue::Boolean(v) => Value::Bool(*v),
        AttributeValue::Text(v) => Value::String(v.clone()),
        AttributeValue::Timestamp(v) => Value::String(format_timestamp(v)),
    }
}

/// Esri JSON represents dates as milliseconds since the Unix epoch and has no boolean type, so
/// booleans become the small integers 0 and 1.
pub fn to_esri_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Timestamp(v) => Value::Number(v.timestamp_millis().into()),
        AttributeValue::Boolean(v) => Value::Number(u8::from(*v).into()),
        value => to_json(value),
    }
}

#[cfg(feature = "flatgeobuf")]
pub(crate) mod column {
    use geozero::ColumnValue;

    use super::format_timestamp;
    use crate::record::AttributeValue;

    /// Hands the [`ColumnValue`] of `value` to `f`. `None` for null, which FlatGeobuf encodes by
    /// omitting the property.
    pub(crate) fn with_column_value<R>(
        value: &AttributeValue,
        f: impl FnOnce(&ColumnValue) -> R,
    ) -> Option<R> {
        match value {
            AttributeValue::Null => None,
            AttributeValue::Integer(v) => Some(f(&ColumnValue::Long(*v))),
            AttributeValue::Double(v) => Some(f(&ColumnValue::Double(*v))),
            AttributeValue::Boolean(v) => Some(f(&ColumnValue::Bool(*v))),
            AttributeValue::Text(v) => Some(f(&ColumnValue::String(v))),
            AttributeValue::Timestamp(v) => {
                let formatted = format_timestamp(v);
                Some(f(&ColumnValue::DateTime(&formatted)))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crs::Crs;
    use crate::schema::FieldDef;
    use crate::test::properties::created_at;
    use geo::point;
    use serde_json::json;

    fn schema(fields: Vec<(&str, FieldType)>) -> ProjectedSchema {
        ProjectedSchema {
            id_field: "id".to_string(),
            id_type: FieldType::Integer,
            fields: fields
                .into_iter()
                .map(|(name, field_type)| FieldDef::new(name, field_type, true))
                .collect(),
            geometry_type: None,
            crs: None,
        }
    }

    fn record(values: Vec<AttributeValue>) -> ProjectedRecord {
        ProjectedRecord {
            id: 1.into(),
            geometry: point!(x: 0.0, y: 0.0).into(),
            crs: Crs::Crs84,
            values,
        }
    }

    #[test]
    fn conform_preserves_native_types() {
        let schema = schema(vec![
            ("a", FieldType::Integer),
            ("b", FieldType::Double),
            ("c", FieldType::Boolean),
            ("d", FieldType::Timestamp),
            ("e", FieldType::Text),
        ]);
        let mut rec = record(vec![
            AttributeValue::Double(4.0),
            AttributeValue::Integer(3),
            AttributeValue::Integer(1),
            AttributeValue::Text("2024-03-01T12:30:00Z".to_string()),
            AttributeValue::Null,
        ]);
        let nulled = ValueMapper.conform(&mut rec, &schema);
        assert_eq!(nulled, 0);
        assert_eq!(
            rec.values,
            vec![
                AttributeValue::Integer(4),
                AttributeValue::Double(3.0),
                AttributeValue::Boolean(true),
                AttributeValue::Timestamp(created_at(1)),
                AttributeValue::Null,
            ]
        );
    }

    #[test]
    fn impossible_values_are_nulled() {
        let schema = schema(vec![
            ("a", FieldType::Integer),
            ("b", FieldType::Timestamp),
            ("c", FieldType::Text),
        ]);
        let mut rec = record(vec![
            AttributeValue::Double(4.5),
            AttributeValue::Boolean(true),
            AttributeValue::Integer(12),
        ]);
        let nulled = ValueMapper.conform(&mut rec, &schema);
        assert_eq!(nulled, 2);
        assert_eq!(
            rec.values,
            vec![
                AttributeValue::Null,
                AttributeValue::Null,
                AttributeValue::Text("12".to_string()),
            ]
        );
    }

    #[test]
    fn json_representations() {
        let ts = AttributeValue::Timestamp(created_at(1));
        assert_eq!(to_json(&ts), json!("2024-03-01T12:30:00.000Z"));
        assert_eq!(to_esri_json(&ts), json!(1709296200000_i64));
        assert_eq!(to_esri_json(&AttributeValue::Boolean(true)), json!(1));
        assert_eq!(to_json(&AttributeValue::Integer(5)), json!(5));
        assert_eq!(to_json(&AttributeValue::Double(f64::NAN)), Value::Null);
        assert_eq!(to_json(&AttributeValue::Null), Value::Null);
    }
}
