use chrono::{DateTime, TimeZone, Utc};

use crate::crs::Crs;
use crate::record::{AttributeValue, FeatureRecord};
use crate::schema::{FieldDef, FieldSchema, FieldType, GeometryKind};
use crate::test::point;

pub(crate) fn schema() -> FieldSchema {
    FieldSchema::new(vec![
        FieldDef::new("id", FieldType::Integer, false),
        FieldDef::new("name", FieldType::Text, false),
        FieldDef::new("count", FieldType::Integer, true),
        FieldDef::new("ratio", FieldType::Double, true),
        FieldDef::new("active", FieldType::Boolean, true),
        FieldDef::new("created_at", FieldType::Timestamp, true),
    ])
    .with_geometry_type(GeometryKind::Point)
    .with_crs(Crs::Crs84)
}

pub(crate) fn created_at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 30, 0).unwrap()
}

/// Three point records. The second one has a null `ratio`.
pub(crate) fn records() -> Vec<FeatureRecord> {
    let points = [point::p0(), point::p1(), point::p2()];
    let names = ["alpha", "beta", "gamma"];
    points
        .into_iter()
        .zip(names)
        .enumerate()
        .map(|(i, (geom, name))| {
            let ratio = if i == 1 {
                AttributeValue::Null
            } else {
                AttributeValue::Double(i as f64 + 0.5)
            };
            FeatureRecord::new(i as i64 + 1, geom, Crs::Crs84)
                .with_attribute("name", name)
                .with_attribute("count", i as i64 * 10)
                .with_attribute("ratio", ratio)
                .with_attribute("active", i % 2 == 0)
                .with_attribute("created_at", created_at(i as u32 + 1))
        })
        .collect()
}
