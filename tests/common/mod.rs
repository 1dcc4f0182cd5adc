//! Fixtures and independent readers shared by the integration tests.
#![allow(dead_code)]

use std::io::{Cursor, Read};

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use flatgeobuf::FgbReader;
use geo::point;
use geoexport::io::wkb::WkbLayout;
use geoexport::io::wkt::WktLayout;
use geoexport::{Crs, ExportFormat, FeatureRecord, FieldDef, FieldSchema, FieldType, GeometryKind};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value;
use zip::ZipArchive;

/// Log export spans to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn schema() -> FieldSchema {
    FieldSchema::new(vec![
        FieldDef::new("id", FieldType::Integer, false),
        FieldDef::new("name", FieldType::Text, true),
        FieldDef::new("count", FieldType::Integer, true),
        FieldDef::new("created_at", FieldType::Timestamp, true),
    ])
    .with_geometry_type(GeometryKind::Point)
    .with_crs(Crs::Crs84)
}

pub fn created_at(i: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 11, 1 + i % 28, 8, 0, 0).unwrap()
}

pub fn record(i: usize) -> FeatureRecord {
    let x = (i % 360) as f64 - 180.0;
    let y = (i % 160) as f64 - 80.0;
    FeatureRecord::new(i as i64 + 1, point!(x: x, y: y), Crs::Crs84)
        .with_attribute("name", format!("feature {i}"))
        .with_attribute("count", i as i64)
        .with_attribute("created_at", created_at(i as u32))
}

pub fn records(n: usize) -> Vec<FeatureRecord> {
    (0..n).map(record).collect()
}

pub fn json_lines(output: &[u8]) -> Vec<Value> {
    std::str::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line.trim_start_matches('\u{1e}')).unwrap())
        .collect()
}

pub fn wkb_frames(output: &[u8]) -> Vec<&[u8]> {
    let mut frames = vec![];
    let mut rest = output;
    while !rest.is_empty() {
        let len = u32::from_le_bytes(rest[..4].try_into().unwrap()) as usize;
        frames.push(&rest[4..4 + len]);
        rest = &rest[4 + len..];
    }
    frames
}

pub fn zip_member(archive: &[u8], suffix: &str) -> Vec<u8> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).unwrap();
    let name = zip
        .file_names()
        .find(|name| name.ends_with(suffix))
        .unwrap()
        .to_string();
    let mut bytes = vec![];
    zip.by_name(&name).unwrap().read_to_end(&mut bytes).unwrap();
    bytes
}

pub fn dbf_records(archive: &[u8]) -> Vec<dbase::Record> {
    dbase::Reader::new(Cursor::new(zip_member(archive, ".dbf")))
        .unwrap()
        .read()
        .unwrap()
}

pub fn parquet_reader(output: Vec<u8>) -> ParquetRecordBatchReaderBuilder<Bytes> {
    ParquetRecordBatchReaderBuilder::try_new(Bytes::from(output)).unwrap()
}

/// The number of records an independent reader finds in `output`.
pub fn count_records(format: ExportFormat, output: Vec<u8>) -> usize {
    match format {
        ExportFormat::GeoJson => {
            let collection: Value = serde_json::from_slice(&output).unwrap();
            collection["features"].as_array().unwrap().len()
        }
        ExportFormat::GeoJsonSeq => output.iter().filter(|b| **b == 0x1E).count(),
        ExportFormat::GeoJsonLines | ExportFormat::Wkt(WktLayout::GeometryOnly) => {
            std::str::from_utf8(&output).unwrap().lines().count()
        }
        ExportFormat::Wkt(WktLayout::WithAttributes) => {
            std::str::from_utf8(&output)
                .unwrap()
                .split("\r\n")
                .filter(|row| !row.is_empty())
                .count()
                - 1
        }
        ExportFormat::Wkb(WkbLayout::GeometryOnly) => wkb_frames(&output).len(),
        ExportFormat::Wkb(WkbLayout::WithAttributes) => wkb_frames(&output).len() / 2,
        ExportFormat::FlatGeobuf => {
            let mut reader = Cursor::new(output);
            let fgb = FgbReader::open(&mut reader).unwrap();
            fgb.header().features_count() as usize
        }
        ExportFormat::GeoParquet => {
            parquet_reader(output).metadata().file_metadata().num_rows() as usize
        }
        ExportFormat::Shapefile => dbf_records(&output).len(),
        ExportFormat::EsriJson => {
            let feature_set: Value = serde_json::from_slice(&output).unwrap();
            feature_set["features"].as_array().unwrap().len()
        }
        ExportFormat::IdsOnly => {
            let ids: Value = serde_json::from_slice(&output).unwrap();
            ids["objectIds"].as_array().unwrap().len()
        }
        ExportFormat::CountOnly => {
            let count: Value = serde_json::from_slice(&output).unwrap();
            count["count"].as_u64().unwrap() as usize
        }
    }
}

pub const FORMATS: [ExportFormat; 13] = [
    ExportFormat::GeoJson,
    ExportFormat::GeoJsonSeq,
    ExportFormat::GeoJsonLines,
    ExportFormat::Wkt(WktLayout::GeometryOnly),
    ExportFormat::Wkt(WktLayout::WithAttributes),
    ExportFormat::Wkb(WkbLayout::GeometryOnly),
    ExportFormat::Wkb(WkbLayout::WithAttributes),
    ExportFormat::FlatGeobuf,
    ExportFormat::GeoParquet,
    ExportFormat::Shapefile,
    ExportFormat::EsriJson,
    ExportFormat::IdsOnly,
    ExportFormat::CountOnly,
];
