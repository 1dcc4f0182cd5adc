//! Accumulate projected records into Arrow record batches.

use std::sync::Arc;

use arrow_array::builder::{
    BinaryBuilder, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
    TimestampMicrosecondBuilder,
};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};

use crate::error::{ExportError, Result};
use crate::record::AttributeValue;
use crate::schema::{FieldType, ProjectedRecord, ProjectedSchema};
use crate::value::id_value;

/// The name of the WKB geometry column.
pub const GEOMETRY_COLUMN: &str = "geometry";

const UTC: &str = "UTC";

fn data_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Integer => DataType::Int64,
        FieldType::Double => DataType::Float64,
        FieldType::Boolean => DataType::Boolean,
        FieldType::Text => DataType::Utf8,
        FieldType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into())),
    }
}

/// The Arrow schema of the output: the identifier, the projected fields, then the geometry.
pub fn output_schema(schema: &ProjectedSchema) -> Result<SchemaRef> {
    if schema.id_field == GEOMETRY_COLUMN || schema.field_names().any(|n| n == GEOMETRY_COLUMN) {
        return Err(ExportError::InvalidConfiguration(format!(
            "field name {GEOMETRY_COLUMN} is reserved for the GeoParquet geometry column"
        )));
    }

    let mut fields = Vec::with_capacity(schema.len() + 2);
    fields.push(Field::new(&schema.id_field, data_type(schema.id_type), false));
    fields.extend(
        schema
            .fields
            .iter()
            .map(|field| Field::new(&field.name, data_type(field.field_type), field.nullable)),
    );
    fields.push(Field::new(GEOMETRY_COLUMN, DataType::Binary, false));
    Ok(Arc::new(Schema::new(fields)))
}

enum ColumnBuilder {
    Integer(Int64Builder),
    Double(Float64Builder),
    Boolean(BooleanBuilder),
    Text(StringBuilder),
    Timestamp(TimestampMicrosecondBuilder),
}

impl ColumnBuilder {
    fn new(field_type: FieldType, capacity: usize) -> Self {
        match field_type {
            FieldType::Integer => Self::Integer(Int64Builder::with_capacity(capacity)),
            FieldType::Double => Self::Double(Float64Builder::with_capacity(capacity)),
            FieldType::Boolean => Self::Boolean(BooleanBuilder::with_capacity(capacity)),
            FieldType::Text => Self::Text(StringBuilder::with_capacity(capacity, capacity * 8)),
            FieldType::Timestamp => Self::Timestamp(
                TimestampMicrosecondBuilder::with_capacity(capacity).with_timezone(UTC),
            ),
        }
    }

    /// Values that do not match the column type append null. Conformed records never carry
    /// them.
    fn append(&mut self, value: &AttributeValue) {
        match (self, value) {
            (Self::Integer(b), AttributeValue::Integer(v)) => b.append_value(*v),
            (Self::Integer(b), _) => b.append_null(),
            (Self::Double(b), AttributeValue::Double(v)) => b.append_value(*v),
            (Self::Double(b), _) => b.append_null(),
            (Self::Boolean(b), AttributeValue::Boolean(v)) => b.append_value(*v),
            (Self::Boolean(b), _) => b.append_null(),
            (Self::Text(b), AttributeValue::Text(v)) => b.append_value(v),
            (Self::Text(b), _) => b.append_null(),
            (Self::Timestamp(b), AttributeValue::Timestamp(v)) => {
                b.append_value(v.timestamp_micros())
            }
            (Self::Timestamp(b), _) => b.append_null(),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Integer(b) => Arc::new(b.finish()),
            Self::Double(b) => Arc::new(b.finish()),
            Self::Boolean(b) => Arc::new(b.finish()),
            Self::Text(b) => Arc::new(b.finish()),
            Self::Timestamp(b) => Arc::new(b.finish()),
        }
    }
}

/// Buffers up to one row group of records.
pub struct BatchBuilder {
    schema: ProjectedSchema,
    arrow_schema: SchemaRef,
    id: ColumnBuilder,
    columns: Vec<ColumnBuilder>,
    geometry: BinaryBuilder,
    capacity: usize,
    len: usize,
}

impl BatchBuilder {
    pub fn new(schema: &ProjectedSchema, arrow_schema: SchemaRef, capacity: usize) -> Self {
        Self {
            schema: schema.clone(),
            arrow_schema,
            id: ColumnBuilder::new(schema.id_type, capacity),
            columns: schema
                .fields
                .iter()
                .map(|field| ColumnBuilder::new(field.field_type, capacity))
                .collect(),
            geometry: BinaryBuilder::with_capacity(capacity, capacity * 32),
            capacity,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Append one record. Everything fallible happens before the first column is touched, so an
    /// error leaves the batch unchanged.
    pub fn append(&mut self, record: &ProjectedRecord, wkb: &[u8]) -> Result<()> {
        let id = id_value(&record.id, self.schema.id_type)?;
        if let Some((field, _)) = record
            .iter(&self.schema)
            .find(|(field, value)| !field.nullable && value.is_null())
        {
            return Err(ExportError::RecordSkipped(format!(
                "null value for non-nullable field {}",
                field.name
            )));
        }

        self.id.append(&id);
        for (column, value) in self.columns.iter_mut().zip(record.values.iter()) {
            column.append(value);
        }
        self.geometry.append_value(wkb);
        self.len += 1;
        Ok(())
    }

    /// Take the buffered rows as a record batch, leaving the builder empty.
    pub fn finish(&mut self) -> Result<RecordBatch> {
        let mut arrays = Vec::with_capacity(self.columns.len() + 2);
        arrays.push(self.id.finish());
        arrays.extend(self.columns.iter_mut().map(ColumnBuilder::finish));
        arrays.push(Arc::new(self.geometry.finish()));
        self.len = 0;
        Ok(RecordBatch::try_new(self.arrow_schema.clone(), arrays)?)
    }
}
