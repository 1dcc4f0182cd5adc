//! Declared attribute schemas and the per-export field projection.

use std::collections::HashSet;
use std::fmt::Display;

use geo::Geometry;
use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::record::{AttributeValue, FeatureId, FeatureRecord};

/// The declared type of an attribute field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Double,
    Boolean,
    Text,
    Timestamp,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
        };
        write!(f, "{name}")
    }
}

/// The geometry type declared by a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    /// The kind of a concrete geometry. `Line`, `Rect` and `Triangle` report the simple feature
    /// type they are encoded as.
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::Line(_) | Geometry::LineString(_) => Self::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Self::Polygon,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            Geometry::GeometryCollection(_) => Self::GeometryCollection,
        }
    }

    /// Whether a geometry of kind `other` may be stored under this declared kind. A multi kind
    /// also accepts its single counterpart.
    pub fn accepts(&self, other: GeometryKind) -> bool {
        *self == other
            || matches!(
                (self, other),
                (Self::MultiPoint, Self::Point)
                    | (Self::MultiLineString, Self::LineString)
                    | (Self::MultiPolygon, Self::Polygon)
            )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::MultiPoint => "MultiPoint",
            Self::MultiLineString => "MultiLineString",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
        }
    }
}

/// One declared attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
        }
    }
}

/// Every attribute a collection may carry, in declaration order.
///
/// Resolved once per collection, before streaming begins, and shared read-only between exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// The name under which the record identifier is emitted.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub geometry_type: Option<GeometryKind>,
    #[serde(default)]
    pub crs: Option<Crs>,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            fields: vec![],
            geometry_type: None,
            crs: None,
        }
    }
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_geometry_type(mut self, geometry_type: GeometryKind) -> Self {
        self.geometry_type = Some(geometry_type);
        self
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Declared fields other than the identifier, which is always carried by the record itself.
    pub fn attribute_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(move |field| field.name != self.id_field)
    }
}

/// The fields emitted by one export, in output order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedSchema {
    pub id_field: String,
    /// [`FieldType::Text`] when the identifier is declared as text, otherwise
    /// [`FieldType::Integer`].
    pub id_type: FieldType,
    pub fields: Vec<FieldDef>,
    pub geometry_type: Option<GeometryKind>,
    /// The CRS of the emitted geometries: the requested target, otherwise the collection's.
    pub crs: Option<Crs>,
}

impl ProjectedSchema {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// A copy of this schema that emits no attributes.
    pub fn without_attributes(&self) -> Self {
        Self {
            fields: vec![],
            ..self.clone()
        }
    }
}

/// A record reduced to the projected fields.
///
/// `values` is positionally aligned with [`ProjectedSchema::fields`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRecord {
    pub id: FeatureId,
    pub geometry: Geometry<f64>,
    pub crs: Crs,
    pub values: Vec<AttributeValue>,
}

impl ProjectedRecord {
    /// Pairs of (field, value) in output order.
    pub fn iter<'a>(
        &'a self,
        schema: &'a ProjectedSchema,
    ) -> impl Iterator<Item = (&'a FieldDef, &'a AttributeValue)> {
        schema.fields.iter().zip(self.values.iter())
    }
}

/// The projection filter for one export.
///
/// Built once from the collection schema and the caller's selection, then applied to every
/// record the cursor yields.
#[derive(Debug, Clone)]
pub struct FieldProjection {
    schema: ProjectedSchema,
}

impl FieldProjection {
    /// With an empty selection every schema field passes through in declaration order. Otherwise
    /// the selected fields pass through in the order given. Unknown names, repeated names and
    /// the identifier field are ignored, the identifier being emitted regardless.
    pub fn new(schema: &FieldSchema, selected: &[String]) -> Self {
        let fields = if selected.is_empty() {
            schema.attribute_fields().cloned().collect()
        } else {
            let mut seen = HashSet::with_capacity(selected.len());
            selected
                .iter()
                .filter(|name| **name != schema.id_field && seen.insert(name.as_str()))
                .filter_map(|name| schema.field(name).cloned())
                .collect()
        };

        let id_type = match schema.field(&schema.id_field) {
            Some(field) if field.field_type == FieldType::Text => FieldType::Text,
            _ => FieldType::Integer,
        };

        Self {
            schema: ProjectedSchema {
                id_field: schema.id_field.clone(),
                id_type,
                fields,
                geometry_type: schema.geometry_type,
                crs: schema.crs.clone(),
            },
        }
    }

    pub fn schema(&self) -> &ProjectedSchema {
        &self.schema
    }

    pub(crate) fn schema_mut(&mut self) -> &mut ProjectedSchema {
        &mut self.schema
    }

    /// Moves the projected values out of `record`. Attributes the record lacks become
    /// [`AttributeValue::Null`].
    pub fn project(&self, mut record: FeatureRecord) -> ProjectedRecord {
        let values = self
            .schema
            .fields
            .iter()
            .map(|field| {
                record
                    .attributes
                    .swap_remove(&field.name)
                    .unwrap_or(AttributeValue::Null)
            })
            .collect();

        ProjectedRecord {
            id: record.id,
            geometry: record.geometry,
            crs: record.crs,
            values,
        }
    }
}

/// Project a single record. Prefer [`FieldProjection`] when projecting many records.
pub fn project(record: FeatureRecord, selected: &[String], schema: &FieldSchema) -> ProjectedRecord {
    FieldProjection::new(schema, selected).project(record)
}
