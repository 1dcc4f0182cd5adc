use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::crs::Crs;
use crate::error::{ExportError, Result};
use crate::io::wkb::WkbLayout;
use crate::io::wkt::WktLayout;
use crate::schema::{FieldProjection, FieldSchema, FieldType};

/// The target encoding of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// A GeoJSON `FeatureCollection`.
    GeoJson,
    /// RFC 8142 GeoJSON text sequences.
    GeoJsonSeq,
    /// Newline-delimited GeoJSON features.
    GeoJsonLines,
    Wkt(WktLayout),
    Wkb(WkbLayout),
    FlatGeobuf,
    GeoParquet,
    /// A zipped shapefile.
    Shapefile,
    /// The feature set of the Esri feature service REST dialect.
    EsriJson,
    /// Only the object ids of the matching features, as returned for `returnIdsOnly`.
    IdsOnly,
    /// Only the number of matching features, as returned for `returnCountOnly`.
    CountOnly,
}

impl ExportFormat {
    /// The short name, which [`FromStr`] parses back.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GeoJson => "geojson",
            Self::GeoJsonSeq => "geojsonseq",
            Self::GeoJsonLines => "ndjson",
            Self::Wkt(WktLayout::GeometryOnly) => "wkt",
            Self::Wkt(WktLayout::WithAttributes) => "csv",
            Self::Wkb(WkbLayout::GeometryOnly) => "wkb",
            Self::Wkb(WkbLayout::WithAttributes) => "wkb+json",
            Self::FlatGeobuf => "flatgeobuf",
            Self::GeoParquet => "geoparquet",
            Self::Shapefile => "shapefile",
            Self::EsriJson => "esrijson",
            Self::IdsOnly => "ids",
            Self::CountOnly => "count",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::GeoJson => "application/geo+json",
            Self::GeoJsonSeq => "application/geo+json-seq",
            Self::GeoJsonLines => "application/x-ndjson",
            Self::Wkt(WktLayout::GeometryOnly) => "text/plain",
            Self::Wkt(WktLayout::WithAttributes) => "text/csv",
            Self::Wkb(_) => "application/octet-stream",
            Self::FlatGeobuf => "application/flatgeobuf",
            Self::GeoParquet => "application/vnd.apache.parquet",
            Self::Shapefile => "application/zip",
            Self::EsriJson | Self::IdsOnly | Self::CountOnly => "application/json",
        }
    }

    /// Whether records carry their projected attributes in this encoding.
    pub fn supports_attributes(&self) -> bool {
        !matches!(
            self,
            Self::Wkt(WktLayout::GeometryOnly)
                | Self::Wkb(WkbLayout::GeometryOnly)
                | Self::IdsOnly
                | Self::CountOnly
        )
    }

    /// Esri responses that summarize the matching features and ignore any field selection.
    fn summarizes(&self) -> bool {
        matches!(self, Self::IdsOnly | Self::CountOnly)
    }

    /// Whether attribute columns are declared with a native type, rather than inferred by the
    /// reader from each value.
    pub fn has_type_system(&self) -> bool {
        matches!(
            self,
            Self::FlatGeobuf | Self::GeoParquet | Self::Shapefile | Self::EsriJson
        )
    }
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    /// Parses short names and media types, ignoring case and media type parameters.
    fn from_str(s: &str) -> Result<Self> {
        let essence = s.split(';').next().unwrap_or_default().trim();
        let format = match essence.to_ascii_lowercase().as_str() {
            "geojson" | "application/geo+json" => Self::GeoJson,
            "geojsonseq" | "geojson-seq" | "application/geo+json-seq" => Self::GeoJsonSeq,
            "ndjson" | "geojsonl" | "jsonl" | "application/x-ndjson" => Self::GeoJsonLines,
            "wkt" | "text/plain" => Self::Wkt(WktLayout::GeometryOnly),
            "csv" | "text/csv" => Self::Wkt(WktLayout::WithAttributes),
            "wkb" | "application/octet-stream" => Self::Wkb(WkbLayout::GeometryOnly),
            "wkb+json" => Self::Wkb(WkbLayout::WithAttributes),
            "fgb" | "flatgeobuf" | "application/flatgeobuf" => Self::FlatGeobuf,
            "parquet" | "geoparquet" | "application/vnd.apache.parquet" => Self::GeoParquet,
            "shapefile" | "shp" | "zip" | "application/zip" => Self::Shapefile,
            "esrijson" | "json" | "pjson" | "application/json" => Self::EsriJson,
            "ids" | "idsonly" => Self::IdsOnly,
            "count" | "countonly" => Self::CountOnly,
            _ => return Err(ExportError::UnknownFormat(s.to_string())),
        };
        Ok(format)
    }
}

/// The parameters of one export, fixed when the export starts.
#[derive(Debug, Clone)]
pub struct StreamingExportRequest {
    pub format: ExportFormat,
    /// Field names to emit, in output order. Empty selects every declared field.
    pub selected_fields: Vec<String>,
    /// Reproject every geometry into this reference system.
    pub target_crs: Option<Crs>,
    /// Maximum number of records written before the output is truncated.
    pub limit: Option<u64>,
    pub cancel: CancellationToken,
    /// Wall-clock budget, after which the export is cancelled.
    pub deadline: Option<Duration>,
    /// Projected fields emitted with another declared type than the schema's. Only encodings
    /// with a type system accept these.
    pub field_types: Vec<(String, FieldType)>,
}

impl StreamingExportRequest {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            selected_fields: vec![],
            target_crs: None,
            limit: None,
            cancel: CancellationToken::new(),
            deadline: None,
            field_types: vec![],
        }
    }

    pub fn with_selected_fields<S: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.selected_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target_crs(mut self, crs: Crs) -> Self {
        self.target_crs = Some(crs);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Declare the projected field `name` as `field_type` in the output. Values are conformed
    /// to it like to any declared type.
    pub fn with_field_type(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field_types.push((name.into(), field_type));
        self
    }

    /// Validate the request against `schema` and build the projection its records go through.
    ///
    /// Geometry-only layouts reject a field selection, and encodings without a type system
    /// reject typed fields. Encodings without attributes get a projection that emits none, and
    /// the projected CRS becomes the target CRS when one was requested.
    pub(crate) fn projection(&self, schema: &FieldSchema) -> Result<FieldProjection> {
        let attributes = self.format.supports_attributes();
        if !attributes && !self.format.summarizes() && !self.selected_fields.is_empty() {
            return Err(ExportError::InvalidConfiguration(format!(
                "{} output carries no attributes, but fields were selected",
                self.format
            )));
        }
        if !self.format.has_type_system() && !self.field_types.is_empty() {
            return Err(ExportError::InvalidConfiguration(format!(
                "{} output has no type system, but typed fields were requested",
                self.format
            )));
        }

        let mut projection = FieldProjection::new(schema, &self.selected_fields);
        let projected = projection.schema_mut();
        for (name, field_type) in &self.field_types {
            let field = projected
                .fields
                .iter_mut()
                .find(|field| field.name == *name)
                .ok_or_else(|| {
                    ExportError::InvalidConfiguration(format!(
                        "typed field {name} is not part of the output"
                    ))
                })?;
            field.field_type = *field_type;
        }
        if !attributes {
            projected.fields.clear();
        }
        if let Some(target) = &self.target_crs {
            projected.crs = Some(target.clone());
        }
        Ok(projection)
    }
}
