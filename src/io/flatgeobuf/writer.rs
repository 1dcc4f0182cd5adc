use std::collections::HashSet;
use std::io::{BufWriter, Write};

use flatgeobuf::{ColumnType, FgbCrs, FgbWriter, FgbWriterOptions, GeometryType};
use geo::CoordsIter;
use geozero::wkb::Wkb;
use geozero::PropertyProcessor;
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::export::FlatGeobufOptions;
use crate::io::encoder::{ExportSummary, FeatureEncoder, Spool};
use crate::io::wkb::to_wkb;
use crate::schema::{FieldType, GeometryKind, ProjectedRecord, ProjectedSchema};
use crate::value::column::with_column_value;
use crate::value::id_value;

/// Writes a FlatGeobuf file without spatial index.
///
/// The header, including the attribute table layout, is derived from the projected schema: the
/// identifier column first, then the projected fields in output order. Features are handed to an
/// [`FgbWriter`] as they arrive, which buffers them in its own temporary file until
/// [`finish`](FeatureEncoder::finish) writes the complete file into a spool.
pub struct FlatGeobufEncoder {
    schema: ProjectedSchema,
    layer_name: String,
    geometry_type: GeometryType,
    fgb: Option<FgbWriter<'static>>,
    features: u64,
}

fn geometry_type(kind: Option<GeometryKind>) -> GeometryType {
    match kind {
        Some(GeometryKind::Point) => GeometryType::Point,
        Some(GeometryKind::LineString) => GeometryType::LineString,
        Some(GeometryKind::Polygon) => GeometryType::Polygon,
        Some(GeometryKind::MultiPoint) => GeometryType::MultiPoint,
        Some(GeometryKind::MultiLineString) => GeometryType::MultiLineString,
        Some(GeometryKind::MultiPolygon) => GeometryType::MultiPolygon,
        Some(GeometryKind::GeometryCollection) => GeometryType::GeometryCollection,
        None => GeometryType::Unknown,
    }
}

fn column_type(field_type: FieldType) -> ColumnType {
    match field_type {
        FieldType::Integer => ColumnType::Long,
        FieldType::Double => ColumnType::Double,
        FieldType::Boolean => ColumnType::Bool,
        FieldType::Text => ColumnType::String,
        FieldType::Timestamp => ColumnType::DateTime,
    }
}

fn create_fgb_options<'a>(
    schema: &ProjectedSchema,
    options: &'a FlatGeobufOptions,
    wkt: Option<&'a str>,
) -> FgbWriterOptions<'a> {
    let crs = FgbCrs {
        code: schema
            .crs
            .as_ref()
            .and_then(|crs| crs.srid())
            .and_then(|srid| i32::try_from(srid).ok())
            .unwrap_or(0),
        wkt,
        ..Default::default()
    };

    FgbWriterOptions {
        write_index: false,
        detect_type: false,
        promote_to_multi: true,
        crs,
        title: options.title.as_deref(),
        description: options.description.as_deref(),
        ..Default::default()
    }
}

impl FlatGeobufEncoder {
    pub fn try_new(
        schema: &ProjectedSchema,
        layer_name: &str,
        options: &FlatGeobufOptions,
    ) -> Result<Self> {
        let mut names = HashSet::with_capacity(schema.len() + 1);
        names.insert(schema.id_field.as_str());
        for name in schema.field_names() {
            if !names.insert(name) {
                return Err(ExportError::InvalidConfiguration(format!(
                    "duplicate FlatGeobuf column {name}"
                )));
            }
        }

        let geometry_type = geometry_type(schema.geometry_type);
        let wkt = schema.crs.as_ref().and_then(|crs| crs.to_wkt());
        let mut fgb = FgbWriter::create_with_options(
            layer_name,
            geometry_type,
            create_fgb_options(schema, options, wkt.as_deref()),
        )?;

        fgb.add_column(&schema.id_field, column_type(schema.id_type), |_, col| {
            col.nullable = false;
        });
        for field in &schema.fields {
            let nullable = field.nullable;
            fgb.add_column(&field.name, column_type(field.field_type), |_, col| {
                col.nullable = nullable;
            });
        }

        Ok(Self {
            schema: schema.clone(),
            layer_name: layer_name.to_string(),
            geometry_type,
            fgb: Some(fgb),
            features: 0,
        })
    }
}

impl std::fmt::Debug for FlatGeobufEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatGeobufEncoder")
            .field("layer_name", &self.layer_name)
            .field("geometry_type", &self.geometry_type)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl FeatureEncoder for FlatGeobufEncoder {
    fn begin(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn encode(&mut self, record: &ProjectedRecord, _out: &mut Vec<u8>) -> Result<()> {
        if record.geometry.coords_iter().next().is_none() {
            return Err(ExportError::RecordSkipped(
                "FlatGeobuf cannot store empty geometries".to_string(),
            ));
        }
        let kind = GeometryKind::of(&record.geometry);
        if let Some(declared) = self.schema.geometry_type {
            if !declared.accepts(kind) {
                return Err(ExportError::RecordSkipped(format!(
                    "{} geometry in a {} layer",
                    kind.as_str(),
                    declared.as_str()
                )));
            }
        }

        // Everything that can reject the record happens before the writer sees it.
        let wkb = to_wkb(&record.geometry)?;
        let id = id_value(&record.id, self.schema.id_type)?;

        let schema = &self.schema;
        let fgb = self
            .fgb
            .as_mut()
            .ok_or_else(|| ExportError::General("FlatGeobuf file already finished".to_string()))?;
        let mut property_result = Ok(());
        fgb.add_feature_geom(Wkb(wkb), |feature| {
            property_result = std::iter::once(schema.id_field.as_str())
                .chain(schema.field_names())
                .zip(std::iter::once(&id).chain(&record.values))
                .enumerate()
                .try_for_each(|(idx, (name, value))| {
                    with_column_value(value, |column| feature.property(idx, name, column))
                        .transpose()
                        .map(|_| ())
                });
        })?;
        property_result?;
        self.features += 1;
        Ok(())
    }

    fn finish(&mut self, _summary: &ExportSummary, _out: &mut Vec<u8>) -> Result<Option<Spool>> {
        let fgb = self
            .fgb
            .take()
            .ok_or_else(|| ExportError::General("FlatGeobuf file already finished".to_string()))?;
        let mut output = BufWriter::new(tempfile::tempfile()?);
        fgb.write(&mut output)?;
        output.flush()?;
        let file = output.into_inner().map_err(|err| err.into_error())?;

        let spool = Spool::new(file)?;
        debug!(
            features = self.features,
            bytes = spool.len(),
            "assembled FlatGeobuf file"
        );
        Ok(Some(spool))
    }

    fn spools(&self) -> bool {
        true
    }
}
