use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use dbase::{FieldName, FieldValue, TableWriter, TableWriterBuilder};
use geo::{Coord, Geometry, LineString, Polygon};
use shapefile::{Multipoint, Point, PolygonRing, Polyline, Shape, ShapeType, ShapeWriter};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ExportError, Result};
use crate::io::encoder::{ExportSummary, FeatureEncoder, Spool};
use crate::record::AttributeValue;
use crate::schema::{FieldType, GeometryKind, ProjectedRecord, ProjectedSchema};
use crate::value::{format_timestamp, id_value};

/// dBASE field names are at most 10 bytes.
pub const MAX_NAME_LEN: usize = 10;

const INTEGER_WIDTH: u8 = 20;
const DOUBLE_WIDTH: u8 = 24;
const DOUBLE_DECIMALS: u8 = 15;
const TEXT_WIDTH: u8 = 254;
const TIMESTAMP_WIDTH: u8 = 24;

/// The shape type a layer of `kind` is stored as. `None` for collections, which have no
/// shapefile representation.
fn shape_type_for(kind: GeometryKind) -> Option<ShapeType> {
    match kind {
        GeometryKind::Point => Some(ShapeType::Point),
        GeometryKind::MultiPoint => Some(ShapeType::Multipoint),
        GeometryKind::LineString | GeometryKind::MultiLineString => Some(ShapeType::Polyline),
        GeometryKind::Polygon | GeometryKind::MultiPolygon => Some(ShapeType::Polygon),
        GeometryKind::GeometryCollection => None,
    }
}

/// One column of the attribute table.
#[derive(Debug, Clone)]
struct Column {
    name: String,
    source: String,
    field_type: FieldType,
}

impl Column {
    fn new(source: &str, field_type: FieldType) -> Self {
        Self {
            name: truncate(source, MAX_NAME_LEN).to_string(),
            source: source.to_string(),
            field_type,
        }
    }

    fn add_to(&self, builder: TableWriterBuilder) -> Result<TableWriterBuilder> {
        let name = FieldName::try_from(self.name.as_str())
            .map_err(|err| ExportError::InvalidConfiguration(format!("{}: {err}", self.source)))?;
        Ok(match self.field_type {
            FieldType::Integer => builder.add_numeric_field(name, INTEGER_WIDTH, 0),
            FieldType::Double => builder.add_numeric_field(name, DOUBLE_WIDTH, DOUBLE_DECIMALS),
            FieldType::Boolean => builder.add_logical_field(name),
            FieldType::Text => builder.add_character_field(name, TEXT_WIDTH),
            FieldType::Timestamp => builder.add_character_field(name, TIMESTAMP_WIDTH),
        })
    }

    /// The cell for `value`. Values of the wrong type are written as null.
    fn value(&self, value: &AttributeValue) -> FieldValue {
        match self.field_type {
            FieldType::Integer => FieldValue::Numeric(match value {
                AttributeValue::Integer(v) => Some(*v as f64),
                _ => None,
            }),
            FieldType::Double => FieldValue::Numeric(match value {
                AttributeValue::Double(v) => self.fitting_double(*v),
                _ => None,
            }),
            FieldType::Boolean => FieldValue::Logical(match value {
                AttributeValue::Boolean(v) => Some(*v),
                _ => None,
            }),
            FieldType::Text => FieldValue::Character(match value {
                AttributeValue::Text(v) => {
                    let truncated = truncate(v, usize::from(TEXT_WIDTH));
                    if truncated.len() < v.len() {
                        warn!(field = %self.source, "text value truncated to {TEXT_WIDTH} bytes");
                    }
                    Some(truncated.to_string())
                }
                _ => None,
            }),
            FieldType::Timestamp => FieldValue::Character(match value {
                AttributeValue::Timestamp(v) => Some(format_timestamp(v)),
                _ => None,
            }),
        }
    }

    fn fitting_double(&self, value: f64) -> Option<f64> {
        let decimals = usize::from(DOUBLE_DECIMALS);
        if value.is_finite() && format!("{value:.decimals$}").len() <= usize::from(DOUBLE_WIDTH) {
            Some(value)
        } else {
            warn!(field = %self.source, value, "value does not fit a dBASE numeric field, writing null");
            None
        }
    }
}

/// The longest prefix of `value` that is at most `max` bytes and ends on a char boundary.
fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// The identifier column followed by the projected fields. Field names are truncated to
/// [`MAX_NAME_LEN`] bytes, and names that collide after truncation (ignoring ASCII case) are
/// rejected.
fn columns(schema: &ProjectedSchema) -> Result<Vec<Column>> {
    let columns = std::iter::once(Column::new(&schema.id_field, schema.id_type))
        .chain(
            schema
                .fields
                .iter()
                .map(|field| Column::new(&field.name, field.field_type)),
        )
        .collect::<Vec<_>>();

    let mut seen = HashSet::with_capacity(columns.len());
    for column in &columns {
        if column.name.is_empty() {
            return Err(ExportError::InvalidConfiguration(
                "shapefile fields need a name".to_string(),
            ));
        }
        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(ExportError::InvalidConfiguration(format!(
                "field {} collides with another field once truncated to the shapefile name limit of {MAX_NAME_LEN} bytes",
                column.source
            )));
        }
    }
    Ok(columns)
}

fn to_point(coord: &Coord<f64>) -> Point {
    Point::new(coord.x, coord.y)
}

fn to_points(line: &LineString<f64>) -> Vec<Point> {
    line.coords().map(to_point).collect()
}

fn polyline(lines: &[&LineString<f64>]) -> Result<Shape> {
    let parts = lines
        .iter()
        .filter(|line| !line.0.is_empty())
        .map(|line| to_points(line))
        .collect::<Vec<_>>();
    if parts.is_empty() || parts.iter().any(|part| part.len() < 2) {
        return Err(ExportError::RecordSkipped(
            "shapefile polylines need two points per part".to_string(),
        ));
    }
    Ok(Shape::Polyline(Polyline::with_parts(parts)))
}

fn polygon(polygons: &[Polygon<f64>]) -> Result<Shape> {
    let mut rings = vec![];
    for polygon in polygons {
        if polygon.exterior().0.is_empty() {
            continue;
        }
        rings.push(PolygonRing::Outer(to_points(polygon.exterior())));
        rings.extend(
            polygon
                .interiors()
                .iter()
                .filter(|ring| !ring.0.is_empty())
                .map(|ring| PolygonRing::Inner(to_points(ring))),
        );
    }
    if rings.is_empty() {
        return Err(ExportError::RecordSkipped(
            "empty polygons have no shapefile representation".to_string(),
        ));
    }
    Ok(Shape::Polygon(shapefile::Polygon::with_rings(rings)))
}

/// Convert `geometry` into a shape of the layer's `shape_type`.
///
/// Ring orientation is left to `shapefile`, which orders exterior rings clockwise and holes
/// counterclockwise.
fn to_shape(geometry: &Geometry<f64>, shape_type: ShapeType) -> Result<Shape> {
    match (shape_type, geometry) {
        (ShapeType::Point, Geometry::Point(point)) => Ok(Shape::Point(to_point(&point.0))),
        (ShapeType::Multipoint, Geometry::Point(point)) => {
            Ok(Shape::Multipoint(Multipoint::new(vec![to_point(&point.0)])))
        }
        (ShapeType::Multipoint, Geometry::MultiPoint(points)) if !points.0.is_empty() => Ok(
            Shape::Multipoint(Multipoint::new(points.iter().map(|p| to_point(&p.0)).collect())),
        ),
        (ShapeType::Polyline, Geometry::Line(line)) => {
            polyline(&[&LineString::new(vec![line.start, line.end])])
        }
        (ShapeType::Polyline, Geometry::LineString(line)) => polyline(&[line]),
        (ShapeType::Polyline, Geometry::MultiLineString(lines)) => {
            polyline(&lines.iter().collect::<Vec<_>>())
        }
        (ShapeType::Polygon, Geometry::Polygon(p)) => polygon(std::slice::from_ref(p)),
        (ShapeType::Polygon, Geometry::MultiPolygon(p)) => polygon(&p.0),
        (ShapeType::Polygon, Geometry::Rect(rect)) => polygon(&[rect.to_polygon()]),
        (ShapeType::Polygon, Geometry::Triangle(triangle)) => polygon(&[triangle.to_polygon()]),
        (shape_type, geometry) => Err(ExportError::RecordSkipped(format!(
            "{} geometry in a {shape_type:?} shapefile",
            GeometryKind::of(geometry).as_str()
        ))),
    }
}

/// `ShapeWriter` writes the `.shp` and `.shx` headers along with the first shape. A layer
/// without any shape still needs them to be readable.
fn write_empty_header(mut file: &File, shape_type: ShapeType) -> Result<()> {
    let code = match shape_type {
        ShapeType::Point => 1,
        ShapeType::Polyline => 3,
        ShapeType::Polygon => 5,
        ShapeType::Multipoint => 8,
        _ => 0,
    };
    let mut header = Vec::with_capacity(100);
    header.write_i32::<BigEndian>(9994)?;
    header.extend_from_slice(&[0; 20]);
    // File length in 16-bit words.
    header.write_i32::<BigEndian>(50)?;
    header.write_i32::<LittleEndian>(1000)?;
    header.write_i32::<LittleEndian>(code)?;
    // Extent, then Z and M ranges
    header.extend_from_slice(&[0; 64]);
    file.write_all(&header)?;
    Ok(())
}

/// Writes a zipped ESRI shapefile: `.shp`, `.shx`, `.dbf`, `.cpg` and, when the CRS has a known
/// definition, `.prj`.
///
/// Shapes go through a [`ShapeWriter`] and attributes through a dBASE [`TableWriter`], each into
/// a local temporary file. Both patch their header totals when closed by
/// [`finish`](FeatureEncoder::finish), which then zips the members.
pub struct ShapefileEncoder {
    schema: ProjectedSchema,
    layer_name: String,
    columns: Vec<Column>,
    /// Fixed by the declared geometry type, otherwise by the first record with a geometry.
    shape_type: Option<ShapeType>,
    shapes: Option<ShapeWriter<BufWriter<File>>>,
    table: Option<TableWriter<BufWriter<File>>>,
    /// Second handles on the temporary files, read back once the writers are closed.
    shp: File,
    shx: File,
    dbf: File,
    records: u32,
}

impl ShapefileEncoder {
    pub fn try_new(schema: &ProjectedSchema, layer_name: &str) -> Result<Self> {
        let shape_type = match schema.geometry_type {
            Some(kind) => Some(shape_type_for(kind).ok_or_else(|| {
                ExportError::InvalidConfiguration(format!(
                    "shapefiles cannot hold {} layers",
                    kind.as_str()
                ))
            })?),
            None => None,
        };

        let columns = columns(schema)?;
        let mut builder = TableWriterBuilder::new();
        for column in &columns {
            builder = column.add_to(builder)?;
        }

        let shp = tempfile::tempfile()?;
        let shx = tempfile::tempfile()?;
        let dbf = tempfile::tempfile()?;
        let shapes = ShapeWriter::with_shx(
            BufWriter::new(shp.try_clone()?),
            BufWriter::new(shx.try_clone()?),
        );
        let table = builder.build_with_dest(BufWriter::new(dbf.try_clone()?));

        Ok(Self {
            schema: schema.clone(),
            layer_name: layer_name.to_string(),
            columns,
            shape_type,
            shapes: Some(shapes),
            table: Some(table),
            shp,
            shx,
            dbf,
            records: 0,
        })
    }

    fn layer_shape_type(&mut self, record: &ProjectedRecord) -> Result<ShapeType> {
        if let Some(shape_type) = self.shape_type {
            return Ok(shape_type);
        }
        let kind = GeometryKind::of(&record.geometry);
        let shape_type = shape_type_for(kind).ok_or_else(|| {
            ExportError::RecordSkipped(format!("shapefiles cannot hold {}", kind.as_str()))
        })?;
        self.shape_type = Some(shape_type);
        Ok(shape_type)
    }

    fn write_shape(&mut self, shape: &Shape) -> Result<()> {
        let writer = self
            .shapes
            .as_mut()
            .ok_or_else(|| ExportError::General("shapefile already finished".to_string()))?;
        match shape {
            Shape::Point(point) => writer.write_shape(point)?,
            Shape::Multipoint(points) => writer.write_shape(points)?,
            Shape::Polyline(line) => writer.write_shape(line)?,
            Shape::Polygon(polygon) => writer.write_shape(polygon)?,
            _ => {
                return Err(ExportError::RecordSkipped(
                    "only 2D shapes are written".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Close both writers so their headers carry the totals, then rewind the files.
    fn close(&mut self) -> Result<()> {
        if let Some(mut table) = self.table.take() {
            table.close()?;
        }
        // Dropping the shape writer writes its headers.
        drop(self.shapes.take());

        if self.records == 0 {
            let shape_type = self.shape_type.unwrap_or(ShapeType::NullShape);
            write_empty_header(&self.shp, shape_type)?;
            write_empty_header(&self.shx, shape_type)?;
        }
        for file in [&mut self.shp, &mut self.shx, &mut self.dbf] {
            file.rewind()?;
        }
        Ok(())
    }

    fn archive(&mut self) -> Result<File> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(tempfile::tempfile()?);
        let name = &self.layer_name;

        for (extension, member) in [
            ("shp", &mut self.shp),
            ("shx", &mut self.shx),
            ("dbf", &mut self.dbf),
        ] {
            zip.start_file(format!("{name}.{extension}"), options)?;
            std::io::copy(member, &mut zip)?;
        }

        zip.start_file(format!("{name}.cpg"), options)?;
        zip.write_all(b"UTF-8")?;

        if let Some(prj) = self.schema.crs.as_ref().and_then(|crs| crs.to_wkt()) {
            zip.start_file(format!("{name}.prj"), options)?;
            zip.write_all(prj.as_bytes())?;
        }

        Ok(zip.finish()?)
    }
}

impl std::fmt::Debug for ShapefileEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapefileEncoder")
            .field("layer_name", &self.layer_name)
            .field("shape_type", &self.shape_type)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl FeatureEncoder for ShapefileEncoder {
    fn begin(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn encode(&mut self, record: &ProjectedRecord, _out: &mut Vec<u8>) -> Result<()> {
        let id = id_value(&record.id, self.schema.id_type)?;
        let shape_type = self.layer_shape_type(record)?;
        let shape = to_shape(&record.geometry, shape_type)?;

        let mut row = dbase::Record::default();
        for (column, value) in self.columns.iter().zip(std::iter::once(&id).chain(&record.values)) {
            row.insert(column.name.clone(), column.value(value));
        }

        self.write_shape(&shape)?;
        self.table
            .as_mut()
            .ok_or_else(|| ExportError::General("shapefile already finished".to_string()))?
            .write_record(&row)?;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self, _summary: &ExportSummary, _out: &mut Vec<u8>) -> Result<Option<Spool>> {
        self.close()?;
        let archive = self.archive()?;
        let spool = Spool::new(archive)?;
        debug!(
            records = self.records,
            bytes = spool.len(),
            "assembled shapefile archive"
        );
        Ok(Some(spool))
    }

    fn spools(&self) -> bool {
        true
    }
}
