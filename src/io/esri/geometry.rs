//! Esri JSON geometry objects.

use geo::orient::{Direction, Orient};
use geo::{Coord, Geometry, LineString, Polygon};
use serde_json::{json, Value};

use crate::error::{ExportError, Result};
use crate::schema::GeometryKind;

/// The `geometryType` of a layer of `kind`. `None` for collections, which Esri JSON cannot
/// represent.
pub fn esri_geometry_type(kind: GeometryKind) -> Option<&'static str> {
    match kind {
        GeometryKind::Point => Some("esriGeometryPoint"),
        GeometryKind::MultiPoint => Some("esriGeometryMultipoint"),
        GeometryKind::LineString | GeometryKind::MultiLineString => Some("esriGeometryPolyline"),
        GeometryKind::Polygon | GeometryKind::MultiPolygon => Some("esriGeometryPolygon"),
        GeometryKind::GeometryCollection => None,
    }
}

fn coord(coord: &Coord) -> Value {
    json!([coord.x, coord.y])
}

fn path(line_string: &LineString) -> Value {
    Value::Array(line_string.coords().map(coord).collect())
}

/// Esri rings run clockwise around the exterior and counterclockwise around holes.
fn rings<'a>(polygons: impl IntoIterator<Item = &'a Polygon>) -> Value {
    let mut rings = vec![];
    for polygon in polygons {
        let polygon = polygon.orient(Direction::Reversed);
        if polygon.exterior().0.is_empty() {
            continue;
        }
        rings.push(path(polygon.exterior()));
        rings.extend(polygon.interiors().iter().map(path));
    }
    json!({ "rings": rings })
}

/// The Esri JSON object of `geometry`, without `spatialReference`.
pub fn to_esri_geometry(geometry: &Geometry) -> Result<Value> {
    let value = match geometry {
        Geometry::Point(point) => json!({ "x": point.x(), "y": point.y() }),
        Geometry::MultiPoint(points) => {
            json!({ "points": points.iter().map(|p| coord(&p.0)).collect::<Vec<_>>() })
        }
        Geometry::Line(line) => json!({ "paths": [[coord(&line.start), coord(&line.end)]] }),
        Geometry::LineString(line_string) => json!({ "paths": [path(line_string)] }),
        Geometry::MultiLineString(lines) => {
            json!({ "paths": lines.iter().map(path).collect::<Vec<_>>() })
        }
        Geometry::Polygon(polygon) => rings([polygon]),
        Geometry::MultiPolygon(polygons) => rings(polygons),
        Geometry::Rect(rect) => rings([&rect.to_polygon()]),
        Geometry::Triangle(triangle) => rings([&triangle.to_polygon()]),
        Geometry::GeometryCollection(_) => {
            return Err(ExportError::RecordSkipped(
                "Esri JSON cannot represent geometry collections".to_string(),
            ))
        }
    };
    Ok(value)
}
