use std::io::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use geo::{Coord, Geometry, LineString, Point, Polygon};

use crate::error::{ExportError, Result};
use crate::io::wkb::common::{Endianness, WKBType};

const HEADER_SIZE: usize = 1 + 4;
const COORD_SIZE: usize = 2 * 8;

fn line_string_body_size(line_string: &LineString) -> usize {
    4 + line_string.0.len() * COORD_SIZE
}

fn polygon_body_size(polygon: &Polygon) -> usize {
    if polygon.exterior().0.is_empty() {
        return 4;
    }
    4 + line_string_body_size(polygon.exterior())
        + polygon
            .interiors()
            .iter()
            .map(line_string_body_size)
            .sum::<usize>()
}

/// The byte length of `geom` encoded as 2D ISO WKB.
pub fn geometry_wkb_size(geom: &Geometry) -> usize {
    HEADER_SIZE
        + match geom {
            Geometry::Point(_) => COORD_SIZE,
            Geometry::Line(_) => 4 + 2 * COORD_SIZE,
            Geometry::LineString(g) => line_string_body_size(g),
            Geometry::Polygon(g) => polygon_body_size(g),
            Geometry::MultiPoint(g) => 4 + g.0.len() * (HEADER_SIZE + COORD_SIZE),
            Geometry::MultiLineString(g) => {
                4 + g
                    .iter()
                    .map(|ls| HEADER_SIZE + line_string_body_size(ls))
                    .sum::<usize>()
            }
            Geometry::MultiPolygon(g) => {
                4 + g
                    .iter()
                    .map(|p| HEADER_SIZE + polygon_body_size(p))
                    .sum::<usize>()
            }
            Geometry::GeometryCollection(g) => 4 + g.iter().map(geometry_wkb_size).sum::<usize>(),
            Geometry::Rect(g) => polygon_body_size(&g.to_polygon()),
            Geometry::Triangle(g) => polygon_body_size(&g.to_polygon()),
        }
}

/// Write a geometry to a Writer encoded as 2D ISO WKB with the given byte order.
pub fn write_geometry_as_wkb<W: Write>(
    mut writer: W,
    geom: &Geometry,
    endianness: Endianness,
) -> Result<()> {
    match endianness {
        Endianness::LittleEndian => WkbWriter::<LittleEndian, _>::new(&mut writer).geometry(geom),
        Endianness::BigEndian => WkbWriter::<BigEndian, _>::new(&mut writer).geometry(geom),
    }
}

/// Encode a geometry as little-endian ISO WKB.
pub fn to_wkb(geom: &Geometry) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(geometry_wkb_size(geom));
    write_geometry_as_wkb(&mut out, geom, Endianness::LittleEndian)?;
    Ok(out)
}

struct WkbWriter<B: ByteOrder, W: Write> {
    writer: W,
    endianness: Endianness,
    _order: std::marker::PhantomData<B>,
}

impl<B: ByteOrder, W: Write> WkbWriter<B, W> {
    fn new(writer: W) -> Self {
        // The marker byte has to agree with the byteorder type parameter.
        let endianness = if B::read_u16(&[1, 0]) == 1 {
            Endianness::LittleEndian
        } else {
            Endianness::BigEndian
        };
        Self {
            writer,
            endianness,
            _order: std::marker::PhantomData,
        }
    }

    fn header(&mut self, wkb_type: WKBType) -> Result<()> {
        self.writer.write_u8(self.endianness.into())?;
        self.writer.write_u32::<B>(wkb_type.into())?;
        Ok(())
    }

    fn count(&mut self, n: usize) -> Result<()> {
        let n = u32::try_from(n)
            .map_err(|_| ExportError::RecordSkipped(format!("{n} elements exceed WKB limits")))?;
        self.writer.write_u32::<B>(n)?;
        Ok(())
    }

    fn coord(&mut self, coord: &Coord) -> Result<()> {
        self.writer.write_f64::<B>(coord.x)?;
        self.writer.write_f64::<B>(coord.y)?;
        Ok(())
    }

    fn coords<'a>(&mut self, coords: impl ExactSizeIterator<Item = &'a Coord>) -> Result<()> {
        self.count(coords.len())?;
        for coord in coords {
            self.coord(coord)?;
        }
        Ok(())
    }

    fn point(&mut self, point: &Point) -> Result<()> {
        self.header(WKBType::Point)?;
        self.coord(&point.0)
    }

    fn line_string(&mut self, line_string: &LineString) -> Result<()> {
        self.header(WKBType::LineString)?;
        self.coords(line_string.0.iter())
    }

    fn polygon(&mut self, polygon: &Polygon) -> Result<()> {
        self.header(WKBType::Polygon)?;
        if polygon.exterior().0.is_empty() {
            return self.count(0);
        }
        self.count(1 + polygon.interiors().len())?;
        self.coords(polygon.exterior().0.iter())?;
        for interior in polygon.interiors() {
            self.coords(interior.0.iter())?;
        }
        Ok(())
    }

    fn geometry(&mut self, geom: &Geometry) -> Result<()> {
        match geom {
            Geometry::Point(g) => self.point(g),
            Geometry::Line(g) => {
                self.header(WKBType::LineString)?;
                self.coords([g.start, g.end].iter())
            }
            Geometry::LineString(g) => self.line_string(g),
            Geometry::Polygon(g) => self.polygon(g),
            Geometry::MultiPoint(g) => {
                self.header(WKBType::MultiPoint)?;
                self.count(g.0.len())?;
                g.iter().try_for_each(|p| self.point(p))
            }
            Geometry::MultiLineString(g) => {
                self.header(WKBType::MultiLineString)?;
                self.count(g.0.len())?;
                g.iter().try_for_each(|ls| self.line_string(ls))
            }
            Geometry::MultiPolygon(g) => {
                self.header(WKBType::MultiPolygon)?;
                self.count(g.0.len())?;
                g.iter().try_for_each(|p| self.polygon(p))
            }
            Geometry::GeometryCollection(g) => {
                self.header(WKBType::GeometryCollection)?;
                self.count(g.0.len())?;
                g.iter().try_for_each(|child| self.geometry(child))
            }
            Geometry::Rect(g) => self.polygon(&g.to_polygon()),
            Geometry::Triangle(g) => self.polygon(&g.to_polygon()),
        }
    }
}
