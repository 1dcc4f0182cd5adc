use std::io::Write;

use geo::Geometry;
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;

use crate::error::Result;
use crate::io::encoder::ensure_finite;
use crate::schema::{ProjectedRecord, ProjectedSchema};
use crate::value::to_json;

/// Write a bare GeoJSON geometry object.
pub(crate) fn write_geometry<W: Write>(geometry: &Geometry<f64>, out: W) -> Result<()> {
    let mut writer = GeoJsonWriter::new(out);
    geometry.process_geom(&mut writer)?;
    Ok(())
}

/// Write one GeoJSON `Feature` object. The identifier goes to the top-level `id` member,
/// projected attributes to `properties`. Geometries with NaN or infinite coordinates are
/// skipped.
pub(crate) fn write_feature(
    record: &ProjectedRecord,
    schema: &ProjectedSchema,
    out: &mut Vec<u8>,
) -> Result<()> {
    ensure_finite(&record.geometry)?;
    out.extend_from_slice(br#"{"type":"Feature","id":"#);
    serde_json::to_writer(&mut *out, &record.id)?;
    out.extend_from_slice(br#","geometry":"#);
    write_geometry(&record.geometry, &mut *out)?;
    out.extend_from_slice(br#","properties":"#);
    write_properties(record, schema, out)?;
    out.push(b'}');
    Ok(())
}

fn write_properties(
    record: &ProjectedRecord,
    schema: &ProjectedSchema,
    out: &mut Vec<u8>,
) -> Result<()> {
    out.push(b'{');
    for (i, (field, value)) in record.iter(schema).enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut *out, &field.name)?;
        out.push(b':');
        serde_json::to_writer(&mut *out, &to_json(value))?;
    }
    out.push(b'}');
    Ok(())
}
