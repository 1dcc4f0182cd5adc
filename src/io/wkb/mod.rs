//! Write geometries as ISO-flavored [Well-Known Binary](https://libgeos.org/specifications/wkb/).

mod common;
mod writer;

use byteorder::{LittleEndian, WriteBytesExt};
use serde_json::{Map, Value};

pub use common::{Endianness, WKBType};
pub use writer::{geometry_wkb_size, to_wkb, write_geometry_as_wkb};

use crate::error::{ExportError, Result};
use crate::io::encoder::{append_record, ExportSummary, FeatureEncoder, Spool};
use crate::schema::{ProjectedRecord, ProjectedSchema};
use crate::value::to_json;

/// How records are laid out in WKB output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WkbLayout {
    /// Each record is a little-endian `u32` byte length followed by the WKB geometry.
    #[default]
    GeometryOnly,
    /// Each geometry frame is followed by a second length-prefixed frame holding a JSON object
    /// with the record's `id` and `properties`.
    WithAttributes,
}

/// Writes length-prefixed WKB frames. Geometries are little endian, like the frame lengths.
#[derive(Debug)]
pub struct WkbEncoder {
    layout: WkbLayout,
    schema: ProjectedSchema,
}

impl WkbEncoder {
    pub fn new(layout: WkbLayout, schema: ProjectedSchema) -> Self {
        Self { layout, schema }
    }
}

fn frame_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| ExportError::RecordSkipped(format!("{len} byte record exceeds frame size")))
}

impl FeatureEncoder for WkbEncoder {
    fn begin(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn encode(&mut self, record: &ProjectedRecord, out: &mut Vec<u8>) -> Result<()> {
        append_record(out, |out| {
            out.write_u32::<LittleEndian>(frame_len(geometry_wkb_size(&record.geometry))?)?;
            write_geometry_as_wkb(&mut *out, &record.geometry, Endianness::LittleEndian)?;

            if self.layout == WkbLayout::WithAttributes {
                let properties: Map<String, Value> = record
                    .iter(&self.schema)
                    .map(|(field, value)| (field.name.clone(), to_json(value)))
                    .collect();
                let sidecar = serde_json::to_vec(&serde_json::json!({
                    "id": record.id,
                    "properties": properties,
                }))?;
                out.write_u32::<LittleEndian>(frame_len(sidecar.len())?)?;
                out.extend_from_slice(&sidecar);
            }
            Ok(())
        })
    }

    fn finish(&mut self, _summary: &ExportSummary, _out: &mut Vec<u8>) -> Result<Option<Spool>> {
        Ok(None)
    }
}
