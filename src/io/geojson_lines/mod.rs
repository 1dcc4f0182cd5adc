//! Write [newline-delimited GeoJSON](https://stevage.github.io/ndgeojson/) and
//! [GeoJSON text sequences](https://www.rfc-editor.org/rfc/rfc8142).

mod writer;

pub use writer::GeoJsonLinesEncoder;
