//! Write geometries as [Well-Known Text](https://libgeos.org/specifications/wkt/).

mod writer;

pub use writer::WktEncoder;

/// How records are laid out in WKT output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WktLayout {
    /// One WKT geometry per line, nothing else.
    #[default]
    GeometryOnly,
    /// CSV with the identifier, a `wkt` column and the projected attributes.
    WithAttributes,
}
