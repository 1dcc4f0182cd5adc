//! Defines [`ExportError`], representing all errors returned by this crate.

use std::error::Error;

use thiserror::Error;

use crate::crs::Crs;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExportError {
    /// No transform path exists between two coordinate reference systems.
    ///
    /// Raised per record; the orchestrator skips the record and keeps streaming.
    #[error("no coordinate transform from {from} to {to}")]
    ReprojectionUnsupported { from: Crs, to: Crs },

    /// A transform exists but failed for one of the record's vertices.
    #[error("coordinate transform failed: {0}")]
    TransformFailed(String),

    /// The record cannot be represented by the target encoding.
    #[error("record skipped: {0}")]
    RecordSkipped(String),

    /// Writing to the output sink failed. Bytes already flushed are not retracted.
    #[error("writing to the export sink failed: {0}")]
    WriterSinkFailure(#[source] std::io::Error),

    /// The export was cancelled, explicitly or by its deadline.
    #[error("export cancelled")]
    ExportCancelled,

    /// The requested encoding name or media type is not known.
    #[error("unknown export format: {0}")]
    UnknownFormat(String),

    /// The request cannot be satisfied by the selected encoding.
    #[error("invalid export configuration: {0}")]
    InvalidConfiguration(String),

    /// The feature cursor failed.
    #[error("feature cursor error: {0}")]
    Cursor(Box<dyn Error + Send + Sync>),

    /// [arrow_schema::ArrowError]
    #[cfg(feature = "parquet")]
    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),

    /// [parquet::errors::ParquetError]
    #[cfg(feature = "parquet")]
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    /// [geozero::error::GeozeroError]
    #[error(transparent)]
    Geozero(#[from] geozero::error::GeozeroError),

    /// [flatgeobuf::Error]
    #[cfg(feature = "flatgeobuf")]
    #[error(transparent)]
    FlatGeobuf(#[from] flatgeobuf::Error),

    /// [zip::result::ZipError]
    #[cfg(feature = "shp")]
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// [shapefile::Error]
    #[cfg(feature = "shp")]
    #[error(transparent)]
    Shapefile(#[from] shapefile::Error),

    /// [dbase::Error]
    #[cfg(feature = "shp")]
    #[error(transparent)]
    Dbase(#[from] dbase::Error),

    /// [serde_json::Error]
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// [std::io::Error] raised while writing local spool files.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

impl ExportError {
    /// Errors that only affect a single record. The record is skipped and the export continues.
    pub fn is_record_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ReprojectionUnsupported { .. } | Self::TransformFailed(_) | Self::RecordSkipped(_)
        )
    }

    /// Errors raised before any byte was written to the sink.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnknownFormat(_) | Self::InvalidConfiguration(_))
    }
}

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, ExportError>;
