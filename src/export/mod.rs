//! Streaming exports: the request, the record source, the sink and the orchestrator that drives
//! records from one to the other.
//!
//! ```no_run
//! # async fn run() -> geoexport::error::Result<()> {
//! use geoexport::export::{ExportEngine, ExportFormat, StreamCursor, StreamingExportRequest};
//! use geoexport::schema::FieldSchema;
//!
//! let engine = ExportEngine::default();
//! let request = StreamingExportRequest::new("geojsonseq".parse::<ExportFormat>()?)
//!     .with_selected_fields(["name"])
//!     .with_limit(1000);
//! let mut cursor = StreamCursor::from_records(vec![]);
//! let mut sink = tokio::io::sink();
//! let outcome = engine
//!     .export(request, &FieldSchema::default(), &mut cursor, &mut sink)
//!     .await?;
//! assert!(!outcome.truncated);
//! # Ok(())
//! # }
//! ```

mod config;
mod cursor;
mod guard;
mod outcome;
mod pipeline;
mod request;
mod sink;

pub use config::{ExportConfig, FlatGeobufOptions, GeoParquetOptions, ParquetCompression};
pub use cursor::{FeatureCursor, StreamCursor};
pub use guard::{GuardDecision, TransferLimitGuard};
pub use outcome::{ExportOutcome, PipelineState};
pub use pipeline::ExportEngine;
pub use request::{ExportFormat, StreamingExportRequest};
pub use sink::SinkWriter;
