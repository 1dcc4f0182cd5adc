//! The streaming pipeline orchestrator.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::algorithm::reproject::{Reprojector, TransformRegistry};
use crate::error::{ExportError, Result};
use crate::export::config::ExportConfig;
use crate::export::cursor::FeatureCursor;
use crate::export::guard::{GuardDecision, TransferLimitGuard};
use crate::export::outcome::{ExportOutcome, PipelineState};
use crate::export::request::StreamingExportRequest;
use crate::export::sink::SinkWriter;
use crate::io::encoder::{
    append_record, DefaultEncoderFactory, EncoderFactory, ExportSummary, FeatureEncoder,
};
use crate::record::FeatureId;
use crate::schema::{FieldProjection, FieldSchema, ProjectedRecord};
use crate::value::ValueMapper;

/// How long a cancelled export may spend delivering the whole records it already encoded.
const ABORT_FLUSH_GRACE: Duration = Duration::from_secs(1);

/// Runs exports.
///
/// The engine itself holds no per-export state: it is cheap to clone and may run any number of
/// exports concurrently. Every export gets its own encoder, reprojector, guard and buffers.
#[derive(Clone)]
pub struct ExportEngine {
    encoders: Arc<dyn EncoderFactory>,
    transforms: Arc<TransformRegistry>,
    config: ExportConfig,
}

impl std::fmt::Debug for ExportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportEngine")
            .field("transforms", &self.transforms)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ExportEngine {
    fn default() -> Self {
        Self::new(ExportConfig::default())
    }
}

impl ExportEngine {
    /// An engine with the encoders and built-in transforms of this crate.
    pub fn new(config: ExportConfig) -> Self {
        Self {
            encoders: Arc::new(DefaultEncoderFactory),
            transforms: Arc::new(TransformRegistry::default()),
            config,
        }
    }

    pub fn with_encoders(mut self, encoders: Arc<dyn EncoderFactory>) -> Self {
        self.encoders = encoders;
        self
    }

    pub fn with_transforms(mut self, transforms: Arc<TransformRegistry>) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Stream every record of `cursor` to `sink` in the requested encoding.
    ///
    /// Configuration failures are returned before anything is written. Records that cannot be
    /// reprojected or encoded are skipped. Cancellation, explicit or by the request's deadline,
    /// is not an error: the outcome is returned with [`PipelineState::Cancelled`]. Sink and
    /// cursor failures are returned as errors, after which the output must be treated as broken.
    pub async fn export<C, W>(
        &self,
        request: StreamingExportRequest,
        schema: &FieldSchema,
        cursor: &mut C,
        sink: &mut W,
    ) -> Result<ExportOutcome>
    where
        C: FeatureCursor + ?Sized,
        W: AsyncWrite + Send + Unpin + ?Sized,
    {
        let span = info_span!(
            "export",
            format = %request.format,
            limit = ?request.limit,
            target_crs = ?request.target_crs.as_ref().map(ToString::to_string),
        );
        self.run(request, schema, cursor, sink).instrument(span).await
    }

    /// Run [`export`](Self::export) as its own task.
    pub fn start_export<C, W>(
        &self,
        request: StreamingExportRequest,
        schema: Arc<FieldSchema>,
        mut cursor: C,
        mut sink: W,
    ) -> JoinHandle<Result<ExportOutcome>>
    where
        C: FeatureCursor + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let engine = self.clone();
        tokio::spawn(async move {
            engine
                .export(request, &schema, &mut cursor, &mut sink)
                .await
        })
    }

    async fn run<C, W>(
        &self,
        request: StreamingExportRequest,
        schema: &FieldSchema,
        cursor: &mut C,
        sink: &mut W,
    ) -> Result<ExportOutcome>
    where
        C: FeatureCursor + ?Sized,
        W: AsyncWrite + Send + Unpin + ?Sized,
    {
        let projection = request.projection(schema)?;
        let mut encoder = self
            .encoders
            .create(&request.format, projection.schema(), &self.config)?;

        let cancel = request.cancel.child_token();
        let _watchdog = request
            .deadline
            .map(|deadline| Watchdog::spawn(deadline, cancel.clone()));

        info!(
            fields = projection.schema().len(),
            count_hint = ?cursor.count_hint(),
            "starting export"
        );
        let mut export = Export {
            sink: SinkWriter::new(sink, cancel.clone()),
            cursor,
            projection,
            reprojector: Reprojector::new(self.transforms.clone(), request.target_crs.clone()),
            guard: TransferLimitGuard::new(request.limit),
            cancel,
            buf: Vec::with_capacity(self.config.flush_threshold.min(1024 * 1024)),
            config: &self.config,
            state: PipelineState::Idle,
            skipped: 0,
            nulled: 0,
        };

        let result = match export.stream(encoder.as_mut()).await {
            Ok(()) => export.complete(encoder).await,
            Err(ExportError::ExportCancelled) => {
                export.abort(encoder.as_mut()).await;
                Err(ExportError::ExportCancelled)
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                export.transition(PipelineState::Completed);
                let outcome = export.outcome();
                info!(
                    records = outcome.records_written,
                    bytes = outcome.bytes_written,
                    truncated = outcome.truncated,
                    skipped = outcome.skipped_records,
                    nulled = outcome.nulled_values,
                    "export completed"
                );
                Ok(outcome)
            }
            Err(ExportError::ExportCancelled) => {
                export.transition(PipelineState::Cancelled);
                export.cursor.cancel().await;
                let outcome = export.outcome();
                info!(
                    records = outcome.records_written,
                    bytes = outcome.bytes_written,
                    deadline = !request.cancel.is_cancelled(),
                    "export cancelled"
                );
                Ok(outcome)
            }
            Err(err) => {
                export.transition(PipelineState::Failed);
                export.cursor.cancel().await;
                warn!(
                    error = %err,
                    records = export.guard.count(),
                    bytes = export.sink.bytes_written(),
                    "export failed"
                );
                Err(err)
            }
        }
    }
}

/// Cancels an export once its deadline expires. Stops when dropped.
struct Watchdog(JoinHandle<()>);

impl Watchdog {
    fn spawn(deadline: Duration, cancel: CancellationToken) -> Self {
        let task = async move {
            tokio::time::sleep(deadline).await;
            info!(?deadline, "export deadline expired");
            cancel.cancel();
        };
        Self(tokio::spawn(task.in_current_span()))
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The state of one running export.
struct Export<'a, C: ?Sized, W: ?Sized> {
    cursor: &'a mut C,
    sink: SinkWriter<'a, W>,
    projection: FieldProjection,
    reprojector: Reprojector,
    guard: TransferLimitGuard,
    cancel: CancellationToken,
    /// Encoded records not yet written to the sink.
    buf: Vec<u8>,
    config: &'a ExportConfig,
    state: PipelineState,
    skipped: u64,
    nulled: u64,
}

impl<'a, C, W> Export<'a, C, W>
where
    C: FeatureCursor + ?Sized,
    W: AsyncWrite + Send + Unpin + ?Sized,
{
    fn transition(&mut self, state: PipelineState) {
        debug!(from = %self.state, to = %state, "export state");
        self.state = state;
    }

    fn skip(&mut self, id: &FeatureId, err: &ExportError) {
        warn!(%id, error = %err, "skipping record");
        self.skipped += 1;
    }

    /// Pull, transform and encode records until the cursor is exhausted or the transfer limit is
    /// reached.
    async fn stream(&mut self, encoder: &mut dyn FeatureEncoder) -> Result<()> {
        encoder.begin(&mut self.buf)?;
        self.transition(PipelineState::Streaming);

        let mapper = ValueMapper;
        loop {
            let cursor = &mut *self.cursor;
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ExportError::ExportCancelled),
                next = cursor.next_record(&self.cancel) => next?,
            };
            let Some(record) = next else {
                debug!("cursor exhausted");
                break;
            };

            let ProjectedRecord {
                id,
                geometry,
                crs,
                values,
            } = self.projection.project(record);
            let (geometry, crs) = match self.reprojector.reproject(geometry, crs) {
                Ok(reprojected) => reprojected,
                Err(err) if err.is_record_recoverable() => {
                    self.skip(&id, &err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            if self.guard.check_and_count() == GuardDecision::Truncate {
                info!(limit = ?self.guard.limit(), "transfer limit reached, truncating output");
                break;
            }

            let mut record = ProjectedRecord {
                id,
                geometry,
                crs,
                values,
            };
            self.nulled += u64::from(mapper.conform(&mut record, self.projection.schema()));

            match encoder.encode(&record, &mut self.buf) {
                Ok(()) => {}
                Err(err) if err.is_record_recoverable() => {
                    self.guard.release();
                    self.skip(&record.id, &err);
                }
                Err(err) => return Err(err),
            }

            if self.buf.len() >= self.config.flush_threshold {
                self.sink.write(&mut self.buf).await?;
            }
        }
        Ok(())
    }

    /// Close the output and deliver whatever is left of it.
    async fn complete(&mut self, mut encoder: Box<dyn FeatureEncoder>) -> Result<()> {
        let summary = ExportSummary {
            records_written: self.guard.count(),
            truncated: self.guard.is_truncated(),
            number_matched: self.cursor.count_hint(),
        };

        let spool = if encoder.spools() {
            let mut buf = std::mem::take(&mut self.buf);
            let (buf, spool) = tokio::task::spawn_blocking(move || {
                let spool = encoder.finish(&summary, &mut buf);
                (buf, spool)
            })
            .await
            .map_err(|err| ExportError::General(format!("assembling output failed: {err}")))?;
            self.buf = buf;
            spool?
        } else {
            encoder.finish(&summary, &mut self.buf)?
        };

        self.sink.write(&mut self.buf).await?;
        if let Some(spool) = spool {
            self.sink
                .copy_spool(spool, self.config.spool_chunk_size)
                .await?;
        }
        self.sink.flush().await
    }

    /// Deliver the records encoded before cancellation, then give the encoder its say.
    async fn abort(&mut self, encoder: &mut dyn FeatureEncoder) {
        if let Err(err) = append_record(&mut self.buf, |out| encoder.abort(out)) {
            debug!(error = %err, "encoder abort failed");
        }
        if let Err(err) = self
            .sink
            .write_after_cancel(&mut self.buf, ABORT_FLUSH_GRACE)
            .await
        {
            warn!(error = %err, "could not deliver output of cancelled export");
        }
    }

    fn outcome(&self) -> ExportOutcome {
        ExportOutcome {
            state: self.state,
            records_written: self.guard.count(),
            truncated: self.guard.is_truncated(),
            bytes_written: self.sink.bytes_written(),
            skipped_records: self.skipped,
            nulled_values: self.nulled,
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::crs::Crs;
    use crate::export::{ExportFormat, StreamCursor};
    use crate::io::wkt::WktLayout;
    use crate::record::FeatureRecord;
    use crate::test::{point, properties};

    /// Yields `records`, then stalls forever on the pull numbered `stall_at`, ignoring the
    /// cancellation token it is handed.
    struct MockCursor {
        records: std::vec::IntoIter<FeatureRecord>,
        pulled: usize,
        stall_at: Option<usize>,
        cancel_on_stall: Option<CancellationToken>,
        cancelled: bool,
    }

    impl MockCursor {
        fn new(records: Vec<FeatureRecord>) -> Self {
            Self {
                records: records.into_iter(),
                pulled: 0,
                stall_at: None,
                cancel_on_stall: None,
                cancelled: false,
            }
        }

        fn stall_at(mut self, pull: usize, cancel: Option<CancellationToken>) -> Self {
            self.stall_at = Some(pull);
            self.cancel_on_stall = cancel;
            self
        }
    }

    #[async_trait]
    impl FeatureCursor for MockCursor {
        async fn next_record(
            &mut self,
            _cancel: &CancellationToken,
        ) -> Result<Option<FeatureRecord>> {
            if Some(self.pulled) == self.stall_at {
                if let Some(token) = &self.cancel_on_stall {
                    token.cancel();
                }
                std::future::pending::<()>().await;
            }
            self.pulled += 1;
            Ok(self.records.next())
        }

        async fn cancel(&mut self) {
            self.cancelled = true;
        }
    }

    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn lines(output: &[u8]) -> Vec<Value> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn exports_every_record() {
        let engine = ExportEngine::default();
        let mut cursor = StreamCursor::from_records(properties::records());
        let mut sink = vec![];
        let outcome = engine
            .export(
                StreamingExportRequest::new(ExportFormat::GeoJsonLines),
                &properties::schema(),
                &mut cursor,
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(outcome.state, PipelineState::Completed);
        assert_eq!(outcome.records_written, 3);
        assert!(!outcome.truncated);
        assert_eq!(outcome.bytes_written, sink.len() as u64);
        assert_eq!(lines(&sink).len(), 3);
    }

    #[tokio::test]
    async fn small_flush_threshold() {
        let config = ExportConfig {
            flush_threshold: 1,
            ..Default::default()
        };
        let engine = ExportEngine::new(config);
        let mut cursor = StreamCursor::from_records(point::records(50));
        let mut sink = vec![];
        let outcome = engine
            .export(
                StreamingExportRequest::new(ExportFormat::GeoJson),
                &FieldSchema::default(),
                &mut cursor,
                &mut sink,
            )
            .await
            .unwrap();
        assert_eq!(outcome.bytes_written, sink.len() as u64);

        let collection: Value = serde_json::from_slice(&sink).unwrap();
        assert_eq!(collection["features"].as_array().unwrap().len(), 50);
        assert_eq!(collection["numberMatched"], 50);
    }

    #[tokio::test]
    async fn limit_truncates_only_when_more_records_exist() {
        let engine = ExportEngine::default();
        for (limit, written, truncated) in [(2, 2, true), (3, 3, false), (0, 0, true)] {
            let mut cursor = StreamCursor::from_records(properties::records());
            let mut sink = vec![];
            let outcome = engine
                .export(
                    StreamingExportRequest::new(ExportFormat::GeoJsonSeq).with_limit(limit),
                    &properties::schema(),
                    &mut cursor,
                    &mut sink,
                )
                .await
                .unwrap();
            assert_eq!(outcome.records_written, written);
            assert_eq!(outcome.truncated, truncated);
            assert_eq!(sink.iter().filter(|b| **b == 0x1E).count() as u64, written);
        }
    }

    #[tokio::test]
    async fn skipped_records_do_not_count_against_the_limit() {
        let engine = ExportEngine::default();
        let mut records = point::records(4);
        records[1].crs = Crs::Other("ESRI:54009".to_string());
        let mut cursor = StreamCursor::from_records(records);
        let mut sink = vec![];
        let outcome = engine
            .export(
                StreamingExportRequest::new(ExportFormat::GeoJsonLines)
                    .with_target_crs(Crs::web_mercator())
                    .with_limit(3),
                &FieldSchema::default(),
                &mut cursor,
                &mut sink,
            )
            .await
            .unwrap();
        assert_eq!(outcome.skipped_records, 1);
        assert_eq!(outcome.records_written, 3);
        assert!(!outcome.truncated);
        let ids: Vec<_> = lines(&sink).iter().map(|f| f["id"].clone()).collect();
        assert_eq!(ids, vec![0, 2, 3]);
    }

    #[tokio::test]
    async fn nulled_values_are_counted() {
        let engine = ExportEngine::default();
        let records = vec![FeatureRecord::new(1, point::p0(), Crs::Crs84)
            .with_attribute("count", "many")
            .with_attribute("name", "a")];
        let mut cursor = StreamCursor::from_records(records);
        let mut sink = vec![];
        let outcome = engine
            .export(
                StreamingExportRequest::new(ExportFormat::GeoJsonLines),
                &properties::schema(),
                &mut cursor,
                &mut sink,
            )
            .await
            .unwrap();
        assert_eq!(outcome.nulled_values, 1);
        assert_eq!(lines(&sink)[0]["properties"]["count"], Value::Null);
    }

    #[tokio::test]
    async fn cancellation_stops_a_stalled_pull() {
        let engine = ExportEngine::default();
        let token = CancellationToken::new();
        let mut cursor =
            MockCursor::new(point::records(10)).stall_at(4, Some(token.clone()));
        let mut sink = vec![];
        let outcome = engine
            .export(
                StreamingExportRequest::new(ExportFormat::GeoJsonLines)
                    .with_cancellation(token),
                &FieldSchema::default(),
                &mut cursor,
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(outcome.state, PipelineState::Cancelled);
        assert_eq!(outcome.records_written, 4);
        assert!(cursor.cancelled);
        assert_eq!(cursor.pulled, 4);
        // Whole records only
        assert_eq!(lines(&sink).len(), 4);
        assert!(matches!(
            outcome.into_result(),
            Err(ExportError::ExportCancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels() {
        let engine = ExportEngine::default();
        let mut cursor = MockCursor::new(point::records(10)).stall_at(2, None);
        let request = StreamingExportRequest::new(ExportFormat::GeoJson)
            .with_deadline(Duration::from_secs(30));
        let parent = request.cancel.clone();
        let mut sink = vec![];
        let outcome = engine
            .export(request, &FieldSchema::default(), &mut cursor, &mut sink)
            .await
            .unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.records_written, 2);
        assert!(cursor.cancelled);
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn sink_failure_fails() {
        let engine = ExportEngine::default();
        let mut cursor = MockCursor::new(point::records(3));
        let err = engine
            .export(
                StreamingExportRequest::new(ExportFormat::GeoJson),
                &FieldSchema::default(),
                &mut cursor,
                &mut BrokenSink,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::WriterSinkFailure(_)));
        assert!(cursor.cancelled);
    }

    #[tokio::test]
    async fn configuration_errors_write_nothing() {
        let engine = ExportEngine::default();
        let mut cursor = MockCursor::new(point::records(3));
        let mut sink = vec![];
        let err = engine
            .export(
                StreamingExportRequest::new(ExportFormat::Wkt(WktLayout::GeometryOnly))
                    .with_selected_fields(["name"]),
                &properties::schema(),
                &mut cursor,
                &mut sink,
            )
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(sink.is_empty());
        assert_eq!(cursor.pulled, 0);
    }

    #[tokio::test]
    async fn start_export_runs_as_a_task() {
        let engine = ExportEngine::default();
        let (writer, mut reader) = tokio::io::duplex(1024);
        let handle = engine.start_export(
            StreamingExportRequest::new(ExportFormat::IdsOnly).with_limit(2),
            Arc::new(properties::schema()),
            StreamCursor::from_records(properties::records()),
            writer,
        );

        let mut output = vec![];
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut output)
            .await
            .unwrap();
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.truncated);

        let ids: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(ids["objectIds"], serde_json::json!([1, 2]));
        assert_eq!(ids["exceededTransferLimit"], true);
    }
}
