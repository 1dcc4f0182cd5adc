//! The forward-only record source of an export.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::record::FeatureRecord;

/// An asynchronous, cancellable, forward-only sequence of records.
///
/// Implementations are typically backed by a live query. `next_record` receives the export's
/// cancellation token and should return [`ExportError::ExportCancelled`] promptly once it fires;
/// the orchestrator stops waiting on a pull as soon as the token is cancelled either way.
#[async_trait]
pub trait FeatureCursor: Send {
    /// The next record, or `None` when the cursor is exhausted.
    async fn next_record(&mut self, cancel: &CancellationToken) -> Result<Option<FeatureRecord>>;

    /// The total number of records the cursor will yield, if known up front.
    fn count_hint(&self) -> Option<u64> {
        None
    }

    /// Stop any upstream work. Called when the export is cancelled or fails.
    async fn cancel(&mut self) {}
}

/// A [`FeatureCursor`] over any [`Stream`] of records.
pub struct StreamCursor<S> {
    stream: Option<S>,
    count_hint: Option<u64>,
}

impl<S> StreamCursor<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            count_hint: None,
        }
    }

    pub fn with_count_hint(mut self, count: u64) -> Self {
        self.count_hint = Some(count);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl StreamCursor<BoxStream<'static, Result<FeatureRecord>>> {
    /// A cursor over records already in memory, reporting their number as the count hint.
    pub fn from_records(records: Vec<FeatureRecord>) -> Self {
        let count = records.len() as u64;
        Self::new(stream::iter(records.into_iter().map(Ok)).boxed()).with_count_hint(count)
    }
}

impl<S> std::fmt::Debug for StreamCursor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCursor")
            .field("closed", &self.is_closed())
            .field("count_hint", &self.count_hint)
            .finish()
    }
}

#[async_trait]
impl<S> FeatureCursor for StreamCursor<S>
where
    S: Stream<Item = Result<FeatureRecord>> + Send + Unpin,
{
    async fn next_record(&mut self, cancel: &CancellationToken) -> Result<Option<FeatureRecord>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExportError::ExportCancelled),
            next = stream.next() => next.transpose(),
        }
    }

    fn count_hint(&self) -> Option<u64> {
        self.count_hint
    }

    async fn cancel(&mut self) {
        if self.stream.take().is_some() {
            debug!("closed cursor stream");
        }
    }
}
