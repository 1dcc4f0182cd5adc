//! Writes to the append-only output sink.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::io::encoder::Spool;

/// The sink of one export.
///
/// Every write races the export's cancellation token, so a stalled client cannot hold an
/// export past its cancellation or deadline. Bytes are counted here; the sink itself is never
/// asked for its length.
pub struct SinkWriter<'a, W: ?Sized> {
    sink: &'a mut W,
    cancel: CancellationToken,
    bytes_written: u64,
}

impl<'a, W> SinkWriter<'a, W>
where
    W: AsyncWrite + Send + Unpin + ?Sized,
{
    pub fn new(sink: &'a mut W, cancel: CancellationToken) -> Self {
        Self {
            sink,
            cancel,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write and clear `buf`.
    ///
    /// Accepted bytes are drained from `buf` after every partial write, so when cancellation
    /// wins the race `buf` holds exactly the bytes the sink has not seen yet.
    pub async fn write(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        let len = buf.len();
        while !buf.is_empty() {
            let sink = &mut *self.sink;
            let accepted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ExportError::ExportCancelled),
                result = sink.write(&buf[..]) => result.map_err(ExportError::WriterSinkFailure)?,
            };
            self.accept(buf, accepted)?;
        }
        if len > 0 {
            debug!(bytes = len, total = self.bytes_written, "flushed to sink");
        }
        Ok(())
    }

    /// Write and clear `buf` after the export was cancelled, giving up after `grace`.
    ///
    /// `buf` only ever holds whole records, or the undelivered tail of one, so they can still
    /// be delivered.
    pub async fn write_after_cancel(&mut self, buf: &mut Vec<u8>, grace: Duration) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if tokio::time::timeout(grace, self.drain_uncancelled(buf))
            .await
            .is_err()
        {
            debug!(bytes = buf.len(), "sink stalled after cancellation, dropping output");
            buf.clear();
            return Ok(());
        }
        let _ = tokio::time::timeout(grace, self.sink.flush()).await;
        Ok(())
    }

    async fn drain_uncancelled(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        while !buf.is_empty() {
            let accepted = self
                .sink
                .write(&buf[..])
                .await
                .map_err(ExportError::WriterSinkFailure)?;
            self.accept(buf, accepted)?;
        }
        Ok(())
    }

    fn accept(&mut self, buf: &mut Vec<u8>, accepted: usize) -> Result<()> {
        if accepted == 0 {
            return Err(ExportError::WriterSinkFailure(io::ErrorKind::WriteZero.into()));
        }
        buf.drain(..accepted);
        self.bytes_written += accepted as u64;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        let sink = &mut *self.sink;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExportError::ExportCancelled),
            result = sink.flush() => result.map_err(ExportError::WriterSinkFailure),
        }
    }

    /// Stream a finished container to the sink in chunks of `chunk_size` bytes.
    pub async fn copy_spool(&mut self, spool: Spool, chunk_size: usize) -> Result<()> {
        let len = spool.len();
        let mut file = tokio::fs::File::from_std(spool.into_file());
        let mut chunk = vec![0; chunk_size.max(1)];
        loop {
            let read = file.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            let mut pending = &chunk[..read];
            while !pending.is_empty() {
                let sink = &mut *self.sink;
                let accepted = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(ExportError::ExportCancelled),
                    result = sink.write(pending) => result.map_err(ExportError::WriterSinkFailure)?,
                };
                if accepted == 0 {
                    return Err(ExportError::WriterSinkFailure(io::ErrorKind::WriteZero.into()));
                }
                pending = &pending[accepted..];
                self.bytes_written += accepted as u64;
            }
        }
        debug!(bytes = len, "copied spool to sink");
        Ok(())
    }
}
