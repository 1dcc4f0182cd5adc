use std::fmt::Display;

use crate::error::{ExportError, Result};

/// The lifecycle of one export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PipelineState {
    #[default]
    Idle,
    Streaming,
    /// The cursor was exhausted or the transfer limit was reached, and the output was closed.
    Completed,
    /// Cancelled explicitly or by the deadline. The output is incomplete.
    Cancelled,
    /// A sink or cursor failure ended the export.
    Failed,
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// The terminal result of an export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOutcome {
    pub state: PipelineState,
    pub records_written: u64,
    /// Whether the transfer limit cut the output short.
    pub truncated: bool,
    /// Bytes handed to the sink, counted by the pipeline.
    pub bytes_written: u64,
    /// Records dropped because they could not be reprojected or encoded.
    pub skipped_records: u64,
    /// Attribute values replaced by null because they did not fit their declared type.
    pub nulled_values: u64,
}

impl ExportOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.state == PipelineState::Cancelled
    }

    /// Turn a cancelled outcome into [`ExportError::ExportCancelled`].
    pub fn into_result(self) -> Result<Self> {
        match self.state {
            PipelineState::Cancelled => Err(ExportError::ExportCancelled),
            _ => Ok(self),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancelled_into_result() {
        let outcome = ExportOutcome {
            state: PipelineState::Cancelled,
            records_written: 4,
            ..Default::default()
        };
        assert!(outcome.is_cancelled());
        assert!(matches!(
            outcome.into_result(),
            Err(ExportError::ExportCancelled)
        ));

        let outcome = ExportOutcome {
            state: PipelineState::Completed,
            truncated: true,
            ..Default::default()
        };
        assert!(outcome.clone().into_result().unwrap().truncated);
    }
}
