/// What the orchestrator does with the record it just pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Continue,
    /// The limit was already reached. Stop pulling and mark the output truncated.
    Truncate,
}

/// Counts the records of one export against its transfer limit.
///
/// The guard is consulted once per record, before the record is encoded, so output is only
/// marked truncated when a record beyond the limit actually exists.
#[derive(Debug, Clone, Default)]
pub struct TransferLimitGuard {
    limit: Option<u64>,
    count: u64,
    truncated: bool,
}

impl TransferLimitGuard {
    /// `None` never truncates.
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            count: 0,
            truncated: false,
        }
    }

    /// Count the current record, or refuse it once `limit` records were counted.
    pub fn check_and_count(&mut self) -> GuardDecision {
        match self.limit {
            Some(limit) if self.count >= limit => {
                self.truncated = true;
                GuardDecision::Truncate
            }
            _ => {
                self.count += 1;
                GuardDecision::Continue
            }
        }
    }

    /// Undo the count of a record that was skipped after it was admitted.
    pub fn release(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}
