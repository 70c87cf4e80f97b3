use crate::work_request::RdmaOpcode;
use clippy_utilities::NumericCast;
use getset::{CopyGetters, Getters};
use std::collections::VecDeque;

/// Status of a successfully finished operation.
pub const COMPLETION_STATUS_SUCCESS: u32 = 0;

/// Status of the marker entry appended when a completion queue overruns its
/// declared capacity. The triggering completion itself is dropped.
pub const COMPLETION_STATUS_CQ_OVERRUN: u32 = 1;

/// A completion record dequeued from a completion queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct CompletionEntry {
    /// Id of the work request this entry completes
    wr_id: u64,
    /// Completion status, `COMPLETION_STATUS_SUCCESS` on success
    status: u32,
    /// Operation type
    opcode: RdmaOpcode,
    /// Number of bytes transferred
    length: u32,
    /// Immediate data carried by the operation
    imm_data: u32,
}

impl CompletionEntry {
    /// Build a successful completion
    pub(crate) fn success(wr_id: u64, opcode: RdmaOpcode, length: u32) -> Self {
        Self {
            wr_id,
            status: COMPLETION_STATUS_SUCCESS,
            opcode,
            length,
            imm_data: 0,
        }
    }

    /// Build the overrun marker for a queue that ran out of entries
    fn overrun(opcode: RdmaOpcode) -> Self {
        Self {
            wr_id: 0,
            status: COMPLETION_STATUS_CQ_OVERRUN,
            opcode,
            length: 0,
            imm_data: 0,
        }
    }
}

impl Default for CompletionEntry {
    #[inline]
    fn default() -> Self {
        Self::success(0, RdmaOpcode::Send, 0)
    }
}

/// The backing record of a simulated completion queue: an ordered sink of
/// completion events for one or more queue pairs.
#[derive(Clone, Debug, Getters, CopyGetters)]
pub struct CqValue {
    /// Completion queue number
    #[getset(get_copy = "pub")]
    cq_num: u32,
    /// Declared capacity in entries
    #[getset(get_copy = "pub")]
    cqe: u32,
    /// FIFO of completion events waiting to be polled
    #[getset(get = "pub")]
    completions: VecDeque<CompletionEntry>,
}

impl CqValue {
    /// Create an empty completion queue record
    pub(crate) fn new(cq_num: u32, cqe: u32) -> Self {
        Self {
            cq_num,
            cqe,
            completions: VecDeque::new(),
        }
    }

    /// Append one completion, enforcing the declared capacity.
    ///
    /// When the FIFO already holds `cqe` entries the incoming completion is
    /// dropped and a single overrun marker per burst takes its place.
    /// Returns whether the completion itself was stored.
    pub(crate) fn push_completion(&mut self, entry: CompletionEntry) -> bool {
        if self.completions.len() < self.cqe.numeric_cast() {
            self.completions.push_back(entry);
            return true;
        }
        let marked = self
            .completions
            .back()
            .map_or(false, |last| last.status == COMPLETION_STATUS_CQ_OVERRUN);
        if !marked {
            self.completions.push_back(CompletionEntry::overrun(entry.opcode));
        }
        false
    }

    /// Move up to `max` entries off the front of the FIFO
    pub(crate) fn take_completions(&mut self, max: u32) -> Vec<CompletionEntry> {
        let count = self.completions.len().min(max.numeric_cast());
        self.completions.drain(..count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let mut cq = CqValue::new(1, 16);
        for id in 0_u64..4_u64 {
            assert!(cq.push_completion(CompletionEntry::success(id, RdmaOpcode::Send, 0)));
        }
        let taken = cq.take_completions(2);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].wr_id(), 0);
        assert_eq!(taken[1].wr_id(), 1);
        let rest = cq.take_completions(16);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].wr_id(), 2);
    }

    #[test]
    fn overrun_drops_and_marks_once() {
        let mut cq = CqValue::new(1, 2);
        assert!(cq.push_completion(CompletionEntry::success(1, RdmaOpcode::Send, 0)));
        assert!(cq.push_completion(CompletionEntry::success(2, RdmaOpcode::Send, 0)));
        // queue is full: both overflowing entries are dropped, one marker lands
        assert!(!cq.push_completion(CompletionEntry::success(3, RdmaOpcode::Send, 0)));
        assert!(!cq.push_completion(CompletionEntry::success(4, RdmaOpcode::Send, 0)));
        let taken = cq.take_completions(16);
        assert_eq!(taken.len(), 3);
        assert_eq!(taken[2].status(), COMPLETION_STATUS_CQ_OVERRUN);
    }

    #[test]
    fn take_from_empty_queue() {
        let mut cq = CqValue::new(1, 4);
        assert!(cq.take_completions(8).is_empty());
    }
}
