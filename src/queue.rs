//! Ordered holding area for not-yet-admitted operations
//!
//! One FIFO lane per priority tier. Admission order is tier first, then
//! enqueue order within the tier.

use crate::types::{OperationId, OperationRecord, Priority};
use std::collections::VecDeque;

/// Priority-ordered queue of pending operations
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    high: VecDeque<OperationRecord>,
    normal: VecDeque<OperationRecord>,
    low: VecDeque<OperationRecord>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lane_mut(&mut self, priority: Priority) -> &mut VecDeque<OperationRecord> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }

    /// Insert a record at the back of its tier's lane
    pub fn push(&mut self, record: OperationRecord) {
        self.lane_mut(record.priority).push_back(record);
    }

    /// Remove and return the next record in admission order
    pub fn pop_next(&mut self) -> Option<OperationRecord> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    /// Remove a still-queued record by id
    pub fn remove(&mut self, id: OperationId) -> Option<OperationRecord> {
        for lane in [&mut self.high, &mut self.normal, &mut self.low] {
            if let Some(pos) = lane.iter().position(|r| r.id == id) {
                return lane.remove(pos);
            }
        }
        None
    }

    /// Remove and return every queued record, in admission order
    pub fn drain(&mut self) -> Vec<OperationRecord> {
        self.high
            .drain(..)
            .chain(self.normal.drain(..))
            .chain(self.low.drain(..))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnqueueOptions, Json, OperationHandle, OperationWork};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn fixture_record(priority: Priority) -> (OperationRecord, OperationHandle) {
        let work: OperationWork = Arc::new(|| Box::pin(async { Ok(Json::Null) }));
        OperationRecord::new(
            work,
            EnqueueOptions::default().priority(priority),
            Duration::from_secs(30),
            2,
        )
    }

    #[test]
    fn test_pop_next_respects_tiers() {
        let mut fixture = PendingQueue::new();
        let (low, _h1) = fixture_record(Priority::Low);
        let (high, _h2) = fixture_record(Priority::High);
        let (normal, _h3) = fixture_record(Priority::Normal);

        fixture.push(low);
        fixture.push(high);
        fixture.push(normal);

        let actual: Vec<Priority> = std::iter::from_fn(|| fixture.pop_next())
            .map(|r| r.priority)
            .collect();
        let expected = vec![Priority::High, Priority::Normal, Priority::Low];
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_fifo_within_tier() {
        let mut fixture = PendingQueue::new();
        let (first, _h1) = fixture_record(Priority::Normal);
        let (second, _h2) = fixture_record(Priority::Normal);
        let first_id = first.id;
        let second_id = second.id;

        fixture.push(first);
        fixture.push(second);

        assert_eq!(fixture.pop_next().unwrap().id, first_id);
        assert_eq!(fixture.pop_next().unwrap().id, second_id);
    }

    #[test]
    fn test_remove_queued_record() {
        let mut fixture = PendingQueue::new();
        let (record, _handle) = fixture_record(Priority::Normal);
        let id = record.id;
        fixture.push(record);

        let actual = fixture.remove(id);
        assert!(actual.is_some());
        assert_eq!(fixture.len(), 0);

        // Already removed
        assert!(fixture.remove(id).is_none());
    }

    #[test]
    fn test_drain_preserves_admission_order() {
        let mut fixture = PendingQueue::new();
        let (low, _h1) = fixture_record(Priority::Low);
        let (high, _h2) = fixture_record(Priority::High);
        fixture.push(low);
        fixture.push(high);

        let actual: Vec<Priority> = fixture.drain().into_iter().map(|r| r.priority).collect();
        let expected = vec![Priority::High, Priority::Low];
        assert_eq!(actual, expected);
        assert!(fixture.is_empty());
    }

    #[test]
    fn test_len_counts_all_lanes() {
        let mut fixture = PendingQueue::new();
        assert!(fixture.is_empty());

        let (a, _h1) = fixture_record(Priority::High);
        let (b, _h2) = fixture_record(Priority::Low);
        fixture.push(a);
        fixture.push(b);

        assert_eq!(fixture.len(), 2);
    }
}
