//! The outbound submission queue: gameplay commands drain ahead of chat/selection
//! traffic when a packet is assembled, duplicate submissions are suppressed, and the
//! queue drops its oldest entry rather than block the caller when it is full.

use crate::command::CommandRecord;
use std::collections::VecDeque;

/// Reference fixed pool size (§4.D): "a small fixed pool (reference: 100 records)".
const DEFAULT_CAPACITY: usize = 100;

pub struct OutboundQueue {
    gameplay: VecDeque<CommandRecord>,
    side: VecDeque<CommandRecord>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> OutboundQueue {
        OutboundQueue {
            gameplay: VecDeque::new(),
            side: VecDeque::new(),
            capacity,
        }
    }

    /// Returns `true` if an existing (older) entry was dropped to make room —
    /// `PoolExhausted` in §7's taxonomy, which implementers are told to surface.
    #[must_use]
    pub fn push_gameplay(&mut self, record: CommandRecord) -> bool {
        push(&mut self.gameplay, record, self.capacity)
    }

    /// Chat and selection traffic share the second-priority lane.
    #[must_use]
    pub fn push_side(&mut self, record: CommandRecord) -> bool {
        push(&mut self.side, record, self.capacity)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.gameplay.is_empty() && self.side.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gameplay.len() + self.side.len()
    }

    /// Drains up to `max` commands for the next outgoing packet, gameplay commands
    /// first, then side-lane traffic filling any remaining slots.
    pub fn drain(&mut self, max: usize) -> Vec<CommandRecord> {
        let mut out = Vec::with_capacity(max.min(self.len()));
        while out.len() < max {
            match self.gameplay.pop_front() {
                Some(record) => out.push(record),
                None => break,
            }
        }
        while out.len() < max {
            match self.side.pop_front() {
                Some(record) => out.push(record),
                None => break,
            }
        }
        out
    }
}

impl Default for OutboundQueue {
    fn default() -> OutboundQueue {
        OutboundQueue::new(DEFAULT_CAPACITY)
    }
}

fn push(queue: &mut VecDeque<CommandRecord>, record: CommandRecord, capacity: usize) -> bool {
    if queue.iter().any(|existing| existing.matches_content(&record)) {
        return false;
    }
    let overflowed = queue.len() >= capacity;
    if overflowed {
        queue.pop_front();
    }
    queue.push_back(record);
    overflowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Kind, Payload, StatusFlag};

    fn gameplay(x: u16) -> CommandRecord {
        CommandRecord::new(
            Kind::Gameplay(crate::command::gameplay::MOVE),
            StatusFlag::Append,
            Payload::Gameplay {
                unit_slot: 1,
                x,
                y: 0,
                dest_or_type: 0,
            },
            0,
        )
    }

    #[test]
    fn gameplay_drains_before_side_lane() {
        let mut q = OutboundQueue::default();
        q.push_side(CommandRecord::quit(2, 0));
        q.push_gameplay(gameplay(1));
        let drained = q.drain(2);
        assert_eq!(drained[0], gameplay(1));
        assert_eq!(drained[1], CommandRecord::quit(2, 0));
    }

    #[test]
    fn duplicate_content_is_suppressed() {
        let mut q = OutboundQueue::default();
        q.push_gameplay(gameplay(1));
        q.push_gameplay(gameplay(1));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn overflow_drops_oldest_and_is_reported() {
        let mut q = OutboundQueue::new(2);
        assert!(!q.push_gameplay(gameplay(1)));
        assert!(!q.push_gameplay(gameplay(2)));
        assert!(q.push_gameplay(gameplay(3)));
        let drained = q.drain(2);
        assert_eq!(drained, vec![gameplay(2), gameplay(3)]);
    }

    #[test]
    fn drain_caps_at_max_and_leaves_remainder_queued() {
        let mut q = OutboundQueue::default();
        q.push_gameplay(gameplay(1));
        q.push_gameplay(gameplay(2));
        let drained = q.drain(1);
        assert_eq!(drained, vec![gameplay(1)]);
        assert_eq!(q.len(), 1);
    }
}
