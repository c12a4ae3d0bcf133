//! The scheduled command ring: `[256][MAX_PEERS]` slots, indexed by `cycle mod 256`.
//! Each slot holds the (at most `K`) commands a given peer scheduled for that cycle,
//! plus a "received" flag so the engine can tell "nothing scheduled yet" apart from
//! "peer explicitly sent an empty packet for this cycle" — both are legitimate and
//! only the former should hold up advancement.

use crate::command::CommandRecord;
use crate::error::Error;
use crate::peer::PeerId;
use crate::wire::MAX_COMMANDS;

const RING_SIZE: usize = 256;

#[inline]
fn index(cycle: u32) -> usize {
    (cycle & 0xFF) as usize
}

pub struct ScheduledRing {
    max_peers: usize,
    commands: Vec<Vec<Vec<CommandRecord>>>,
    received: Vec<Vec<bool>>,
}

impl ScheduledRing {
    pub fn new(max_peers: usize) -> ScheduledRing {
        ScheduledRing {
            max_peers,
            commands: vec![vec![Vec::new(); max_peers]; RING_SIZE],
            received: vec![vec![false; max_peers]; RING_SIZE],
        }
    }

    /// Schedules a single command from `peer`. A peer may legitimately submit more
    /// than one command for the same cycle (e.g. several gameplay orders issued in
    /// the same input quantum); `K` bounds how many fit in one outgoing packet.
    pub fn write(&mut self, peer: PeerId, record: CommandRecord) -> Result<(), Error> {
        let slot = &mut self.commands[index(record.target_cycle)][peer as usize];
        if slot.len() >= MAX_COMMANDS {
            return Err(Error::PoolExhausted);
        }
        slot.push(record);
        self.received[index(record.target_cycle)][peer as usize] = true;
        Ok(())
    }

    /// Marks that a packet for `cycle` was received from `peer`, even if it carried
    /// no commands — an explicit "nothing to do this cycle" is still progress.
    pub fn mark_received(&mut self, cycle: u32, peer: PeerId) {
        self.received[index(cycle)][peer as usize] = true;
    }

    pub fn received(&self, cycle: u32, peer: PeerId) -> bool {
        self.received[index(cycle)][peer as usize]
    }

    /// True once every peer in `peers` has a record (or an explicit empty marker)
    /// for `cycle` — the gate the engine checks before it may step the simulation
    /// past that cycle.
    pub fn is_ready<I: Iterator<Item = PeerId>>(&self, cycle: u32, peers: I) -> bool {
        peers.into_iter().all(|p| self.received(cycle, p))
    }

    /// Drains and returns every command scheduled by `peer` for `cycle`, in
    /// submission order, clearing the slot and its received flag for reuse 256
    /// cycles from now.
    pub fn take(&mut self, cycle: u32, peer: PeerId) -> Vec<CommandRecord> {
        let i = index(cycle);
        self.received[i][peer as usize] = false;
        std::mem::take(&mut self.commands[i][peer as usize])
    }

    /// Clears every ring slot belonging to `peer` — called when a peer quits or is
    /// timed out so its absence can never again block `is_ready`.
    pub fn remove_peer(&mut self, peer: PeerId) {
        for cycle in 0..RING_SIZE {
            self.commands[cycle][peer as usize].clear();
            self.received[cycle][peer as usize] = false;
        }
    }

    /// Pre-marks `cycle` as received for every peer in `peers` with no commands
    /// attached — used at startup to seed the `[0, lag]` window so the engine's
    /// first `is_ready` checks aren't vacuously blocked on cycles nobody has had a
    /// chance to send anything for yet.
    pub fn prime<I: Iterator<Item = PeerId>>(&mut self, cycle: u32, peers: I) {
        for peer in peers {
            self.mark_received(cycle, peer);
        }
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Kind, Payload, StatusFlag};

    fn record(cycle: u32) -> CommandRecord {
        CommandRecord::new(Kind::Sync, StatusFlag::Append, Payload::Empty, cycle)
    }

    #[test]
    fn not_ready_until_all_peers_report() {
        let mut ring = ScheduledRing::new(4);
        ring.mark_received(10, 0);
        assert!(!ring.is_ready(10, (0..2).into_iter()));
        ring.mark_received(10, 1);
        assert!(ring.is_ready(10, (0..2).into_iter()));
    }

    #[test]
    fn write_populates_received_and_take_drains() {
        let mut ring = ScheduledRing::new(2);
        ring.write(0, record(5)).unwrap();
        assert!(ring.received(5, 0));
        let drained = ring.take(5, 0);
        assert_eq!(drained.len(), 1);
        assert!(!ring.received(5, 0));
        assert!(ring.take(5, 0).is_empty());
    }

    #[test]
    fn write_respects_capacity() {
        let mut ring = ScheduledRing::new(1);
        for _ in 0..MAX_COMMANDS {
            ring.write(0, record(1)).unwrap();
        }
        assert_eq!(ring.write(0, record(1)), Err(Error::PoolExhausted));
    }

    #[test]
    fn remove_peer_clears_every_cycle() {
        let mut ring = ScheduledRing::new(2);
        ring.mark_received(3, 1);
        ring.write(1, record(3)).unwrap();
        ring.remove_peer(1);
        assert!(!ring.received(3, 1));
        assert!(ring.take(3, 1).is_empty());
    }

    #[test]
    fn ring_index_wraps_modulo_256() {
        let mut ring = ScheduledRing::new(1);
        ring.write(0, record(5)).unwrap();
        ring.write(0, record(5 + 256)).unwrap();
        // Both land in slot 5; without draining in between this is two commands.
        assert_eq!(ring.take(5, 0).len(), 2);
    }
}
