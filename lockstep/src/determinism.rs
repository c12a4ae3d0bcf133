//! The determinism guard: a per-cycle `{seed, hash}` beacon ring. Local state is
//! recorded when a SYNC command is emitted for a cycle; a remote peer's SYNC for the
//! same cycle is compared against it on arrival. This detects divergence only —
//! resynchronization is the surrounding game loop's problem, not this guard's.

use crate::error::Error;

const RING_SIZE: usize = 256;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct Beacon {
    cycle: u32,
    hash: u32,
    seed: u32,
}

pub struct DeterminismGuard {
    beacons: Vec<Option<Beacon>>,
}

impl DeterminismGuard {
    pub fn new() -> DeterminismGuard {
        DeterminismGuard {
            beacons: vec![None; RING_SIZE],
        }
    }

    #[inline]
    fn index(cycle: u32) -> usize {
        (cycle & 0xFF) as usize
    }

    /// Records the local simulation's state hash for `cycle`, ahead of emitting the
    /// matching SYNC command.
    pub fn record_local(&mut self, cycle: u32, hash: u32, seed: u32) {
        self.beacons[Self::index(cycle)] = Some(Beacon { cycle, hash, seed });
    }

    /// Compares a remote peer's SYNC beacon against the local recording for the same
    /// cycle. `hash` is the wire's 16-bit truncated hash, so only the local beacon's
    /// low 16 bits participate in the comparison. Silent (`Ok`) if the local side has
    /// not yet recorded that cycle — the comparison is only meaningful once both
    /// sides have reached it.
    pub fn check_remote(&self, cycle: u32, hash: u32, seed: u32) -> Result<(), Error> {
        match self.beacons[Self::index(cycle)] {
            Some(local) if local.cycle == cycle => {
                if (local.hash & 0xFFFF) != (hash & 0xFFFF) || local.seed != seed {
                    Err(Error::DesyncDetected(cycle))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

impl Default for DeterminismGuard {
    fn default() -> DeterminismGuard {
        DeterminismGuard::new()
    }
}
