//! The "contract from simulation" (§6): the minimal interface the engine consumes
//! from its surrounding game loop. The simulation itself — unit model, pathfinding,
//! rendering — is out of scope and referenced only through this trait.

use crate::command::{Payload, StatusFlag};
use crate::peer::PeerId;

/// Implemented by the surrounding game loop. The engine never touches world state
/// directly; every effect a dispatched command has on the simulation happens through
/// `execute_command`.
pub trait SimulationSink {
    /// Dispatches one command to the simulation, in scheduled cycle order, for the
    /// given originating peer.
    fn execute_command(&mut self, peer: PeerId, payload: &Payload, status: StatusFlag);

    /// The simulation's current determinism-relevant state, sampled once per `U`
    /// cycles when a SYNC beacon is composed.
    fn current_seed(&self) -> u32;
    fn current_hash(&self) -> u32;

    /// Wall-clock pacing, used to convert the configured timeout into a frame count.
    fn frame_counter(&self) -> u64;
    fn frames_per_second(&self) -> u32;

    /// Resolves which peer owns `unit_slot`, for the gameplay-command ownership
    /// check in §4.E. `None` if the slot is unoccupied or unknown.
    fn unit_owner(&self, unit_slot: u16) -> Option<PeerId>;
}

#[cfg(test)]
pub mod tests_support {
    use super::*;

    /// A deterministic stand-in simulation: records every dispatched command and
    /// reports a caller-controlled seed/hash/frame counter.
    pub struct RecordingSim {
        pub seed: u32,
        pub hash: u32,
        pub frame: u64,
        pub fps: u32,
        pub dispatched: Vec<(PeerId, Payload, StatusFlag)>,
        pub owners: hashbrown::HashMap<u16, PeerId>,
    }

    impl RecordingSim {
        pub fn new(fps: u32) -> RecordingSim {
            RecordingSim {
                seed: 0,
                hash: 0,
                frame: 0,
                fps,
                dispatched: Vec::new(),
                owners: hashbrown::HashMap::new(),
            }
        }
    }

    impl SimulationSink for RecordingSim {
        fn execute_command(&mut self, peer: PeerId, payload: &Payload, status: StatusFlag) {
            self.dispatched.push((peer, payload.clone(), status));
        }

        fn current_seed(&self) -> u32 {
            self.seed
        }

        fn current_hash(&self) -> u32 {
            self.hash
        }

        fn frame_counter(&self) -> u64 {
            self.frame
        }

        fn frames_per_second(&self) -> u32 {
            self.fps
        }

        fn unit_owner(&self, unit_slot: u16) -> Option<PeerId> {
            self.owners.get(&unit_slot).copied()
        }
    }
}
