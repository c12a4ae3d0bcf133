//! Unit selection is advisory state, not simulation input: SELECTION packets bypass
//! the scheduled ring entirely and are applied the instant they arrive, independent
//! of cycle ordering. This tracks each peer's current selection set for whatever UI
//! or teammate-visibility surface consumes it.

use crate::peer::PeerId;
use crate::wire::SelectionMode;
use hashbrown::{HashMap, HashSet};

#[derive(Default)]
pub struct SelectionState {
    by_peer: HashMap<PeerId, HashSet<u16>>,
}

impl SelectionState {
    pub fn new() -> SelectionState {
        SelectionState::default()
    }

    /// Applies an incoming selection update for `peer`, returning the resulting set.
    pub fn apply(&mut self, peer: PeerId, mode: SelectionMode, units: &[u16]) -> &HashSet<u16> {
        let set = self.by_peer.entry(peer).or_insert_with(HashSet::new);
        match mode {
            SelectionMode::Set => {
                set.clear();
                set.extend(units.iter().copied());
            }
            SelectionMode::Add => {
                set.extend(units.iter().copied());
            }
            SelectionMode::Remove => {
                for unit in units {
                    set.remove(unit);
                }
            }
        }
        set
    }

    pub fn get(&self, peer: PeerId) -> Option<&HashSet<u16>> {
        self.by_peer.get(&peer)
    }

    pub fn remove_peer(&mut self, peer: PeerId) {
        self.by_peer.remove(&peer);
    }
}
