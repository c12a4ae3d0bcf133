use hashbrown::HashMap;
use std::net::SocketAddr;

/// A small non-negative integer, stable for the duration of the game.
pub type PeerId = u8;

/// A team identifier shared by the selection sidecar and command validation.
pub type TeamId = u8;

#[derive(Clone, Debug)]
pub struct Peer {
    pub address: SocketAddr,
    pub name: String,
    pub id: PeerId,
    pub team: TeamId,
    pub last_seen_frame: u64,
    pub quit: bool,
}

impl Peer {
    pub fn new(id: PeerId, address: SocketAddr, name: impl Into<String>, team: TeamId) -> Peer {
        Peer {
            address,
            name: name.into(),
            id,
            team,
            last_seen_frame: 0,
            quit: false,
        }
    }
}

/// The peer roster, supplied whole by the external lobby/handshake initializer at
/// init-phase-two and otherwise immutable in membership (peers are marked `quit`, never
/// removed from the slice, so `PeerId` indexing stays stable).
pub struct Roster {
    peers: Vec<Peer>,
    by_address: HashMap<SocketAddr, PeerId>,
    local: PeerId,
}

impl Roster {
    pub fn new(peers: Vec<Peer>, local: PeerId) -> Roster {
        let by_address = peers.iter().map(|p| (p.address, p.id)).collect();
        Roster {
            peers,
            by_address,
            local,
        }
    }

    #[inline]
    pub fn local(&self) -> PeerId {
        self.local
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    #[inline]
    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.id == id)
    }

    #[inline]
    pub fn by_address(&self, address: &SocketAddr) -> Option<PeerId> {
        self.by_address.get(address).copied()
    }

    /// Active (non-quit) peers in ascending `PeerId` order — a fixed dispatch order
    /// so every replica visits peers identically each cycle.
    pub fn active(&self) -> impl Iterator<Item = &Peer> {
        let mut ordered: Vec<&Peer> = self.peers.iter().filter(|p| !p.quit).collect();
        ordered.sort_by_key(|p| p.id);
        ordered.into_iter()
    }

    pub fn remote_active(&self) -> impl Iterator<Item = &Peer> {
        let local = self.local;
        self.active().filter(move |p| p.id != local)
    }

    pub fn all_remote_quit(&self) -> bool {
        self.peers.iter().filter(|p| p.id != self.local).all(|p| p.quit)
    }

    pub fn are_teammates(&self, a: PeerId, b: PeerId) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(pa), Some(pb)) => pa.team == pb.team,
            _ => false,
        }
    }

    pub fn mark_quit(&mut self, id: PeerId) {
        if let Some(peer) = self.get_mut(id) {
            peer.quit = true;
        }
    }
}
