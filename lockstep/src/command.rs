//! The command record: the atomic unit of simulation input that flows through the
//! scheduled ring and over the wire. `Kind` and `Payload` are a tagged sum type on
//! the Rust side; the wire itself stays a raw 8-byte blob per command.

use crate::peer::PeerId;

/// First numeric value reserved for gameplay commands (Move, Stop, Attack, ...). Values
/// below this are the well-known control kinds; values from here to 127 are gameplay.
pub const FIRST_GAMEPLAY: u8 = 9;

/// High bit of the wire kind byte: distinguishes append from flush semantics for
/// gameplay and extended commands.
const FLUSH_BIT: u8 = 0x80;
const KIND_MASK: u8 = 0x7F;

/// A handful of named gameplay kinds for convenience; any other value in
/// `FIRST_GAMEPLAY..=127` is a valid, if anonymous to this crate, gameplay command.
pub mod gameplay {
    pub const MOVE: u8 = super::FIRST_GAMEPLAY;
    pub const STOP: u8 = super::FIRST_GAMEPLAY + 1;
    pub const ATTACK: u8 = super::FIRST_GAMEPLAY + 2;
    pub const BUILD: u8 = super::FIRST_GAMEPLAY + 3;
    pub const TRAIN: u8 = super::FIRST_GAMEPLAY + 4;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kind {
    None,
    Sync,
    Chat,
    ChatTerminal,
    Quit,
    QuitAck,
    Resend,
    Selection,
    Extended,
    /// Raw gameplay command code, in `FIRST_GAMEPLAY..=127`.
    Gameplay(u8),
}

impl Kind {
    /// Decodes the low 7 bits of a wire kind byte into a `Kind`.
    #[inline]
    pub fn from_wire(raw: u8) -> Option<Kind> {
        let code = raw & KIND_MASK;
        Some(match code {
            0 => Kind::None,
            1 => Kind::Sync,
            2 => Kind::Chat,
            3 => Kind::ChatTerminal,
            4 => Kind::Quit,
            5 => Kind::QuitAck,
            6 => Kind::Resend,
            7 => Kind::Selection,
            8 => Kind::Extended,
            FIRST_GAMEPLAY..=127 => Kind::Gameplay(code),
        })
    }

    /// Encodes the low 7 bits of the wire kind byte (the high bit is added separately
    /// by [`StatusFlag::apply`]).
    #[inline]
    pub fn to_wire(self) -> u8 {
        match self {
            Kind::None => 0,
            Kind::Sync => 1,
            Kind::Chat => 2,
            Kind::ChatTerminal => 3,
            Kind::Quit => 4,
            Kind::QuitAck => 5,
            Kind::Resend => 6,
            Kind::Selection => 7,
            Kind::Extended => 8,
            Kind::Gameplay(code) => code,
        }
    }

    #[inline]
    pub fn is_none(self) -> bool {
        matches!(self, Kind::None)
    }

    #[inline]
    pub fn carries_status_flag(self) -> bool {
        matches!(self, Kind::Gameplay(_) | Kind::Extended)
    }
}

/// Append vs. flush semantics for gameplay/extended commands, carried as the high bit
/// of the wire kind byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatusFlag {
    Append,
    Flush,
}

impl StatusFlag {
    #[inline]
    pub fn from_wire(raw: u8) -> StatusFlag {
        if raw & FLUSH_BIT != 0 {
            StatusFlag::Flush
        } else {
            StatusFlag::Append
        }
    }

    /// OR's the flush bit into a kind byte that has already encoded its low 7 bits.
    #[inline]
    pub fn apply(self, kind_byte: u8) -> u8 {
        match self {
            StatusFlag::Append => kind_byte,
            StatusFlag::Flush => kind_byte | FLUSH_BIT,
        }
    }
}

/// The fixed-size 8-byte payload shape, discriminated by `Kind`. `Empty` covers kinds
/// whose payload slot carries no meaningful data (QUIT_ACK, RESEND, the SELECTION
/// marker record).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Payload {
    Gameplay {
        unit_slot: u16,
        x: u16,
        y: u16,
        dest_or_type: u16,
    },
    Extended {
        subkind: u8,
        arg1: u8,
        arg2: u16,
        arg3: u16,
        arg4: u16,
    },
    Chat {
        sender: PeerId,
        chunk: [u8; 7],
    },
    Sync {
        hash_low: u16,
        seed_high: u16,
        seed_low: u16,
    },
    Quit {
        peer: PeerId,
    },
    Empty,
}

/// A scheduled command: what to do, carrying the full 32-bit cycle it is bound for.
/// Target cycle is tracked explicitly on the record rather than inferred from slot
/// position, so the ring's "nothing scheduled yet" state never overloads a real cycle
/// value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRecord {
    pub kind: Kind,
    pub status: StatusFlag,
    pub payload: Payload,
    pub target_cycle: u32,
}

impl CommandRecord {
    #[inline]
    pub fn new(kind: Kind, status: StatusFlag, payload: Payload, target_cycle: u32) -> CommandRecord {
        CommandRecord {
            kind,
            status,
            payload,
            target_cycle,
        }
    }

    #[inline]
    pub fn sync(hash: u32, seed: u32, target_cycle: u32) -> CommandRecord {
        CommandRecord::new(
            Kind::Sync,
            StatusFlag::Append,
            Payload::Sync {
                hash_low: (hash & 0xFFFF) as u16,
                seed_high: (seed >> 16) as u16,
                seed_low: (seed & 0xFFFF) as u16,
            },
            target_cycle,
        )
    }

    #[inline]
    pub fn quit(peer: PeerId, target_cycle: u32) -> CommandRecord {
        CommandRecord::new(Kind::Quit, StatusFlag::Append, Payload::Quit { peer }, target_cycle)
    }

    /// Equality on `(Kind, Payload)` only, ignoring status and target cycle — this is
    /// the comparison the outbound queue's duplicate-suppression rule uses.
    #[inline]
    pub fn matches_content(&self, other: &CommandRecord) -> bool {
        self.kind == other.kind && self.payload == other.payload
    }
}
