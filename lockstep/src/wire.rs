//! The wire codec: fixed header plus up to `MAX_COMMANDS` command payloads, all
//! multi-byte integers big-endian. `SELECTION` and `RESEND` packets reuse the header
//! bytes for an entirely different purpose (see [`Packet::Selection`] /
//! [`Packet::Resend`]); the overlay is defined explicitly here rather than relied on
//! via struct punning.

use crate::command::{Kind, Payload, StatusFlag};
use crate::error::Error;
use crate::peer::PeerId;
use byteorder::{BigEndian, ByteOrder};

/// `K`: command slots per packet. Chosen, as in the source, to keep a full packet
/// under ~480 bytes so that 8 players on a 28.8kbit modem can sustain a handful of
/// updates per second (see SPEC_FULL.md §10.5).
pub const MAX_COMMANDS: usize = 9;
pub const PAYLOAD_SIZE: usize = 8;
pub const HEADER_SIZE: usize = 1 + MAX_COMMANDS;

/// Unit slots packed per payload block in a SELECTION packet (4 x u16 = 8 bytes).
pub const SELECTION_UNITS_PER_SLOT: usize = PAYLOAD_SIZE / 2;
pub const MAX_SELECTION_UNITS: usize = MAX_COMMANDS * SELECTION_UNITS_PER_SLOT;

const RESEND_SIZE: usize = packet_size(1);
const SELECTION_SIZE: usize = packet_size(MAX_COMMANDS);

/// The largest packet this codec ever produces or accepts; sized to bound the
/// receive buffer without scanning the wire bytes first.
pub const MAX_PACKET_SIZE: usize = SELECTION_SIZE;

/// `Size(n) = 1 + K + 8n`: header plus `n` payload blocks.
#[inline]
pub const fn packet_size(n: usize) -> usize {
    HEADER_SIZE + PAYLOAD_SIZE * n
}

/// Recovers a full 32-bit cycle from the receiver's current cycle and the wire's
/// low byte via cycle division. The result always lies in
/// `[current - 127, current + 128]` and its low byte equals `wire_byte`.
#[inline]
pub fn decode_cycle(current: u32, wire_byte: u8) -> u32 {
    let anchor = current.wrapping_add(128) & !0xFFu32;
    let candidate = anchor | wire_byte as u32;

    if candidate > current.wrapping_add(128) {
        candidate.wrapping_sub(256)
    } else {
        candidate
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SelectionMode {
    Set,
    Add,
    Remove,
}

impl SelectionMode {
    #[inline]
    fn from_bits(add: bool, remove: bool) -> Result<SelectionMode, Error> {
        match (add, remove) {
            (false, false) => Ok(SelectionMode::Set),
            (true, false) => Ok(SelectionMode::Add),
            (false, true) => Ok(SelectionMode::Remove),
            (true, true) => Err(Error::BadPacket),
        }
    }

    #[inline]
    fn to_bits(self) -> (bool, bool) {
        match self {
            SelectionMode::Set => (false, false),
            SelectionMode::Add => (true, false),
            SelectionMode::Remove => (false, true),
        }
    }
}

/// A decoded packet. `Commands` is the common case (gameplay/sync/chat/quit records
/// scheduled into the ring); `Resend` and `Selection` bypass the ring entirely and are
/// handled immediately on receipt (see engine.rs).
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Commands {
        cycle_low: u8,
        commands: Vec<(Kind, StatusFlag, Payload)>,
    },
    Resend {
        cycle_low: u8,
    },
    Selection {
        sender: PeerId,
        mode: SelectionMode,
        units: Vec<u16>,
    },
}

impl Packet {
    pub fn resend(cycle_low: u8) -> Packet {
        Packet::Resend { cycle_low }
    }

    pub fn selection(sender: PeerId, mode: SelectionMode, units: &[u16]) -> Packet {
        let count = units.len().min(MAX_SELECTION_UNITS);
        Packet::Selection {
            sender,
            mode,
            units: units[..count].to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Commands { cycle_low, commands } => encode_commands(*cycle_low, commands),
            Packet::Resend { cycle_low } => encode_resend(*cycle_low),
            Packet::Selection { sender, mode, units } => encode_selection(*sender, *mode, units),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, Error> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::BadPacket);
        }

        let cycle_low = bytes[0];
        let kinds = &bytes[1..HEADER_SIZE];

        if Kind::from_wire(kinds[0]) == Some(Kind::Resend) {
            if bytes.len() != RESEND_SIZE {
                return Err(Error::BadPacket);
            }
            return Ok(Packet::Resend { cycle_low });
        }

        if Kind::from_wire(kinds[0]) == Some(Kind::Selection) {
            return decode_selection(cycle_low, kinds, bytes);
        }

        decode_commands(cycle_low, kinds, bytes)
    }
}

fn encode_resend(cycle_low: u8) -> Vec<u8> {
    let mut out = vec![0u8; RESEND_SIZE];
    out[0] = cycle_low;
    out[1] = StatusFlag::Append.apply(Kind::Resend.to_wire());
    out
}

fn encode_commands(cycle_low: u8, commands: &[(Kind, StatusFlag, Payload)]) -> Vec<u8> {
    let n = commands.len().min(MAX_COMMANDS);
    let mut out = vec![0u8; packet_size(n)];
    out[0] = cycle_low;

    for (j, (kind, status, payload)) in commands.iter().take(n).enumerate() {
        out[1 + j] = status.apply(kind.to_wire());
        let block = &mut out[HEADER_SIZE + j * PAYLOAD_SIZE..HEADER_SIZE + (j + 1) * PAYLOAD_SIZE];
        write_payload(payload, block);
    }

    out
}

fn decode_commands(cycle_low: u8, kinds: &[u8], bytes: &[u8]) -> Result<Packet, Error> {
    let n = kinds
        .iter()
        .position(|&k| k == 0)
        .unwrap_or(MAX_COMMANDS);

    if bytes.len() != packet_size(n) {
        return Err(Error::BadPacket);
    }

    let mut commands = Vec::with_capacity(n);
    for j in 0..n {
        let kind = Kind::from_wire(kinds[j]).ok_or(Error::BadPacket)?;
        let status = StatusFlag::from_wire(kinds[j]);
        let block = &bytes[HEADER_SIZE + j * PAYLOAD_SIZE..HEADER_SIZE + (j + 1) * PAYLOAD_SIZE];
        let payload = read_payload(kind, block)?;
        commands.push((kind, status, payload));
    }

    Ok(Packet::Commands { cycle_low, commands })
}

/// The SELECTION overlay: `kinds[0]` stays the literal `SELECTION` marker (so incoming
/// packet dispatch can tell it apart from a `Commands` packet by inspecting `kinds[0]`
/// alone), `kinds[1]` is repurposed as a packed `{count: u6, add: u1, remove: u1}`
/// byte, and the entire payload region is repurposed as a flat `u16` unit-slot array.
fn encode_selection(sender: PeerId, mode: SelectionMode, units: &[u16]) -> Vec<u8> {
    let mut out = vec![0u8; SELECTION_SIZE];
    out[0] = sender;
    out[1] = Kind::Selection.to_wire();

    let count = units.len().min(MAX_SELECTION_UNITS) as u8;
    let (add, remove) = mode.to_bits();
    out[2] = count | ((add as u8) << 6) | ((remove as u8) << 7);

    let region = &mut out[HEADER_SIZE..];
    for (i, &unit) in units.iter().take(MAX_SELECTION_UNITS).enumerate() {
        BigEndian::write_u16(&mut region[i * 2..i * 2 + 2], unit);
    }

    out
}

fn decode_selection(sender_byte: u8, kinds: &[u8], bytes: &[u8]) -> Result<Packet, Error> {
    if bytes.len() != SELECTION_SIZE {
        return Err(Error::BadPacket);
    }

    let packed = kinds[1];
    let count = (packed & 0x3F) as usize;
    let add = packed & 0x40 != 0;
    let remove = packed & 0x80 != 0;
    let mode = SelectionMode::from_bits(add, remove)?;

    if count > MAX_SELECTION_UNITS {
        return Err(Error::BadPacket);
    }

    let region = &bytes[HEADER_SIZE..];
    let units = (0..count)
        .map(|i| BigEndian::read_u16(&region[i * 2..i * 2 + 2]))
        .collect();

    Ok(Packet::Selection {
        sender: sender_byte,
        mode,
        units,
    })
}

fn write_payload(payload: &Payload, block: &mut [u8]) {
    debug_assert_eq!(block.len(), PAYLOAD_SIZE);
    // Zero first: every variant below only writes the bytes its shape defines, and
    // the remainder must read back as zero rather than stale data.
    for b in block.iter_mut() {
        *b = 0;
    }

    match *payload {
        Payload::Gameplay {
            unit_slot,
            x,
            y,
            dest_or_type,
        } => {
            BigEndian::write_u16(&mut block[0..2], unit_slot);
            BigEndian::write_u16(&mut block[2..4], x);
            BigEndian::write_u16(&mut block[4..6], y);
            BigEndian::write_u16(&mut block[6..8], dest_or_type);
        }
        Payload::Extended {
            subkind,
            arg1,
            arg2,
            arg3,
            arg4,
        } => {
            block[0] = subkind;
            block[1] = arg1;
            BigEndian::write_u16(&mut block[2..4], arg2);
            BigEndian::write_u16(&mut block[4..6], arg3);
            BigEndian::write_u16(&mut block[6..8], arg4);
        }
        Payload::Chat { sender, chunk } => {
            block[0] = sender;
            block[1..8].copy_from_slice(&chunk);
        }
        Payload::Sync {
            hash_low,
            seed_high,
            seed_low,
        } => {
            BigEndian::write_u16(&mut block[0..2], hash_low);
            BigEndian::write_u16(&mut block[2..4], seed_high);
            BigEndian::write_u16(&mut block[4..6], seed_low);
        }
        Payload::Quit { peer } => {
            block[0] = peer;
        }
        Payload::Empty => {}
    }
}

fn read_payload(kind: Kind, block: &[u8]) -> Result<Payload, Error> {
    debug_assert_eq!(block.len(), PAYLOAD_SIZE);

    Ok(match kind {
        Kind::Gameplay(_) => Payload::Gameplay {
            unit_slot: BigEndian::read_u16(&block[0..2]),
            x: BigEndian::read_u16(&block[2..4]),
            y: BigEndian::read_u16(&block[4..6]),
            dest_or_type: BigEndian::read_u16(&block[6..8]),
        },
        Kind::Extended => Payload::Extended {
            subkind: block[0],
            arg1: block[1],
            arg2: BigEndian::read_u16(&block[2..4]),
            arg3: BigEndian::read_u16(&block[4..6]),
            arg4: BigEndian::read_u16(&block[6..8]),
        },
        Kind::Chat | Kind::ChatTerminal => {
            let mut chunk = [0u8; 7];
            chunk.copy_from_slice(&block[1..8]);
            Payload::Chat { sender: block[0], chunk }
        }
        Kind::Sync => Payload::Sync {
            hash_low: BigEndian::read_u16(&block[0..2]),
            seed_high: BigEndian::read_u16(&block[2..4]),
            seed_low: BigEndian::read_u16(&block[4..6]),
        },
        Kind::Quit => Payload::Quit { peer: block[0] },
        Kind::None => return Err(Error::BadPacket),
        Kind::QuitAck | Kind::Resend | Kind::Selection => Payload::Empty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::gameplay;

    #[test]
    fn cycle_division_recovers_unique_full_cycle() {
        for current in [0u32, 1, 128, 255, 256, 511, 1_000_000].iter().copied() {
            for wire_byte in 0..=255u8 {
                let decoded = decode_cycle(current, wire_byte);
                assert_eq!(decoded & 0xFF, wire_byte as u32);
                assert!(decoded as i64 >= current as i64 - 127);
                assert!(decoded as i64 <= current as i64 + 128);
            }
        }
    }

    #[test]
    fn cycle_division_wraps_low_byte_past_boundary() {
        assert_eq!(decode_cycle(0x1FF, 0x00), 0x200);
    }

    #[test]
    fn commands_packet_round_trips() {
        let commands = vec![
            (
                Kind::Gameplay(gameplay::MOVE),
                StatusFlag::Flush,
                Payload::Gameplay {
                    unit_slot: 4,
                    x: 100,
                    y: 200,
                    dest_or_type: 0,
                },
            ),
            (
                Kind::Sync,
                StatusFlag::Append,
                Payload::Sync {
                    hash_low: 0xBEEF,
                    seed_high: 0x1234,
                    seed_low: 0x5678,
                },
            ),
        ];

        let packet = Packet::Commands {
            cycle_low: 42,
            commands,
        };

        let bytes = packet.encode();
        assert_eq!(bytes.len(), packet_size(2));

        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn empty_commands_packet_is_just_the_header() {
        let packet = Packet::Commands {
            cycle_low: 7,
            commands: vec![],
        };
        let bytes = packet.encode();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn resend_packet_round_trips() {
        let packet = Packet::resend(99);
        let bytes = packet.encode();
        assert_eq!(bytes.len(), RESEND_SIZE);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn selection_packet_round_trips() {
        let units = [1, 2, 3, 4, 5];
        let packet = Packet::selection(3, SelectionMode::Add, &units);
        let bytes = packet.encode();
        assert_eq!(bytes.len(), SELECTION_SIZE);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn bad_packet_on_short_buffer() {
        assert_eq!(Packet::decode(&[0u8; 2]), Err(Error::BadPacket));
    }

    #[test]
    fn bad_packet_on_mismatched_length() {
        // Claims 2 commands present via kinds but only ships 1 payload block.
        let mut bytes = vec![0u8; packet_size(1)];
        bytes[1] = Kind::Sync.to_wire();
        bytes[2] = Kind::Sync.to_wire();
        assert_eq!(Packet::decode(&bytes), Err(Error::BadPacket));
    }
}
