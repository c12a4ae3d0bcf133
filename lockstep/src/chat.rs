//! Chat messages arrive as a run of 7-byte fragments: zero or more `CHAT` commands
//! followed by exactly one `CHAT_TERMINAL`, all carrying the same sender. The
//! terminal fragment may be short-padded with trailing zero bytes, which are
//! stripped from the reassembled message.

use crate::command::{Kind, Payload};
use crate::peer::PeerId;
use hashbrown::HashMap;

/// Per-sender accumulation cap (§4.G). A sender that exceeds this before its
/// terminal fragment arrives has its overflow silently truncated rather than
/// growing the buffer without bound.
pub const MAX_MESSAGE_BYTES: usize = 128;

#[derive(Default)]
pub struct ChatReassembler {
    pending: HashMap<PeerId, Vec<u8>>,
}

impl ChatReassembler {
    pub fn new() -> ChatReassembler {
        ChatReassembler::default()
    }

    /// Feeds one chat fragment. Returns the reassembled message once a
    /// `CHAT_TERMINAL` fragment completes it.
    pub fn feed(&mut self, kind: Kind, payload: &Payload) -> Option<(PeerId, String)> {
        let (sender, chunk) = match payload {
            Payload::Chat { sender, chunk } => (*sender, *chunk),
            _ => return None,
        };

        let buffer = self.pending.entry(sender).or_insert_with(Vec::new);

        match kind {
            Kind::Chat => {
                append_truncating(buffer, &chunk);
                None
            }
            Kind::ChatTerminal => {
                let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                append_truncating(buffer, &chunk[..end]);
                let message = String::from_utf8_lossy(buffer).into_owned();
                self.pending.remove(&sender);
                Some((sender, message))
            }
            _ => None,
        }
    }

    /// Drops any in-flight fragments for `sender` — used when a peer quits or times
    /// out mid-message so a stale partial message can never be completed later by a
    /// reused sender id... though sender ids are not reused within a session, this
    /// still bounds memory for peers that quit mid-fragment.
    pub fn drop_pending(&mut self, sender: PeerId) {
        self.pending.remove(&sender);
    }
}

/// Appends as much of `bytes` as fits under [`MAX_MESSAGE_BYTES`], dropping the rest.
fn append_truncating(buffer: &mut Vec<u8>, bytes: &[u8]) {
    let room = MAX_MESSAGE_BYTES.saturating_sub(buffer.len());
    let take = bytes.len().min(room);
    buffer.extend_from_slice(&bytes[..take]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(sender: PeerId, text: &[u8]) -> Payload {
        let mut chunk = [0u8; 7];
        chunk[..text.len()].copy_from_slice(text);
        Payload::Chat { sender, chunk }
    }

    #[test]
    fn single_fragment_message_reassembles() {
        let mut r = ChatReassembler::new();
        let result = r.feed(Kind::ChatTerminal, &chat(1, b"hi"));
        assert_eq!(result, Some((1, "hi".to_string())));
    }

    #[test]
    fn multi_fragment_message_reassembles_in_order() {
        let mut r = ChatReassembler::new();
        assert!(r.feed(Kind::Chat, &chat(2, b"hello, ")).is_none());
        let result = r.feed(Kind::ChatTerminal, &chat(2, b"world"));
        assert_eq!(result, Some((2, "hello, world".to_string())));
    }

    #[test]
    fn distinct_senders_do_not_interleave() {
        let mut r = ChatReassembler::new();
        r.feed(Kind::Chat, &chat(1, b"a"));
        r.feed(Kind::Chat, &chat(2, b"b"));
        let done1 = r.feed(Kind::ChatTerminal, &chat(1, b"1"));
        assert_eq!(done1, Some((1, "a1".to_string())));
        let done2 = r.feed(Kind::ChatTerminal, &chat(2, b"2"));
        assert_eq!(done2, Some((2, "b2".to_string())));
    }

    #[test]
    fn dropped_sender_loses_pending_fragments() {
        let mut r = ChatReassembler::new();
        r.feed(Kind::Chat, &chat(1, b"partial"));
        r.drop_pending(1);
        let result = r.feed(Kind::ChatTerminal, &chat(1, b"end"));
        assert_eq!(result, Some((1, "end".to_string())));
    }

    #[test]
    fn overflowing_message_is_truncated_rather_than_unbounded() {
        let mut r = ChatReassembler::new();
        // 20 fragments of 7 bytes each = 140 bytes, past the 128-byte cap.
        for _ in 0..19 {
            r.feed(Kind::Chat, &chat(1, b"1234567"));
        }
        let result = r.feed(Kind::ChatTerminal, &chat(1, b"1234567"));
        let (sender, message) = result.unwrap();
        assert_eq!(sender, 1);
        assert_eq!(message.len(), MAX_MESSAGE_BYTES);
    }
}
