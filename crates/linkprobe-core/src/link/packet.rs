//! Packet encoding
//!
//! Packet format (one line of ASCII):
//! - N bytes: payload, drawn from `A-Z0-9`
//! - integrity code: `0x` + lowercase hex CRC-32/ISO-HDLC of the payload,
//!   no zero padding
//! - `\r\n`
//!
//! N is not on the wire. Both sides know it from the round being run.

use crc32fast::Hasher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Characters a payload is drawn from
pub const PAYLOAD_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Line terminator appended to every packet
pub const TERMINATOR: &[u8] = b"\r\n";

/// Integrity code of a payload: `0x` followed by the CRC-32 in lowercase hex
pub fn checksum(payload: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    format!("{:#x}", hasher.finalize())
}

/// A payload and its integrity code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Payload characters
    pub payload: String,
    /// Integrity code expected back from every receiver
    pub integrity: String,
}

impl Packet {
    /// Create a packet for `payload`, computing its integrity code
    pub fn new(payload: String) -> Self {
        let integrity = checksum(payload.as_bytes());
        Self { payload, integrity }
    }

    /// Payload length in characters
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encode the packet to the bytes written by the sender
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(self.payload.len() + self.integrity.len() + TERMINATOR.len());
        bytes.extend_from_slice(self.payload.as_bytes());
        bytes.extend_from_slice(self.integrity.as_bytes());
        bytes.extend_from_slice(TERMINATOR);
        bytes
    }
}

/// Extract the integrity code from a received line
///
/// Skips the first `payload_len` bytes and trims surrounding whitespace from
/// the rest. A line shorter than the payload yields an empty code.
pub fn received_integrity(line: &[u8], payload_len: usize) -> String {
    let tail = line.get(payload_len..).unwrap_or_default();
    String::from_utf8_lossy(tail).trim().to_string()
}

/// A receiver's line, split into what it claims and what it carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Integrity code found after the payload region
    pub integrity: String,
    /// Integrity code recomputed over the payload region as received
    pub payload_code: String,
}

impl Received {
    /// Split `line` at `payload_len`
    ///
    /// A line shorter than the payload is hashed whole.
    pub fn parse(line: &[u8], payload_len: usize) -> Self {
        let payload = line.get(..payload_len).unwrap_or(line);
        Self {
            integrity: received_integrity(line, payload_len),
            payload_code: checksum(payload),
        }
    }

    /// Both the trailing code and the payload agree with `packet`
    pub fn verifies(&self, packet: &Packet) -> bool {
        self.integrity == packet.integrity && self.payload_code == packet.integrity
    }
}

/// Source of random payloads
///
/// Owned by whoever runs rounds so tests can seed it.
pub struct PayloadGenerator {
    rng: StdRng,
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadGenerator {
    /// Generator seeded from the OS
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `length` characters drawn uniformly from [`PAYLOAD_ALPHABET`]
    pub fn payload(&mut self, length: usize) -> String {
        (0..length)
            .map(|_| PAYLOAD_ALPHABET[self.rng.gen_range(0..PAYLOAD_ALPHABET.len())] as char)
            .collect()
    }

    /// A fresh packet with a `length`-character payload
    pub fn packet(&mut self, length: usize) -> Packet {
        Packet::new(self.payload(length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_value() {
        // CRC-32/ISO-HDLC check value
        assert_eq!(checksum(b"123456789"), "0xcbf43926");
    }

    #[test]
    fn test_checksum_has_no_zero_padding() {
        // crc32("") == 0
        assert_eq!(checksum(b""), "0x0");
    }

    #[test]
    fn test_checksum_deterministic() {
        let mut gen = PayloadGenerator::from_seed(7);
        for length in [1, 2, 17, 256, 2000] {
            let payload = gen.payload(length);
            assert_eq!(checksum(payload.as_bytes()), checksum(payload.as_bytes()));
        }
    }

    #[test]
    fn test_packet_encoding() {
        let packet = Packet::new("123456789".to_string());
        assert_eq!(packet.to_bytes(), b"1234567890xcbf43926\r\n".to_vec());
    }

    #[test]
    fn test_received_integrity() {
        let packet = Packet::new("HELLO42".to_string());
        let line = packet.to_bytes();
        assert_eq!(received_integrity(&line, 7), packet.integrity);
    }

    #[test]
    fn test_received_integrity_short_line() {
        assert_eq!(received_integrity(b"ABC", 10), "");
    }

    #[test]
    fn test_received_verifies_intact_line() {
        let packet = Packet::new("LINK42".to_string());
        assert!(Received::parse(&packet.to_bytes(), 6).verifies(&packet));
    }

    #[test]
    fn test_received_payload_flip_fails() {
        let packet = Packet::new("LINK42".to_string());
        let mut line = packet.to_bytes();
        line[2] ^= 0x01;
        let received = Received::parse(&line, 6);
        assert_eq!(received.integrity, packet.integrity);
        assert_ne!(received.payload_code, packet.integrity);
        assert!(!received.verifies(&packet));
    }

    #[test]
    fn test_received_short_line_fails() {
        let packet = Packet::new("LINK42".to_string());
        assert!(!Received::parse(b"LIN", 6).verifies(&packet));
    }

    #[test]
    fn test_payload_alphabet_and_length() {
        let mut gen = PayloadGenerator::from_seed(1);
        let payload = gen.payload(500);
        assert_eq!(payload.len(), 500);
        assert!(payload.bytes().all(|b| PAYLOAD_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_payloads_differ_between_rounds() {
        let mut gen = PayloadGenerator::from_seed(3);
        assert_ne!(gen.payload(32), gen.payload(32));
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = PayloadGenerator::from_seed(99);
        let mut b = PayloadGenerator::from_seed(99);
        assert_eq!(a.packet(64), b.packet(64));
    }

    #[test]
    fn test_single_byte_corruption_detected() {
        let mut gen = PayloadGenerator::from_seed(11);
        let packet = gen.packet(40);
        let mut bytes = packet.payload.clone().into_bytes();
        for i in 0..bytes.len() {
            let original = bytes[i];
            bytes[i] ^= 0x01;
            assert_ne!(checksum(&bytes), packet.integrity, "flip at {i} undetected");
            bytes[i] = original;
        }
    }
}
