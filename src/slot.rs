// src/slot.rs

//! Key-to-slot derivation, including the hash-tag rule.

use crc::{Crc, CRC_16_XMODEM};

/// Total number of hash slots a cluster is partitioned into.
pub const NUM_SLOTS: usize = 16384;

static CRC16_ALGO: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Computes the hash slot a key belongs to.
///
/// If the key contains a `{...}` hash tag with non-empty contents, only the tag's
/// contents are hashed; otherwise the whole key is hashed. An empty key hashes to
/// slot 0 (the CRC of an empty buffer is 0).
pub fn calc_slot(key: &[u8]) -> u16 {
    let hashed = match hash_tag(key) {
        Some(tag) => tag,
        None => key,
    };
    CRC16_ALGO.checksum(hashed) % NUM_SLOTS as u16
}

/// Extracts the `{tag}` substring used for hash-tag routing, if present and non-empty.
fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let start = key.iter().position(|&b| b == b'{')?;
    let end_rel = key[start + 1..].iter().position(|&b| b == b'}')?;
    if end_rel == 0 {
        return None;
    }
    Some(&key[start + 1..start + 1 + end_rel])
}
