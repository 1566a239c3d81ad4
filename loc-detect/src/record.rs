//! Wire records exchanged by the location-detection protocol (§4.8's
//! "LocationDetection record"): occurrence tuples for the hash-range
//! exchange, and winner pairs for the final broadcast. Both are packed as
//! one bitstream per destination — a golomb-coded delta against the
//! previous entry's hash, followed by a handful of fixed-width bits, rather
//! than one machine word per field.

use crate::golomb::{BitReader, BitWriter, GolombParams};
use crate::Error;

/// One local `(hash, count, dia-index-bits)` observation, keyed by the
/// projected hash `h ∈ [0, b·U)` (§4.8 stage 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub h: u64,
    pub count: u8,
    pub dia_bits: u8,
}

/// A winning `(hash, rank)` pair from stage 3, broadcast in stage 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinnerPair {
    pub h: u64,
    pub rank: u32,
}

fn bits_for(max_value: u32) -> u32 {
    if max_value == 0 {
        1
    } else {
        32 - max_value.leading_zeros()
    }
}

/// Bit width wide enough to hold any rank in `[0, num_hosts)`.
pub(crate) fn rank_bits(num_hosts: usize) -> u32 {
    bits_for((num_hosts.max(1) - 1) as u32)
}

/// Encode `entries` (must already be sorted ascending by `h`) as a
/// golomb-coded bitset: each entry's `h` is delta-coded against the
/// previous one (against `0` for the first) with divisor `b`, followed by
/// an 8-bit count and a 2-bit dia-bits field.
pub(crate) fn encode_occurrences(entries: &[Occurrence], b: u64) -> Result<Vec<u8>, Error> {
    let params = GolombParams::new(b)?;
    let mut writer = BitWriter::new();
    let mut prev = 0u64;
    for entry in entries {
        debug_assert!(entry.h >= prev, "occurrences must be encoded in ascending hash order");
        params.write(&mut writer, entry.h - prev);
        writer.write_bits(entry.count as u64, 8);
        writer.write_bits(entry.dia_bits as u64, 2);
        prev = entry.h;
    }
    Ok(writer.finish())
}

pub(crate) fn decode_occurrences(bytes: &[u8], b: u64, count: usize) -> Result<Vec<Occurrence>, Error> {
    let params = GolombParams::new(b)?;
    let mut reader = BitReader::new(bytes);
    let mut out = Vec::with_capacity(count);
    let mut prev = 0u64;
    for _ in 0..count {
        let delta = params.read(&mut reader)?;
        let h = prev + delta;
        let count_field = reader.read_bits(8).ok_or(Error::TruncatedStream)?;
        let dia_bits = reader.read_bits(2).ok_or(Error::TruncatedStream)?;
        out.push(Occurrence { h, count: count_field as u8, dia_bits: dia_bits as u8 });
        prev = h;
    }
    Ok(out)
}

/// Encode winning `(h, rank)` pairs (§4.8 stage 4), delta-coding `h` the
/// same way as [`encode_occurrences`] and packing `rank` into the smallest
/// fixed field that can hold any rank of the group.
pub(crate) fn encode_winners(pairs: &[WinnerPair], b: u64, num_hosts: usize) -> Result<Vec<u8>, Error> {
    let params = GolombParams::new(b)?;
    let rbits = rank_bits(num_hosts);
    let mut writer = BitWriter::new();
    let mut prev = 0u64;
    for pair in pairs {
        debug_assert!(pair.h >= prev, "winners must be encoded in ascending hash order");
        params.write(&mut writer, pair.h - prev);
        writer.write_bits(pair.rank as u64, rbits);
        prev = pair.h;
    }
    Ok(writer.finish())
}

pub(crate) fn decode_winners(bytes: &[u8], b: u64, num_hosts: usize, count: usize) -> Result<Vec<WinnerPair>, Error> {
    let params = GolombParams::new(b)?;
    let rbits = rank_bits(num_hosts);
    let mut reader = BitReader::new(bytes);
    let mut out = Vec::with_capacity(count);
    let mut prev = 0u64;
    for _ in 0..count {
        let delta = params.read(&mut reader)?;
        let h = prev + delta;
        let rank = reader.read_bits(rbits).ok_or(Error::TruncatedStream)?;
        out.push(WinnerPair { h, rank: rank as u32 });
        prev = h;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrences_roundtrip_in_ascending_order() {
        let entries = vec![
            Occurrence { h: 3, count: 1, dia_bits: 1 },
            Occurrence { h: 3, count: 250, dia_bits: 3 },
            Occurrence { h: 9, count: 0, dia_bits: 2 },
            Occurrence { h: 1000, count: 42, dia_bits: 1 },
        ];
        let encoded = encode_occurrences(&entries, 8).unwrap();
        let decoded = decode_occurrences(&encoded, 8, entries.len()).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn winners_roundtrip_with_full_rank_range() {
        let pairs = vec![
            WinnerPair { h: 0, rank: 0 },
            WinnerPair { h: 5, rank: 7 },
            WinnerPair { h: 500, rank: 3 },
        ];
        let encoded = encode_winners(&pairs, 5, 8).unwrap();
        let decoded = decode_winners(&encoded, 5, 8, pairs.len()).unwrap();
        assert_eq!(decoded, pairs);
    }

    #[test]
    fn rank_bits_covers_single_host_group() {
        assert_eq!(rank_bits(1), 1);
        assert_eq!(rank_bits(2), 1);
        assert_eq!(rank_bits(3), 2);
        assert_eq!(rank_bits(256), 8);
    }
}
