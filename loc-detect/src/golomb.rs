//! General Golomb coding (not restricted to powers of two): for a divisor
//! `m`, `q = v / m` is unary-coded and the remainder `r = v % m` is coded in
//! truncated binary, so that `m` need not be a power of two (Rice coding is
//! the special case where it is). [`record`](crate::record) builds on the
//! low-level [`BitWriter`]/[`BitReader`] pair directly, interleaving
//! golomb-coded hash deltas with fixed-width count/tag fields in one
//! bitstream.

use crate::Error;

pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    cur: u8,
    nbits: u8,
}

impl BitWriter {
    pub(crate) fn new() -> Self {
        Self { bytes: Vec::new(), cur: 0, nbits: 0 }
    }

    pub(crate) fn write_bit(&mut self, bit: bool) {
        self.cur = (self.cur << 1) | bit as u8;
        self.nbits += 1;
        if self.nbits == 8 {
            self.bytes.push(self.cur);
            self.cur = 0;
            self.nbits = 0;
        }
    }

    pub(crate) fn write_bits(&mut self, value: u64, n: u32) {
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    pub(crate) fn write_unary(&mut self, q: u64) {
        for _ in 0..q {
            self.write_bit(true);
        }
        self.write_bit(false);
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        if self.nbits > 0 {
            self.cur <<= 8 - self.nbits;
            self.bytes.push(self.cur);
        }
        self.bytes
    }
}

pub(crate) struct BitReader<'a> {
    bytes: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, byte_pos: 0, bit_pos: 0 }
    }

    pub(crate) fn read_bit(&mut self) -> Option<bool> {
        if self.byte_pos >= self.bytes.len() {
            return None;
        }
        let bit = (self.bytes[self.byte_pos] >> (7 - self.bit_pos)) & 1 == 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Some(bit)
    }

    pub(crate) fn read_bits(&mut self, n: u32) -> Option<u64> {
        let mut v = 0u64;
        for _ in 0..n {
            v = (v << 1) | self.read_bit()? as u64;
        }
        Some(v)
    }

    pub(crate) fn read_unary(&mut self) -> Option<u64> {
        let mut q = 0u64;
        loop {
            match self.read_bit()? {
                true => q += 1,
                false => return Some(q),
            }
        }
    }

    #[cfg(test)]
    fn at_end(&self) -> bool {
        self.byte_pos >= self.bytes.len()
    }
}

fn ceil_log2(m: u64) -> u32 {
    if m <= 1 {
        0
    } else {
        64 - (m - 1).leading_zeros()
    }
}

/// Precomputed truncated-binary parameters for a fixed divisor `m`, shared
/// by every value golomb-coded against that divisor.
#[derive(Clone, Copy)]
pub(crate) struct GolombParams {
    m: u64,
    k: u32,
    c: u64,
}

impl GolombParams {
    pub(crate) fn new(m: u64) -> Result<Self, Error> {
        if m == 0 {
            return Err(Error::InvalidDivisor);
        }
        let k = ceil_log2(m);
        let c = (1u64 << k) - m;
        Ok(Self { m, k, c })
    }

    pub(crate) fn write(&self, writer: &mut BitWriter, v: u64) {
        let q = v / self.m;
        let r = v % self.m;
        writer.write_unary(q);
        if self.k > 0 {
            if r < self.c {
                writer.write_bits(r, self.k - 1);
            } else {
                writer.write_bits(r + self.c, self.k);
            }
        }
    }

    pub(crate) fn read(&self, reader: &mut BitReader) -> Result<u64, Error> {
        let q = reader.read_unary().ok_or(Error::TruncatedStream)?;
        let r = if self.k == 0 {
            0
        } else {
            let x = reader.read_bits(self.k - 1).ok_or(Error::TruncatedStream)?;
            if x < self.c {
                x
            } else {
                let b = reader.read_bit().ok_or(Error::TruncatedStream)?;
                x * 2 + b as u64 - self.c
            }
        };
        Ok(q * self.m + r)
    }
}

/// Appends a stream of `u64` values, each Golomb-coded against a fixed
/// divisor `m`. A thin convenience wrapper over [`GolombParams`] for callers
/// (tests, and any future homogeneous-stream use) that don't need to
/// interleave raw fixed-width fields between values.
pub struct GolombWriter {
    params: GolombParams,
    bits: BitWriter,
    count: usize,
}

impl GolombWriter {
    pub fn new(m: u64) -> Result<Self, Error> {
        Ok(Self { params: GolombParams::new(m)?, bits: BitWriter::new(), count: 0 })
    }

    pub fn write(&mut self, v: u64) {
        self.params.write(&mut self.bits, v);
        self.count += 1;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn finish(self) -> Vec<u8> {
        self.bits.finish()
    }
}

/// Reads back a stream produced by [`GolombWriter`]. The caller must know
/// how many values were written (the bitstream carries no terminator, since
/// trailing zero bits from byte-padding would be indistinguishable from a
/// genuine final unary `0`), which every location-detection message frames
/// with an explicit count.
pub struct GolombReader<'a> {
    params: GolombParams,
    bits: BitReader<'a>,
}

impl<'a> GolombReader<'a> {
    pub fn new(bytes: &'a [u8], m: u64) -> Result<Self, Error> {
        Ok(Self { params: GolombParams::new(m)?, bits: BitReader::new(bytes) })
    }

    pub fn read_one(&mut self) -> Result<u64, Error> {
        self.params.read(&mut self.bits)
    }

    pub fn read_n(&mut self, n: usize) -> Result<Vec<u64>, Error> {
        (0..n).map(|_| self.read_one()).collect()
    }

    #[cfg(test)]
    fn exhausted(&self) -> bool {
        self.bits.at_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(m: u64, values: &[u64]) {
        let mut w = GolombWriter::new(m).unwrap();
        for &v in values {
            w.write(v);
        }
        let encoded = w.finish();
        let mut r = GolombReader::new(&encoded, m).unwrap();
        let decoded = r.read_n(values.len()).unwrap();
        assert_eq!(decoded, values, "m = {}", m);
    }

    #[test]
    fn power_of_two_divisor_behaves_like_rice_coding() {
        roundtrip(8, &[0, 1, 7, 8, 9, 63, 1000]);
    }

    #[test]
    fn non_power_of_two_divisor() {
        roundtrip(5, &[0, 1, 4, 5, 6, 24, 25, 26, 500]);
    }

    #[test]
    fn divisor_of_one_degenerates_to_pure_unary() {
        roundtrip(1, &[0, 1, 2, 3, 10]);
    }

    #[test]
    fn zero_divisor_is_rejected() {
        assert!(matches!(GolombWriter::new(0), Err(Error::InvalidDivisor)));
    }

    #[test]
    fn empty_stream_roundtrips() {
        let w = GolombWriter::new(7).unwrap();
        let encoded = w.finish();
        assert!(encoded.is_empty());
        let mut r = GolombReader::new(&encoded, 7).unwrap();
        assert!(r.exhausted());
    }
}
