/// Encodes and decodes `(key, value)` pairs to bytes for spilling to a
/// [`block_data::File`].
///
/// This crate carries no generic serialization dependency: callers supply
/// the codec for their own key/value types, the same explicit-encoding
/// pattern `net_group::Wire` and `net_stream::StreamHeader` use for their
/// wire formats.
pub trait Codec<K, V>: Clone {
    fn encode(&self, key: &K, value: &V) -> Vec<u8>;
    fn decode(&self, bytes: &[u8]) -> (K, V);
}

/// A codec for `(usize, u64)` pairs: fixed 16-byte little-endian encoding.
/// Convenient for word-count-shaped reduces and the `ReduceToIndex` sum
/// scenario.
#[derive(Clone, Copy, Debug, Default)]
pub struct UsizeU64Codec;

impl Codec<usize, u64> for UsizeU64Codec {
    fn encode(&self, key: &usize, value: &u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&(*key as u64).to_le_bytes());
        buf.extend_from_slice(&value.to_le_bytes());
        buf
    }

    fn decode(&self, bytes: &[u8]) -> (usize, u64) {
        let key = u64::from_le_bytes(bytes[0..8].try_into().unwrap()) as usize;
        let value = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        (key, value)
    }
}

/// A codec for `(String, u64)` pairs: length-prefixed UTF-8 key followed by
/// an 8-byte little-endian count. Convenient for word-count reduces.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringU64Codec;

impl Codec<String, u64> for StringU64Codec {
    fn encode(&self, key: &String, value: &u64) -> Vec<u8> {
        let bytes = key.as_bytes();
        let mut buf = Vec::with_capacity(4 + bytes.len() + 8);
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
        buf.extend_from_slice(&value.to_le_bytes());
        buf
    }

    fn decode(&self, bytes: &[u8]) -> (String, u64) {
        let key_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let key = String::from_utf8(bytes[4..4 + key_len].to_vec()).expect("codec round-trip of a value we encoded ourselves");
        let value = u64::from_le_bytes(bytes[4 + key_len..4 + key_len + 8].try_into().unwrap());
        (key, value)
    }
}
