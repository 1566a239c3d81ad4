//! The 32-byte header prefixing every block sent on the wire, per `# 6`.

use crate::Error;

pub const MAGIC: u32 = 0x5354_5230; // "STR0"
pub const CLOSE_FLAG: u8 = 0b0000_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub stream_id: u32,
    pub from_worker: u32,
    pub to_worker: u32,
    pub item_count: u32,
    pub payload_size: u32,
    pub flags: u8,
}

impl StreamHeader {
    pub const ENCODED_LEN: usize = 32;

    pub fn is_close(&self) -> bool {
        self.flags & CLOSE_FLAG != 0
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.stream_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.from_worker.to_le_bytes());
        buf[12..16].copy_from_slice(&self.to_worker.to_le_bytes());
        buf[16..20].copy_from_slice(&self.item_count.to_le_bytes());
        buf[20..24].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[24] = self.flags;
        // bytes 25..32 stay zero (reserved)
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(Error::BadHeader(format!(
                "expected {} bytes, got {}",
                Self::ENCODED_LEN,
                bytes.len()
            )));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::BadHeader(format!("bad magic {:#x}", magic)));
        }
        Ok(Self {
            stream_id: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            from_worker: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            to_worker: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            item_count: u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
            payload_size: u32::from_le_bytes(bytes[20..24].try_into().unwrap()),
            flags: bytes[24],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let h = StreamHeader {
            stream_id: 7,
            from_worker: 1,
            to_worker: 2,
            item_count: 3,
            payload_size: 128,
            flags: CLOSE_FLAG,
        };
        let bytes = h.encode();
        assert_eq!(bytes.len(), StreamHeader::ENCODED_LEN);
        let decoded = StreamHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, h);
        assert!(decoded.is_close());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = StreamHeader {
            stream_id: 0,
            from_worker: 0,
            to_worker: 0,
            item_count: 0,
            payload_size: 0,
            flags: 0,
        }
        .encode();
        bytes[0] ^= 0xff;
        assert!(StreamHeader::decode(&bytes).is_err());
    }
}
