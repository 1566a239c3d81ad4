//! The 24-byte `WelcomeMsg` exchanged when a connection is first established.
//!
//! Mirrors the handshake phases from `thrill::net::Manager::Construct`: the
//! active side (the higher-ranked peer, per `Group::connect`) sends first,
//! then reads the passive side's reply. Both sides learn the peer's claimed
//! rank and the group they believe they are joining, so a misconfigured host
//! list fails fast with [`crate::Error::BadHandshake`] instead of silently
//! wiring ranks together.

pub const MAGIC: u64 = 0x5448_524c_4c4b_3031; // "THRLLK01"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WelcomeMsg {
    pub magic: u64,
    pub group_id: u64,
    pub sender_rank: u64,
}

impl WelcomeMsg {
    pub const ENCODED_LEN: usize = 24;

    pub fn new(group_id: u64, sender_rank: u64) -> Self {
        Self {
            magic: MAGIC,
            group_id,
            sender_rank,
        }
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..8].copy_from_slice(&self.magic.to_le_bytes());
        buf[8..16].copy_from_slice(&self.group_id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.sender_rank.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::Error> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(crate::Error::BadHandshake(format!(
                "expected {} bytes, got {}",
                Self::ENCODED_LEN,
                bytes.len()
            )));
        }
        let magic = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let group_id = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let sender_rank = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        if magic != MAGIC {
            return Err(crate::Error::BadHandshake(format!(
                "bad magic {:#x}, expected {:#x}",
                magic, MAGIC
            )));
        }
        Ok(Self {
            magic,
            group_id,
            sender_rank,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let msg = WelcomeMsg::new(7, 3);
        let bytes = msg.encode();
        assert_eq!(WelcomeMsg::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = WelcomeMsg::new(1, 0).encode();
        bytes[0] ^= 0xff;
        assert!(WelcomeMsg::decode(&bytes).is_err());
    }
}
