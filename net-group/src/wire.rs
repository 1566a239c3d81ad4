//! Fixed-width little-endian encoding for values moved by collectives.
//!
//! The stream layer (C5) treats records as opaque, length-prefixed byte
//! spans; collectives are different, they need an actual `T: Copy` value
//! that can be combined with `⊕` between rounds, so they get their own small
//! codec rather than reusing the serializer stream users plug in.

/// A value a collective can exchange between ranks.
pub trait Wire: Copy + Send + 'static {
    const SIZE: usize;

    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_wire_int {
    ($($t:ty),*) => {
        $(
            impl Wire for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn encode(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_wire_int!(u8, u16, u32, u64, i8, i16, i32, i64, usize);

impl Wire for f64 {
    const SIZE: usize = 8;

    fn encode(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(buf)
    }
}
