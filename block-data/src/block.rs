use std::{ops::Deref, sync::Arc};

use crate::pool::{self, PoolInner};

struct Inner {
    bytes: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        pool::release(&self.pool);
    }
}

/// A pinned, fixed-size, reference-counted byte buffer handed out by a
/// [`crate::BlockPool`].
///
/// Cloning a `Block` is cheap (an `Arc` bump); the bytes are never copied or
/// resized after allocation. The block's capacity is returned to its pool
/// when the last clone is dropped.
#[derive(Clone)]
pub struct Block {
    inner: Arc<Inner>,
}

impl Block {
    pub(crate) fn new(bytes: Vec<u8>, pool: Arc<PoolInner>) -> Self {
        Self {
            inner: Arc::new(Inner { bytes, pool }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner.bytes
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block").field("len", &self.len()).finish()
    }
}
