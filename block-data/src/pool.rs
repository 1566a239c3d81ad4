use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::{block::Block, error::Error};

struct State {
    allocated: usize,
}

struct Inner {
    block_size: usize,
    soft_limit_blocks: usize,
    state: Mutex<State>,
    not_full: Condvar,
}

/// A soft-capped source of fixed-size [`Block`]s.
///
/// `allocate` blocks the calling thread whenever the pool's outstanding
/// block count would exceed `mem_limit / block_size`, the soft cap described
/// in the host context's memory budget (`# 4.9`). Capacity is returned to
/// the pool automatically once every clone of an allocated [`Block`] is
/// dropped — callers never `free` explicitly.
///
/// This is meant to be called from worker threads doing synchronous
/// processing, not from inside the async dispatcher: the dispatcher should
/// use [`BlockPool::try_allocate`] and fall back to `spawn_blocking`, or
/// simply not allocate under backpressure it cannot afford to block on.
#[derive(Clone)]
pub struct BlockPool {
    inner: Arc<Inner>,
}

impl BlockPool {
    pub fn new(block_size: usize, mem_limit: usize) -> Result<Self, Error> {
        if block_size == 0 {
            return Err(Error::ZeroBlockSize);
        }
        let soft_limit_blocks = (mem_limit / block_size).max(1);
        Ok(Self {
            inner: Arc::new(Inner {
                block_size,
                soft_limit_blocks,
                state: Mutex::new(State { allocated: 0 }),
                not_full: Condvar::new(),
            }),
        })
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    pub fn soft_limit_blocks(&self) -> usize {
        self.inner.soft_limit_blocks
    }

    pub fn allocated_blocks(&self) -> usize {
        self.inner.state.lock().allocated
    }

    /// Allocate a block holding `data` (must be `<= block_size`), blocking
    /// the calling thread while the pool is at its soft cap.
    pub fn allocate(&self, data: Vec<u8>) -> Result<Block, Error> {
        if data.len() > self.inner.block_size {
            return Err(Error::BlockTooLarge {
                len: data.len(),
                block_size: self.inner.block_size,
            });
        }
        let mut state = self.inner.state.lock();
        while state.allocated >= self.inner.soft_limit_blocks {
            trace!(allocated = state.allocated, "block pool: blocking allocator");
            self.inner.not_full.wait(&mut state);
        }
        state.allocated += 1;
        drop(state);
        Ok(Block::new(data, self.inner.clone()))
    }

    /// Like [`BlockPool::allocate`], but returns `Ok(None)` immediately
    /// instead of blocking when the pool is at its soft cap.
    pub fn try_allocate(&self, data: Vec<u8>) -> Result<Option<Block>, Error> {
        if data.len() > self.inner.block_size {
            return Err(Error::BlockTooLarge {
                len: data.len(),
                block_size: self.inner.block_size,
            });
        }
        let mut state = self.inner.state.lock();
        if state.allocated >= self.inner.soft_limit_blocks {
            return Ok(None);
        }
        state.allocated += 1;
        drop(state);
        Ok(Some(Block::new(data, self.inner.clone())))
    }
}

pub(crate) fn release(inner: &Inner) {
    let mut state = inner.state.lock();
    state.allocated -= 1;
    drop(state);
    inner.not_full.notify_one();
}

pub(crate) type PoolInner = Inner;
