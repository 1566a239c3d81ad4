use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::block::Block;

struct State {
    items: VecDeque<Block>,
    closed: bool,
}

/// A single-producer, single-consumer blocking queue of [`Block`]s with a
/// close sentinel.
///
/// Mirrors `thrill::data::BlockQueue`: a writer pushes blocks and finally
/// calls [`BlockQueue::close`]; a reader blocks in [`BlockQueue::pop`] until
/// a block is available or the queue is closed and drained, at which point
/// `pop` returns `None` forever after.
pub struct BlockQueue {
    state: Mutex<State>,
    not_empty: Condvar,
}

impl BlockQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Push a block. Panics if the queue was already closed: pushing after
    /// close is a producer bug, not a runtime condition.
    pub fn push(&self, block: Block) {
        let mut state = self.state.lock();
        assert!(!state.closed, "push on a closed BlockQueue");
        state.items.push_back(block);
        drop(state);
        self.not_empty.notify_one();
    }

    /// Signal that no further blocks will be pushed.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.not_empty.notify_one();
    }

    /// Block until a block is available, or the queue is closed and empty.
    pub fn pop(&self) -> Option<Block> {
        let mut state = self.state.lock();
        loop {
            if let Some(block) = state.items.pop_front() {
                return Some(block);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlockQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BlockPool;

    #[test]
    fn pop_returns_none_after_close_and_drain() {
        let pool = BlockPool::new(64, 1024).unwrap();
        let queue = BlockQueue::new();
        queue.push(pool.allocate(vec![1, 2, 3]).unwrap());
        queue.close();

        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn concurrent_producer_consumer() {
        use std::{sync::Arc, thread};

        let pool = BlockPool::new(64, 1 << 20).unwrap();
        let queue = Arc::new(BlockQueue::new());

        let producer = {
            let queue = Arc::clone(&queue);
            let pool = pool.clone();
            thread::spawn(move || {
                for i in 0..100u8 {
                    queue.push(pool.allocate(vec![i]).unwrap());
                }
                queue.close();
            })
        };

        let mut received = Vec::new();
        while let Some(block) = queue.pop() {
            received.push(block.as_slice()[0]);
        }
        producer.join().unwrap();

        assert_eq!(received, (0..100u8).collect::<Vec<_>>());
    }
}
