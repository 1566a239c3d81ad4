use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
};

use block_data::Block;
use parking_lot::{Condvar, Mutex};

/// One block arriving on a stream, tagged with how many records it holds.
#[derive(Clone)]
pub struct StreamBlock {
    pub block: Block,
    pub item_count: u32,
}

struct State {
    items: VecDeque<StreamBlock>,
    closed: bool,
}

/// The inbound side of one `(stream_id, to_worker)` pair: a blocking queue
/// fed by every sending worker across the cluster, per the aggregation rule
/// in `# 3` ("P·W inbound BlockQueues"). Unlike [`block_data::BlockQueue`],
/// which has exactly one producer, this queue is closed only once every
/// expected sender has delivered its own close-flagged block — tracked by
/// `remaining_senders` rather than a single `close()` call.
pub struct InboundQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    remaining_senders: AtomicUsize,
}

impl InboundQueue {
    pub fn new(expected_senders: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: expected_senders == 0,
            }),
            not_empty: Condvar::new(),
            remaining_senders: AtomicUsize::new(expected_senders),
        }
    }

    /// Deliver one block from some sender. If `is_close`, that sender will
    /// never deliver again; once every sender has closed, the queue itself
    /// closes.
    pub fn deliver(&self, block: Block, item_count: u32, is_close: bool) {
        let mut state = self.state.lock();
        if item_count > 0 || !block.is_empty() {
            state.items.push_back(StreamBlock { block, item_count });
        }
        if is_close && self.remaining_senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            state.closed = true;
        }
        drop(state);
        self.not_empty.notify_one();
    }

    /// Block until a block is available, or every sender has closed and the
    /// queue is drained.
    pub fn pop(&self) -> Option<StreamBlock> {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_data::BlockPool;

    #[test]
    fn closes_only_after_every_sender_closes() {
        let pool = BlockPool::new(64, 4096).unwrap();
        let q = InboundQueue::new(2);

        q.deliver(pool.allocate(vec![1]).unwrap(), 1, true);
        assert!(!q.is_closed());
        assert!(q.pop().is_some());

        q.deliver(pool.allocate(vec![2]).unwrap(), 1, true);
        assert!(q.is_closed());
        assert!(q.pop().is_some());
        assert!(q.pop().is_none());
    }

    #[test]
    fn zero_expected_senders_starts_closed() {
        let q = InboundQueue::new(0);
        assert!(q.is_closed());
        assert!(q.pop().is_none());
    }
}
