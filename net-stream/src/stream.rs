use std::sync::Arc;

use crate::{multiplexer::Multiplexer, queue::StreamBlock, Error};

/// Writes records destined for one `(stream_id, to_worker)` pair, buffering
/// them into wire blocks of up to `block_size` bytes.
///
/// Since record production typically happens on a synchronous worker
/// thread (`# 5`), `Writer` bridges into the async [`Multiplexer`] via a
/// [`tokio::runtime::Handle`] rather than being itself `async`.
pub struct Writer {
    mux: Arc<Multiplexer>,
    handle: tokio::runtime::Handle,
    stream_id: u32,
    from_worker: u32,
    to_worker: u32,
    block_size: usize,
    buf: Vec<u8>,
    item_count: u32,
    closed: bool,
}

impl Writer {
    pub fn new(
        mux: Arc<Multiplexer>,
        handle: tokio::runtime::Handle,
        stream_id: u32,
        from_worker: u32,
        to_worker: u32,
        block_size: usize,
    ) -> Self {
        Self {
            mux,
            handle,
            stream_id,
            from_worker,
            to_worker,
            block_size,
            buf: Vec::with_capacity(block_size),
            item_count: 0,
            closed: false,
        }
    }

    /// Append one length-prefixed record, flushing a full block as needed.
    pub fn write_record(&mut self, record: &[u8]) -> Result<(), Error> {
        assert!(!self.closed, "write_record on a closed Writer");
        self.buf.extend_from_slice(&(record.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(record);
        self.item_count += 1;
        if self.buf.len() >= self.block_size {
            self.flush(false)?;
        }
        Ok(())
    }

    /// Send whatever is buffered as one block (even if empty — an empty
    /// `close` block is how a source signals end-of-stream with no trailing
    /// data).
    pub fn flush(&mut self, close: bool) -> Result<(), Error> {
        let payload = std::mem::replace(&mut self.buf, Vec::with_capacity(self.block_size));
        let item_count = std::mem::take(&mut self.item_count);
        let mux = self.mux.clone();
        let (stream_id, from_worker, to_worker) = (self.stream_id, self.from_worker, self.to_worker);
        self.handle.block_on(async move {
            mux.send_block(stream_id, from_worker, to_worker, item_count, payload, close)
                .await
        })
    }

    /// Flush any remaining buffered records and mark this source done for
    /// the stream. Must be called exactly once.
    pub fn close(&mut self) -> Result<(), Error> {
        self.flush(true)?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                stream_id = self.stream_id,
                to_worker = self.to_worker,
                "Writer dropped without being closed"
            );
        }
    }
}

/// Reads records delivered to one local worker on a stream, in the order
/// their containing blocks arrived (no ordering guarantee *across* distinct
/// sending workers — only within one sender's sequence of blocks).
pub struct Reader {
    queue: Arc<crate::queue::InboundQueue>,
    current: Option<StreamBlock>,
    offset: usize,
    remaining_in_block: u32,
}

impl Reader {
    pub fn new(queue: Arc<crate::queue::InboundQueue>) -> Self {
        Self {
            queue,
            current: None,
            offset: 0,
            remaining_in_block: 0,
        }
    }

    /// Block until the next record is available, or the stream has closed
    /// and every block has been consumed.
    pub fn read_record(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.remaining_in_block == 0 {
                self.current = self.queue.pop();
                let block = self.current.as_ref()?;
                self.offset = 0;
                self.remaining_in_block = block.item_count;
                if self.remaining_in_block == 0 {
                    continue;
                }
            }

            let block = self.current.as_ref().expect("checked above");
            let bytes = block.block.as_slice();
            let len = u32::from_le_bytes(bytes[self.offset..self.offset + 4].try_into().unwrap()) as usize;
            let start = self.offset + 4;
            let record = bytes[start..start + len].to_vec();
            self.offset = start + len;
            self.remaining_in_block -= 1;
            return Some(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InboundQueue;
    use block_data::BlockPool;

    #[test]
    fn reader_splits_records_out_of_one_block() {
        let pool = BlockPool::new(1024, 1 << 20).unwrap();
        let mut payload = Vec::new();
        for rec in [&b"a"[..], b"bb", b"ccc"] {
            payload.extend_from_slice(&(rec.len() as u32).to_le_bytes());
            payload.extend_from_slice(rec);
        }
        let block = pool.allocate(payload).unwrap();

        let queue = Arc::new(InboundQueue::new(1));
        queue.deliver(block, 3, true);

        let mut reader = Reader::new(queue);
        assert_eq!(reader.read_record().unwrap(), b"a");
        assert_eq!(reader.read_record().unwrap(), b"bb");
        assert_eq!(reader.read_record().unwrap(), b"ccc");
        assert!(reader.read_record().is_none());
    }
}
