use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::Block;

struct Inner {
    blocks: Mutex<Vec<Block>>,
}

/// An append-only, in-memory sequence of [`Block`]s.
///
/// Used to materialize a spilled partition (C7's post-reduce table) or a
/// finished stream's backlog: a [`Writer`] appends blocks as they are
/// produced, any number of [`Reader`]s can replay the sequence from the
/// start once writing is done.
#[derive(Clone)]
pub struct File {
    inner: Arc<Inner>,
}

impl File {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                blocks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn writer(&self) -> Writer {
        Writer { file: self.clone() }
    }

    pub fn reader(&self) -> Reader {
        Reader {
            file: self.clone(),
            cursor: 0,
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.inner.blocks.lock().len()
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.blocks.lock().iter().map(Block::len).sum()
    }
}

impl Default for File {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Writer {
    file: File,
}

impl Writer {
    pub fn append(&mut self, block: Block) {
        self.file.inner.blocks.lock().push(block);
    }
}

pub struct Reader {
    file: File,
    cursor: usize,
}

impl Reader {
    /// Read the next block, or `None` once every block written so far has
    /// been consumed. Calling this again after the writer appends more
    /// blocks will pick them up.
    pub fn next_block(&mut self) -> Option<Block> {
        let blocks = self.file.inner.blocks.lock();
        let block = blocks.get(self.cursor).cloned();
        if block.is_some() {
            self.cursor += 1;
        }
        block
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BlockPool;

    #[test]
    fn writer_then_reader_replays_in_order() {
        let pool = BlockPool::new(64, 4096).unwrap();
        let file = File::new();
        let mut writer = file.writer();
        for i in 0..5u8 {
            writer.append(pool.allocate(vec![i]).unwrap());
        }

        let mut reader = file.reader();
        let mut got = Vec::new();
        while let Some(b) = reader.next_block() {
            got.push(b.as_slice()[0]);
        }
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn multiple_readers_are_independent() {
        let pool = BlockPool::new(64, 4096).unwrap();
        let file = File::new();
        let mut writer = file.writer();
        writer.append(pool.allocate(vec![1]).unwrap());
        writer.append(pool.allocate(vec![2]).unwrap());

        let mut r1 = file.reader();
        assert_eq!(r1.next_block().unwrap().as_slice()[0], 1);

        let mut r2 = file.reader();
        assert_eq!(r2.next_block().unwrap().as_slice()[0], 1);
        assert_eq!(r1.next_block().unwrap().as_slice()[0], 2);
    }
}
