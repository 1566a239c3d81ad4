use std::collections::HashMap;

use block_data::{BlockPool, File};

use crate::{codec::Codec, spill, Error};

const MAX_RECURSION_DEPTH: u32 = 32;

/// Dense, index-ordered reduce-to-index table (C7's `ReduceToIndex`
/// variant): keys are `usize` indices in `[local_begin, local_end)`; the
/// output covers that whole range, with a caller-provided neutral element
/// filling any index that received no input.
///
/// Unlike [`crate::PostReduceTable`], recursive re-reduction over a spill
/// halves the literal `[begin, end)` index range rather than a hash bucket
/// count, so partial output always stays in index order without a final
/// sort.
pub struct ReduceToIndexTable<V, R, C>
where
    V: Clone,
    R: Fn(V, V) -> V,
    C: Codec<usize, V>,
{
    local_begin: usize,
    local_end: usize,
    neutral: V,
    max_resident: usize,
    pool: BlockPool,
    reduce: R,
    codec: C,
    resident: HashMap<usize, V>,
    spill_file: Option<File>,
}

impl<V, R, C> ReduceToIndexTable<V, R, C>
where
    V: Clone,
    R: Fn(V, V) -> V,
    C: Codec<usize, V> + Clone,
{
    pub fn new(local_begin: usize, local_end: usize, neutral: V, max_resident: usize, pool: BlockPool, reduce: R, codec: C) -> Self {
        assert!(local_begin <= local_end);
        Self {
            local_begin,
            local_end,
            neutral,
            max_resident,
            pool,
            reduce,
            codec,
            resident: HashMap::new(),
            spill_file: None,
        }
    }

    pub fn insert(&mut self, index: usize, value: V) -> Result<(), Error> {
        assert!(
            index >= self.local_begin && index < self.local_end,
            "index {} out of this table's range [{}, {})",
            index,
            self.local_begin,
            self.local_end
        );

        match self.resident.remove(&index) {
            Some(existing) => {
                self.resident.insert(index, (self.reduce)(existing, value));
            }
            None => {
                self.resident.insert(index, value);
            }
        }

        if self.resident.len() > self.max_resident {
            let drained: Vec<(usize, V)> = self.resident.drain().collect();
            spill::spill_entries(&self.pool, &self.codec, &mut self.spill_file, drained.into_iter())?;
        }
        Ok(())
    }

    /// Consume the table, producing a dense `Vec<V>` of length
    /// `local_end - local_begin`, in index order, with holes filled by the
    /// neutral element.
    pub fn flush(self) -> Result<Vec<V>, Error> {
        self.reduce_range(self.local_begin, self.local_end, self.resident, self.spill_file, 0)
    }

    fn reduce_range(&self, begin: usize, end: usize, in_memory: HashMap<usize, V>, spilled: Option<File>, depth: u32) -> Result<Vec<V>, Error> {
        let len = end - begin;

        let Some(file) = spilled else {
            return Ok(Self::dense(begin, len, in_memory, &self.neutral));
        };
        if depth >= MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimit(depth));
        }

        // a single-index range can't be split further; merge whatever
        // spilled directly into the one resident slot.
        if len <= 1 {
            let mut merged = in_memory;
            for (key, value) in spill::read_entries(&file, &self.codec) {
                match merged.remove(&key) {
                    Some(existing) => {
                        merged.insert(key, (self.reduce)(existing, value));
                    }
                    None => {
                        merged.insert(key, value);
                    }
                }
            }
            return Ok(Self::dense(begin, len, merged, &self.neutral));
        }

        let mid = begin + len / 2;
        let mut secondary = in_memory;
        let mut overflow_low: Option<File> = None;
        let mut overflow_high: Option<File> = None;

        for (key, value) in spill::read_entries(&file, &self.codec) {
            if overflow_low.is_some() || overflow_high.is_some() {
                self.route(key, value, mid, &mut overflow_low, &mut overflow_high)?;
                continue;
            }

            match secondary.remove(&key) {
                Some(existing) => {
                    secondary.insert(key, (self.reduce)(existing, value));
                }
                None => {
                    secondary.insert(key, value);
                }
            }

            if secondary.len() > self.max_resident {
                let drained: Vec<(usize, V)> = secondary.drain().collect();
                for (k, v) in drained {
                    self.route(k, v, mid, &mut overflow_low, &mut overflow_high)?;
                }
            }
        }

        if overflow_low.is_none() && overflow_high.is_none() {
            return Ok(Self::dense(begin, len, secondary, &self.neutral));
        }

        let mut low_mem = HashMap::new();
        let mut high_mem = HashMap::new();
        for (key, value) in secondary {
            if key < mid {
                low_mem.insert(key, value);
            } else {
                high_mem.insert(key, value);
            }
        }

        let mut low_out = self.reduce_range(begin, mid, low_mem, overflow_low, depth + 1)?;
        let high_out = self.reduce_range(mid, end, high_mem, overflow_high, depth + 1)?;
        low_out.extend(high_out);
        Ok(low_out)
    }

    fn route(&self, key: usize, value: V, mid: usize, low: &mut Option<File>, high: &mut Option<File>) -> Result<(), Error> {
        let target = if key < mid { &mut *low } else { &mut *high };
        spill::spill_entries(&self.pool, &self.codec, target, std::iter::once((key, value)))
    }

    fn dense(begin: usize, len: usize, table: HashMap<usize, V>, neutral: &V) -> Vec<V> {
        let mut slots: Vec<Option<V>> = vec![None; len];
        for (key, value) in table {
            slots[key - begin] = Some(value);
        }
        slots.into_iter().map(|slot| slot.unwrap_or_else(|| neutral.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::UsizeU64Codec;

    #[test]
    fn holes_filled_with_neutral_element() {
        let pool = BlockPool::new(4096, 1 << 20).unwrap();
        let mut table = ReduceToIndexTable::new(0, 8, 0u64, 1000, pool, |a: u64, b: u64| a + b, UsizeU64Codec);

        for (index, value) in [(0usize, 5u64), (3, 2), (3, 4), (7, 1)] {
            table.insert(index, value).unwrap();
        }

        let out = table.flush().unwrap();
        assert_eq!(out, vec![5, 0, 0, 6, 0, 0, 0, 1]);
    }

    #[test]
    fn stays_index_ordered_even_after_spilling() {
        let pool = BlockPool::new(64, 1 << 20).unwrap();
        // tiny resident cap forces repeated spills across the range.
        let mut table = ReduceToIndexTable::new(0, 64, 0u64, 2, pool, |a: u64, b: u64| a + b, UsizeU64Codec);

        let mut expected = vec![0u64; 64];
        for i in 0..64usize {
            table.insert(i, (i as u64) + 1).unwrap();
            expected[i] += (i as u64) + 1;
        }
        // a second pass of overlapping inserts to exercise reduction, not
        // just insertion.
        for i in (0..64usize).step_by(3) {
            table.insert(i, 10).unwrap();
            expected[i] += 10;
        }

        let out = table.flush().unwrap();
        assert_eq!(out, expected);
    }
}
