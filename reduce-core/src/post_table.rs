use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use block_data::{BlockPool, File};

use crate::{codec::Codec, spill, Error};

const MAX_RECURSION_DEPTH: u32 = 32;

fn hash_of<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Global aggregation stage of a reduce (C7): one primary in-memory table
/// per partition, spilling to a [`block_data::File`] once a partition grows
/// past `max_items_per_partition`. `flush` recursively re-reduces each
/// partition's spilled data against a finer hash bucketing, spilling again
/// (into two halves) if the re-reduced set still overflows, until a level's
/// data fits in memory.
pub struct PostReduceTable<K, V, R, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    R: Fn(V, V) -> V,
    C: Codec<K, V>,
{
    num_partitions: usize,
    max_items_per_partition: usize,
    max_items_secondary: usize,
    initial_buckets: usize,
    pool: BlockPool,
    reduce: R,
    codec: C,
    partitions: Vec<HashMap<K, V>>,
    spill_files: Vec<Option<File>>,
}

impl<K, V, R, C> PostReduceTable<K, V, R, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    R: Fn(V, V) -> V,
    C: Codec<K, V> + Clone,
{
    pub fn new(num_partitions: usize, max_items_per_partition: usize, max_items_secondary: usize, pool: BlockPool, reduce: R, codec: C) -> Self {
        assert!(num_partitions > 0);
        Self {
            num_partitions,
            max_items_per_partition,
            max_items_secondary,
            initial_buckets: max_items_secondary.max(2),
            pool,
            reduce,
            codec,
            partitions: (0..num_partitions).map(|_| HashMap::new()).collect(),
            spill_files: (0..num_partitions).map(|_| None).collect(),
        }
    }

    fn partition_of(&self, key: &K) -> usize {
        (hash_of(key) % self.num_partitions as u64) as usize
    }

    pub fn insert(&mut self, key: K, value: V) -> Result<(), Error> {
        let partition = self.partition_of(&key);

        if let Some(existing) = self.partitions[partition].remove(&key) {
            self.partitions[partition].insert(key, (self.reduce)(existing, value));
            return Ok(());
        }
        self.partitions[partition].insert(key, value);

        if self.partitions[partition].len() > self.max_items_per_partition {
            self.spill_partition(partition)?;
        }
        Ok(())
    }

    fn spill_partition(&mut self, partition: usize) -> Result<(), Error> {
        let drained: Vec<(K, V)> = self.partitions[partition].drain().collect();
        spill::spill_entries(&self.pool, &self.codec, &mut self.spill_files[partition], drained.into_iter())
    }

    /// Emit every entry of every partition, in ascending partition id order,
    /// through `emit`. Partitions that never spilled are emitted directly;
    /// partitions that did spill are re-reduced recursively.
    pub fn flush(&mut self, mut emit: impl FnMut(K, V)) -> Result<(), Error> {
        for partition in 0..self.num_partitions {
            let in_memory = std::mem::take(&mut self.partitions[partition]);
            let spilled = self.spill_files[partition].take();
            self.reduce_level(in_memory, spilled, self.initial_buckets, 0, &mut emit)?;
        }
        Ok(())
    }

    fn reduce_level(&self, in_memory: HashMap<K, V>, spilled: Option<File>, num_buckets: usize, depth: u32, emit: &mut impl FnMut(K, V)) -> Result<(), Error> {
        let Some(file) = spilled else {
            for (key, value) in in_memory {
                emit(key, value);
            }
            return Ok(());
        };
        if depth >= MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimit(depth));
        }

        let half = (num_buckets / 2).max(1);
        let mut secondary = in_memory;
        let mut overflow_low: Option<File> = None;
        let mut overflow_high: Option<File> = None;

        for (key, value) in spill::read_entries(&file, &self.codec) {
            if overflow_low.is_some() || overflow_high.is_some() {
                Self::route(&self.pool, &self.codec, key, value, num_buckets, half, &mut overflow_low, &mut overflow_high)?;
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

            if secondary.len() > self.max_items_secondary {
                let drained: Vec<(K, V)> = secondary.drain().collect();
                for (k, v) in drained {
                    Self::route(&self.pool, &self.codec, k, v, num_buckets, half, &mut overflow_low, &mut overflow_high)?;
                }
            }
        }

        if overflow_low.is_none() && overflow_high.is_none() {
            for (key, value) in secondary {
                emit(key, value);
            }
            return Ok(());
        }

        // in-memory remainder also needs to be split across the two halves
        // before recursing, since it was never written to either file.
        let mut low_mem = HashMap::new();
        let mut high_mem = HashMap::new();
        for (key, value) in secondary {
            if Self::bucket_of(&key, num_buckets) < half {
                low_mem.insert(key, value);
            } else {
                high_mem.insert(key, value);
            }
        }

        let next_buckets = half.max(1);
        self.reduce_level(low_mem, overflow_low, next_buckets, depth + 1, emit)?;
        self.reduce_level(high_mem, overflow_high, next_buckets, depth + 1, emit)?;
        Ok(())
    }

    fn bucket_of(key: &K, num_buckets: usize) -> usize {
        (hash_of(key) % num_buckets as u64) as usize
    }

    fn route(pool: &BlockPool, codec: &C, key: K, value: V, num_buckets: usize, half: usize, low: &mut Option<File>, high: &mut Option<File>) -> Result<(), Error> {
        let target = if Self::bucket_of(&key, num_buckets) < half { &mut *low } else { &mut *high };
        spill::spill_entries(pool, codec, target, std::iter::once((key, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StringU64Codec;

    #[test]
    fn emits_every_key_exactly_once_when_nothing_spills() {
        let pool = BlockPool::new(4096, 1 << 20).unwrap();
        let mut table = PostReduceTable::new(2, 1000, 1000, pool, |a: u64, b: u64| a + b, StringU64Codec);

        for word in ["a", "b", "a", "c", "b", "a"] {
            table.insert(word.to_string(), 1).unwrap();
        }

        let mut out: HashMap<String, u64> = HashMap::new();
        table.flush(|k, v| {
            out.insert(k, v);
        }).unwrap();

        assert_eq!(out.get("a"), Some(&3));
        assert_eq!(out.get("b"), Some(&2));
        assert_eq!(out.get("c"), Some(&1));
    }

    #[test]
    fn reduces_correctly_even_after_spilling_every_partition() {
        let pool = BlockPool::new(256, 1 << 20).unwrap();
        // tiny per-partition cap forces every insert-group to spill at
        // least once.
        let mut table = PostReduceTable::new(3, 2, 4, pool, |a: u64, b: u64| a + b, StringU64Codec);

        let mut expected: HashMap<String, u64> = HashMap::new();
        for i in 0..200u64 {
            let key = format!("key-{}", i % 17);
            *expected.entry(key.clone()).or_insert(0) += 1;
            table.insert(key, 1).unwrap();
        }

        let mut out: HashMap<String, u64> = HashMap::new();
        table.flush(|k, v| {
            out.entry(k).and_modify(|existing| *existing += v).or_insert(v);
        }).unwrap();

        assert_eq!(out, expected);
    }
}
