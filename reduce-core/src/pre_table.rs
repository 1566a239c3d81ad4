use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

fn hash_of<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Partitioned hash table with per-partition flush, used for the pre-reduce
/// (local aggregation) stage of a reduce (C6): every insert either reduces
/// into an existing entry or adds a new one, and a partition is flushed to
/// its sink once its fill rate or the table's total item cap is exceeded.
///
/// Bucketing is one `HashMap` per partition rather than thrill's
/// bucket-block chains: those chains exist purely to bound per-item memory
/// overhead in C++, a concern a Rust `HashMap` already addresses. The
/// `max_num_blocks_table` cap from the original is reinterpreted here as a
/// cap on the table's total item count, since there are no literal blocks
/// to count.
pub struct PreReduceTable<K, V, R, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    R: Fn(V, V) -> V,
    S: FnMut(usize, K, V),
{
    max_partition_fill_rate: f64,
    max_items_per_partition: usize,
    max_items_table: usize,
    reduce: R,
    sinks: Vec<S>,
    partitions: Vec<HashMap<K, V>>,
    total_items: usize,
}

impl<K, V, R, S> PreReduceTable<K, V, R, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    R: Fn(V, V) -> V,
    S: FnMut(usize, K, V),
{
    /// `sinks` has one entry per partition; its length fixes the partition
    /// count. `max_items_per_partition` approximates the original's
    /// `num_items_per_partition_` capacity estimate.
    pub fn new(reduce: R, sinks: Vec<S>, max_partition_fill_rate: f64, max_items_per_partition: usize, max_items_table: usize) -> Self {
        assert!(!sinks.is_empty(), "PreReduceTable needs at least one partition");
        assert!(
            max_partition_fill_rate > 0.0 && max_partition_fill_rate <= 1.0,
            "fill rate must be in (0, 1]"
        );
        let num_partitions = sinks.len();
        Self {
            max_partition_fill_rate,
            max_items_per_partition,
            max_items_table,
            reduce,
            sinks,
            partitions: (0..num_partitions).map(|_| HashMap::new()).collect(),
            total_items: 0,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    fn partition_of(&self, key: &K) -> usize {
        (hash_of(key) % self.partitions.len() as u64) as usize
    }

    /// Insert one record, reducing it into an existing entry with the same
    /// key if one is present in the partition.
    pub fn insert(&mut self, key: K, value: V) {
        let partition = self.partition_of(&key);

        if let Some(existing) = self.partitions[partition].remove(&key) {
            self.partitions[partition].insert(key, (self.reduce)(existing, value));
            return;
        }

        let projected_fill = (self.partitions[partition].len() + 1) as f64 / self.max_items_per_partition as f64;
        if projected_fill > self.max_partition_fill_rate {
            self.flush_partition(partition);
        }

        self.partitions[partition].insert(key, value);
        self.total_items += 1;

        if self.total_items > self.max_items_table {
            self.flush_largest_partition();
        }
    }

    fn flush_largest_partition(&mut self) {
        let (largest, _) = self
            .partitions
            .iter()
            .enumerate()
            .max_by_key(|(_, table)| table.len())
            .expect("at least one partition");
        self.flush_partition(largest);
    }

    /// Emit every entry of one partition through its sink and clear it.
    pub fn flush_partition(&mut self, partition: usize) {
        let drained: Vec<(K, V)> = self.partitions[partition].drain().collect();
        self.total_items -= drained.len();
        for (key, value) in drained {
            (self.sinks[partition])(partition, key, value);
        }
    }

    /// Flush every partition in ascending id order.
    pub fn flush(&mut self) {
        for partition in 0..self.partitions.len() {
            self.flush_partition(partition);
        }
    }

    pub fn partition_len(&self, partition: usize) -> usize {
        self.partitions[partition].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn word_count_reduces_and_flushes_through_sinks() {
        let collected: Vec<Rc<RefCell<Vec<(String, u64)>>>> = (0..2).map(|_| Rc::new(RefCell::new(Vec::new()))).collect();
        let sinks: Vec<_> = collected
            .iter()
            .cloned()
            .map(|bucket| move |_partition: usize, key: String, value: u64| bucket.borrow_mut().push((key, value)))
            .collect();

        let mut table = PreReduceTable::new(|a: u64, b: u64| a + b, sinks, 0.8, 1024, 1_000_000);

        for word in "the quick brown fox the lazy dog the fox".split_whitespace() {
            table.insert(word.to_string(), 1);
        }
        table.flush();

        let mut totals: HashMap<String, u64> = HashMap::new();
        for bucket in &collected {
            for (k, v) in bucket.borrow().iter() {
                *totals.entry(k.clone()).or_insert(0) += v;
            }
        }

        assert_eq!(totals.get("the"), Some(&3));
        assert_eq!(totals.get("fox"), Some(&2));
        assert_eq!(totals.get("quick"), Some(&1));
        assert_eq!(totals.get("lazy"), Some(&1));
        assert_eq!(totals.get("dog"), Some(&1));
        assert_eq!(totals.get("brown"), Some(&1));
    }

    #[test]
    fn low_fill_rate_forces_mid_stream_flushes() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let sink_bucket = collected.clone();
        let sinks = vec![move |_p: usize, k: u64, v: u64| sink_bucket.borrow_mut().push((k, v))];

        // fill rate of 0.5 over a capacity of 4 items forces a flush every
        // two distinct keys inserted into the single partition.
        let mut table = PreReduceTable::new(|a: u64, b: u64| a + b, sinks, 0.5, 4, 1_000_000);
        for key in 0..10u64 {
            table.insert(key, 1);
        }
        table.flush();

        let total: u64 = collected.borrow().iter().map(|(_, v)| v).sum();
        assert_eq!(total, 10);
        assert_eq!(collected.borrow().len(), 10);
    }
}
