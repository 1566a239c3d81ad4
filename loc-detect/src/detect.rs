//! The four-stage LocationDetection protocol itself (§4.8): local counting,
//! hash projection, a golomb-coded hash-range exchange, and a golomb-coded
//! broadcast of the winning `(hash, rank)` pairs.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use futures::future::try_join_all;
use net_group::{all_reduce, Group};

use crate::record::{self, Occurrence, WinnerPair};
use crate::Error;

/// Tuning parameter from §4.8 stage 2/3: controls both the size of the hash
/// range (`b · U`) and the golomb-coding divisor for the exchange. Bigger
/// `b` means fewer hash collisions at the cost of a larger exchange.
pub const DEFAULT_B: u64 = 8;

fn hash_of<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// `num_hosts + 1` cut points splitting `[0, range)` into `num_hosts`
/// contiguous, near-equal slices.
fn boundaries(range: u64, num_hosts: usize) -> Vec<u64> {
    (0..=num_hosts).map(|j| (range as u128 * j as u128 / num_hosts as u128) as u64).collect()
}

/// Which destination worker's slice a projected hash falls into.
fn slice_of(h: u64, bounds: &[u64]) -> usize {
    match bounds.binary_search(&h) {
        Ok(i) => i.min(bounds.len() - 2),
        Err(i) => i - 1,
    }
}

/// Builds the local counting table for stage 1, then drives stages 2-4
/// against a [`Group`] once the caller has finished inserting.
///
/// `K` is only ever hashed, never sent over the wire: the exchange moves
/// projected hashes (`u64`) and ranks, not keys, which is what keeps the
/// per-key wire cost to a handful of bits instead of a full key encoding.
pub struct LocationDetection<K: Eq + Hash> {
    counts: HashMap<K, (u32, u8)>,
}

impl<K: Eq + Hash> LocationDetection<K> {
    pub fn new() -> Self {
        Self { counts: HashMap::new() }
    }

    /// Record one occurrence of `key` on DIA `dia_index` (`1` for the first
    /// input, `2` for the second); repeated inserts of the same key
    /// saturating-accumulate the count and OR-combine the dia-bits (§4.8
    /// stage 1).
    pub fn insert(&mut self, key: K, dia_index: u8) {
        assert!(dia_index == 1 || dia_index == 2, "dia_index must be 1 or 2, got {dia_index}");
        match self.counts.get_mut(&key) {
            Some((count, bits)) => {
                *count = count.saturating_add(1);
                *bits |= dia_index;
            }
            None => {
                self.counts.insert(key, (1, dia_index));
            }
        }
    }

    /// Run stages 2-4 against `group`, returning a [`LocationMap`] every
    /// worker agrees on bit-for-bit.
    pub async fn run(self, group: &Group, b: u64) -> Result<LocationMap, Error> {
        let my_rank = group.my_rank();
        let num_hosts = group.num_hosts();

        let local_uniques = self.counts.len() as u64;
        let global_uniques = all_reduce(group, local_uniques, |x, y| x + y).await?;

        if global_uniques == 0 {
            return Ok(LocationMap { b, range: 0, winners: HashMap::new() });
        }
        let range = b * global_uniques;

        // project, then merge entries that collide on the same `h`.
        let mut by_hash: HashMap<u64, (u32, u8)> = HashMap::new();
        for (key, (count, dia_bits)) in self.counts {
            let h = hash_of(&key) % range;
            match by_hash.get_mut(&h) {
                Some((existing_count, existing_bits)) => {
                    *existing_count = existing_count.saturating_add(count);
                    *existing_bits |= dia_bits;
                }
                None => {
                    by_hash.insert(h, (count, dia_bits));
                }
            }
        }
        let mut entries: Vec<Occurrence> = by_hash
            .into_iter()
            .map(|(h, (count, dia_bits))| Occurrence { h, count: count.min(u8::MAX as u32) as u8, dia_bits })
            .collect();
        entries.sort_by_key(|e| e.h);

        let bounds = boundaries(range, num_hosts);

        let mut per_dest: Vec<Vec<Occurrence>> = vec![Vec::new(); num_hosts];
        for entry in entries {
            per_dest[slice_of(entry.h, &bounds)].push(entry);
        }

        let send_futs = (0..num_hosts).filter(|&j| j != my_rank).map(|j| {
            let slice = &per_dest[j];
            async move {
                let encoded = record::encode_occurrences(slice, b)?;
                group.send_to(j, slice.len() as u32).await?;
                group.send_vec_to(j, &encoded).await?;
                Ok::<_, Error>(())
            }
        });
        let recv_futs = (0..num_hosts).filter(|&k| k != my_rank).map(|k| async move {
            let count = group.recv_from::<u32>(k).await? as usize;
            let bytes = group.recv_vec_from::<u8>(k).await?;
            let entries = record::decode_occurrences(&bytes, b, count)?;
            Ok::<_, Error>((k, entries))
        });
        let (_sent, received) = futures::future::try_join(try_join_all(send_futs), try_join_all(recv_futs)).await?;

        // aggregate everything landing in *our* slice: our own local
        // entries for `my_rank`, plus what every other worker sent us.
        struct Agg {
            best_count: u8,
            best_rank: usize,
            dia_bits: u8,
        }
        let mut agg: HashMap<u64, Agg> = HashMap::new();
        let mut consider = |source_rank: usize, entry: Occurrence| {
            agg.entry(entry.h)
                .and_modify(|a| {
                    a.dia_bits |= entry.dia_bits;
                    if entry.count > a.best_count || (entry.count == a.best_count && source_rank < a.best_rank) {
                        a.best_count = entry.count;
                        a.best_rank = source_rank;
                    }
                })
                .or_insert(Agg { best_count: entry.count, best_rank: source_rank, dia_bits: entry.dia_bits });
        };
        for entry in std::mem::take(&mut per_dest[my_rank]) {
            consider(my_rank, entry);
        }
        for (source_rank, entries) in received {
            for entry in entries {
                consider(source_rank, entry);
            }
        }

        // only keys observed on both DIAs (dia_bits == 0b11) are a genuine
        // join match; everything else is dropped here.
        let mut winners: Vec<WinnerPair> = agg
            .into_iter()
            .filter(|(_, a)| a.dia_bits == 0b11)
            .map(|(h, a)| WinnerPair { h, rank: a.best_rank as u32 })
            .collect();
        winners.sort_by_key(|w| w.h);

        // stage 4: broadcast our kept winners to every other worker, and
        // collect theirs.
        let encoded_winners = record::encode_winners(&winners, b, num_hosts)?;
        let winners_len = winners.len() as u32;
        let send_futs = (0..num_hosts).filter(|&j| j != my_rank).map(|j| {
            let encoded_winners = &encoded_winners;
            async move {
                group.send_to(j, winners_len).await?;
                group.send_vec_to(j, encoded_winners).await?;
                Ok::<_, Error>(())
            }
        });
        let recv_futs = (0..num_hosts).filter(|&k| k != my_rank).map(|k| async move {
            let count = group.recv_from::<u32>(k).await? as usize;
            let bytes = group.recv_vec_from::<u8>(k).await?;
            record::decode_winners(&bytes, b, num_hosts, count)
        });
        let (_sent, others) = futures::future::try_join(try_join_all(send_futs), try_join_all(recv_futs)).await?;

        let mut map: HashMap<u64, u32> = winners.iter().map(|w| (w.h, w.rank)).collect();
        for pairs in others {
            for pair in pairs {
                map.insert(pair.h, pair.rank);
            }
        }

        Ok(LocationMap { b, range, winners: map })
    }
}

impl<K: Eq + Hash> Default for LocationDetection<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// The agreed-upon `h -> winner_rank` map every worker ends up with,
/// together with enough of the projection (`b`, `range`) to recompute `h`
/// for a given key during the subsequent shuffle.
pub struct LocationMap {
    b: u64,
    range: u64,
    winners: HashMap<u64, u32>,
}

impl LocationMap {
    /// The rank that should receive `key`, or `None` if `range` is `0`
    /// (no keys were ever inserted anywhere) or `key` never appeared on
    /// both DIAs.
    pub fn rank_for<K: Hash>(&self, key: &K) -> Option<u32> {
        if self.range == 0 {
            return None;
        }
        let h = hash_of(key) % self.range;
        self.winners.get(&h).copied()
    }

    pub fn b(&self) -> u64 {
        self.b
    }

    pub fn range(&self) -> u64 {
        self.range
    }

    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_cover_the_whole_range_without_gaps() {
        let b = boundaries(100, 7);
        assert_eq!(b.first(), Some(&0));
        assert_eq!(b.last(), Some(&100));
        assert!(b.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn slice_of_respects_boundaries() {
        let bounds = boundaries(10, 3); // [0, 3, 6, 10]
        assert_eq!(slice_of(0, &bounds), 0);
        assert_eq!(slice_of(2, &bounds), 0);
        assert_eq!(slice_of(3, &bounds), 1);
        assert_eq!(slice_of(9, &bounds), 2);
    }

    #[test]
    fn insert_saturates_count_and_ors_dia_bits() {
        let mut ld: LocationDetection<&str> = LocationDetection::new();
        ld.insert("a", 1);
        ld.insert("a", 2);
        ld.insert("a", 1);
        let (count, bits) = ld.counts[&"a"];
        assert_eq!(count, 3);
        assert_eq!(bits, 0b11);
    }
}
