use std::net::SocketAddr;

use loc_detect::{LocationDetection, DEFAULT_B};
use net_group::Group;

fn hosts(base_port: u16, n: usize) -> Vec<SocketAddr> {
    (0..n)
        .map(|i| format!("127.0.0.1:{}", base_port + i as u16).parse().unwrap())
        .collect()
}

async fn connect_all(base_port: u16, n: usize, group_id: u64) -> Vec<Group> {
    let hosts = hosts(base_port, n);
    let mut tasks = Vec::with_capacity(n);
    for rank in 0..n {
        let hosts = hosts.clone();
        tasks.push(tokio::spawn(async move { Group::connect(rank, &hosts, group_id).await.unwrap() }));
    }
    let mut groups = Vec::with_capacity(n);
    for t in tasks {
        groups.push(t.await.unwrap());
    }
    groups
}

/// Every worker inserts a shared pool of keys, on one or both "DIAs"; the
/// run should agree, bit-for-bit, on a `h -> winner_rank` map where the
/// winner for each join key is the rank that saw it most.
#[tokio::test]
async fn every_worker_agrees_on_the_same_location_map() {
    let groups = connect_all(19300, 4, 1).await;

    let mut tasks = Vec::new();
    for group in groups {
        tasks.push(tokio::spawn(async move {
            let rank = group.my_rank();
            let mut ld: LocationDetection<String> = LocationDetection::new();

            // "join-key-N" appears on both DIAs everywhere, with rank 0
            // reporting it the most times on DIA 1 (so rank 0 should win).
            for key_id in 0..5 {
                let key = format!("join-key-{key_id}");
                ld.insert(key.clone(), 2);
                let repeats = if rank == 0 { 10 } else { 1 };
                for _ in 0..repeats {
                    ld.insert(key.clone(), 1);
                }
            }

            // "dia1-only-N" only ever appears on DIA 1 everywhere: never a
            // join match, must be filtered out of the final map.
            for key_id in 0..3 {
                ld.insert(format!("dia1-only-{key_id}"), 1);
            }

            let map = ld.run(&group, DEFAULT_B).await.unwrap();

            let winners: Vec<Option<u32>> = (0..5)
                .map(|key_id| map.rank_for(&format!("join-key-{key_id}")))
                .collect();
            let non_winners: Vec<Option<u32>> = (0..3)
                .map(|key_id| map.rank_for(&format!("dia1-only-{key_id}")))
                .collect();

            (rank, winners, non_winners)
        }));
    }

    let mut results = Vec::new();
    for t in tasks {
        results.push(t.await.unwrap());
    }

    let (_, first_winners, first_non_winners) = &results[0];
    for (rank, winners, non_winners) in &results {
        assert_eq!(winners, first_winners, "rank {rank} disagreed on join-key winners");
        assert_eq!(non_winners, first_non_winners, "rank {rank} disagreed on non-join keys");
    }

    for winner in first_winners {
        assert_eq!(*winner, Some(0), "rank 0 reported every join key the most and should win");
    }
    for non_winner in first_non_winners {
        assert_eq!(*non_winner, None, "a key seen on only one DIA must never get a winner");
    }
}

#[tokio::test]
async fn empty_input_everywhere_yields_an_empty_map() {
    let groups = connect_all(19310, 3, 2).await;

    let mut tasks = Vec::new();
    for group in groups {
        tasks.push(tokio::spawn(async move {
            let ld: LocationDetection<u64> = LocationDetection::new();
            let map = ld.run(&group, DEFAULT_B).await.unwrap();
            (map.range(), map.len())
        }));
    }

    for t in tasks {
        let (range, len) = t.await.unwrap();
        assert_eq!(range, 0);
        assert_eq!(len, 0);
    }
}
