use std::net::SocketAddr;

use net_group::{all_reduce, prefix_sum_inclusive, Group};
use proptest::prelude::*;

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
        tasks.push(tokio::spawn(async move {
            Group::connect(rank, &hosts, group_id).await.unwrap()
        }));
    }
    let mut groups = Vec::with_capacity(n);
    for t in tasks {
        groups.push(t.await.unwrap());
    }
    groups
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn all_reduce_matches_sequential_sum(
        n in 1usize..9,
        values in prop::collection::vec(0u64..1000, 1..9),
    ) {
        let values: Vec<u64> = values.into_iter().take(n).collect();
        let n = values.len();
        let expected: u64 = values.iter().sum();
        let base_port = 19500 + (n as u16) * 20;

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let groups = connect_all(base_port, n, 42).await;
            let mut tasks = Vec::new();
            for group in groups {
                let value = values[group.my_rank()];
                tasks.push(tokio::spawn(async move {
                    all_reduce(&group, value, |a, b| a + b).await.unwrap()
                }));
            }
            for t in tasks {
                let got = t.await.unwrap();
                prop_assert_eq!(got, expected);
            }
            Ok(())
        })?;
    }

    #[test]
    fn prefix_sum_matches_sequential_scan(
        n in 1usize..9,
        values in prop::collection::vec(0u64..1000, 1..9),
    ) {
        let values: Vec<u64> = values.into_iter().take(n).collect();
        let n = values.len();
        let base_port = 19700 + (n as u16) * 20;

        let mut expected = Vec::with_capacity(n);
        let mut running = 0u64;
        for v in &values {
            running += v;
            expected.push(running);
        }

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let groups = connect_all(base_port, n, 43).await;
            let mut tasks = Vec::new();
            for group in groups {
                let value = values[group.my_rank()];
                tasks.push(tokio::spawn(async move {
                    let rank = group.my_rank();
                    let result = prefix_sum_inclusive(&group, value, |a, b| a + b).await.unwrap();
                    (rank, result)
                }));
            }
            let mut results = Vec::new();
            for t in tasks {
                results.push(t.await.unwrap());
            }
            results.sort_by_key(|(rank, _)| *rank);
            for (rank, got) in results {
                prop_assert_eq!(got, expected[rank]);
            }
            Ok(())
        })?;
    }
}
