use std::net::SocketAddr;

use net_group::{all_reduce, broadcast, prefix_sum_inclusive, Group};

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

#[tokio::test]
async fn prefix_sum_of_ones_on_five_ranks() {
    let groups = connect_all(19100, 5, 1).await;

    let mut tasks = Vec::new();
    for group in groups {
        tasks.push(tokio::spawn(async move {
            let rank = group.my_rank();
            let result = prefix_sum_inclusive(&group, 1u64, |a, b| a + b).await.unwrap();
            (rank, result)
        }));
    }

    let mut results = Vec::new();
    for t in tasks {
        results.push(t.await.unwrap());
    }
    results.sort_by_key(|(rank, _)| *rank);

    let expected: Vec<u64> = (1..=5).collect();
    let got: Vec<u64> = results.into_iter().map(|(_, v)| v).collect();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn all_reduce_sum_on_seven_ranks_via_elimination() {
    let groups = connect_all(19200, 7, 2).await;

    let mut tasks = Vec::new();
    for group in groups {
        tasks.push(tokio::spawn(async move {
            let rank = group.my_rank();
            let value = (rank as u64) + 1;
            let result = all_reduce(&group, value, |a, b| a + b).await.unwrap();
            result
        }));
    }

    for t in tasks {
        let result = t.await.unwrap();
        assert_eq!(result, 28); // 1+2+...+7
    }
}

#[tokio::test]
async fn broadcast_from_rank_two_on_six_ranks() {
    let groups = connect_all(19300, 6, 3).await;

    let mut tasks = Vec::new();
    for group in groups {
        tasks.push(tokio::spawn(async move {
            let rank = group.my_rank();
            let value = if rank == 2 { 42u32 } else { 0 };
            broadcast(&group, value, 2).await.unwrap()
        }));
    }

    for t in tasks {
        let result = t.await.unwrap();
        assert_eq!(result, 42);
    }
}
