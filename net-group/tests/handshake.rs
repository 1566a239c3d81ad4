use std::net::SocketAddr;

use net_group::Group;

#[tokio::test]
async fn two_ranks_connect_and_learn_each_others_rank() {
    let hosts: Vec<SocketAddr> = vec![
        "127.0.0.1:19400".parse().unwrap(),
        "127.0.0.1:19401".parse().unwrap(),
    ];

    let h0 = hosts.clone();
    let rank0 = tokio::spawn(async move { Group::connect(0, &h0, 99).await.unwrap() });
    let h1 = hosts.clone();
    let rank1 = tokio::spawn(async move { Group::connect(1, &h1, 99).await.unwrap() });

    let g0 = rank0.await.unwrap();
    let g1 = rank1.await.unwrap();

    assert_eq!(g0.my_rank(), 0);
    assert_eq!(g0.num_hosts(), 2);
    assert_eq!(g1.my_rank(), 1);
    assert_eq!(g1.num_hosts(), 2);

    g0.send_to(1, 7u32).await.unwrap();
    let got: u32 = g1.recv_from(0).await.unwrap();
    assert_eq!(got, 7);
}

#[tokio::test]
async fn mismatched_group_id_is_rejected() {
    let hosts: Vec<SocketAddr> = vec![
        "127.0.0.1:19410".parse().unwrap(),
        "127.0.0.1:19411".parse().unwrap(),
    ];

    let h0 = hosts.clone();
    let rank0 = tokio::spawn(async move { Group::connect(0, &h0, 1).await });
    let h1 = hosts.clone();
    let rank1 = tokio::spawn(async move { Group::connect(1, &h1, 2).await });

    let r0 = rank0.await.unwrap();
    let r1 = rank1.await.unwrap();
    assert!(r0.is_err() || r1.is_err());
}
