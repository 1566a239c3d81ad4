use std::{net::SocketAddr, sync::Arc};

use block_data::BlockPool;
use net_group::Group;
use net_stream::{scatter, Multiplexer, Reader, Writer};

#[tokio::test]
async fn loopback_round_trip_within_one_host() {
    let hosts: Vec<SocketAddr> = vec!["127.0.0.1:19600".parse().unwrap()];
    let group = Arc::new(Group::connect(0, &hosts, 1).await.unwrap());
    let pool = BlockPool::new(1024, 1 << 20).unwrap();
    let mux = Multiplexer::new(group, 2, pool);

    let handle = tokio::runtime::Handle::current();
    let write_mux = mux.clone();
    tokio::task::spawn_blocking(move || {
        let mut writer = Writer::new(write_mux.clone(), handle, 1, write_mux.global_worker(0), write_mux.global_worker(1), 1024);
        writer.write_record(b"hello").unwrap();
        writer.write_record(b"world").unwrap();
        writer.close().unwrap();
    })
    .await
    .unwrap();

    let queue = mux.reader_queue(1, 1);
    let records = tokio::task::spawn_blocking(move || {
        let mut reader = Reader::new(queue);
        let mut out = Vec::new();
        while let Some(r) = reader.read_record() {
            out.push(r);
        }
        out
    })
    .await
    .unwrap();
    assert_eq!(records, vec![b"hello".to_vec(), b"world".to_vec()]);
}

#[tokio::test]
async fn scatter_over_uneven_offsets() {
    let hosts: Vec<SocketAddr> = vec!["127.0.0.1:19610".parse().unwrap()];
    let group = Arc::new(Group::connect(0, &hosts, 2).await.unwrap());
    let pool = BlockPool::new(1024, 1 << 20).unwrap();
    let mux = Multiplexer::new(group, 3, pool);
    let handle = tokio::runtime::Handle::current();

    let records: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i]).collect();
    // worker 0 gets [0,3), worker 1 gets [3,3) (empty), worker 2 gets [3,10)
    let offsets = vec![0usize, 3, 3, 10];

    let scatter_mux = mux.clone();
    tokio::task::spawn_blocking(move || {
        let mut writers: Vec<Writer> = (0..3)
            .map(|w| {
                Writer::new(
                    scatter_mux.clone(),
                    handle.clone(),
                    5,
                    scatter_mux.global_worker(0),
                    scatter_mux.global_worker(w),
                    1024,
                )
            })
            .collect();
        scatter(&mut writers, &offsets, &records).unwrap();
    })
    .await
    .unwrap();

    let q0 = mux.reader_queue(5, 0);
    let q1 = mux.reader_queue(5, 1);
    let q2 = mux.reader_queue(5, 2);
    let (got0, got1, got2) = tokio::task::spawn_blocking(move || {
        let drain = |q| {
            let mut reader = Reader::new(q);
            let mut out = Vec::new();
            while let Some(r) = reader.read_record() {
                out.push(r[0]);
            }
            out
        };
        (drain(q0), drain(q1), drain(q2))
    })
    .await
    .unwrap();

    assert_eq!(got0, vec![0, 1, 2]);
    assert!(got1.is_empty());
    assert_eq!(got2, vec![3, 4, 5, 6, 7, 8, 9]);
}

#[tokio::test]
async fn cross_host_delivery_over_the_network() {
    let hosts: Vec<SocketAddr> = vec![
        "127.0.0.1:19620".parse().unwrap(),
        "127.0.0.1:19621".parse().unwrap(),
    ];

    let h0 = hosts.clone();
    let rank0 = tokio::spawn(async move { Group::connect(0, &h0, 9).await.unwrap() });
    let h1 = hosts.clone();
    let rank1 = tokio::spawn(async move { Group::connect(1, &h1, 9).await.unwrap() });
    let g0 = Arc::new(rank0.await.unwrap());
    let g1 = Arc::new(rank1.await.unwrap());

    let pool0 = BlockPool::new(1024, 1 << 20).unwrap();
    let pool1 = BlockPool::new(1024, 1 << 20).unwrap();
    let mux0 = Multiplexer::new(g0, 1, pool0);
    let mux1 = Multiplexer::new(g1, 1, pool1);

    mux1.spawn_receivers(&link_async::Spawner::from_current().unwrap());

    let handle = tokio::runtime::Handle::current();
    let write_mux0 = mux0.clone();
    let write_mux1 = mux1.clone();
    tokio::task::spawn_blocking(move || {
        let mut writer = Writer::new(write_mux0.clone(), handle, 1, write_mux0.global_worker(0), write_mux1.global_worker(0), 1024);
        writer.write_record(b"over the wire").unwrap();
        writer.close().unwrap();
    })
    .await
    .unwrap();

    let queue = mux1.reader_queue(1, 0);
    let record = tokio::task::spawn_blocking(move || Reader::new(queue).read_record())
        .await
        .unwrap();
    assert_eq!(record.unwrap(), b"over the wire");
}
