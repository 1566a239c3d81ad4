use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use net_io::{ConnId, Dispatcher};
use tokio::net::{TcpListener, TcpStream};

#[tokio::test]
async fn async_read_buffer_delivers_exact_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let mut client = TcpStream::connect(addr).await.unwrap();
    let server = accept.await.unwrap();

    let dispatcher = Dispatcher::new(link_async::Spawner::from_current().unwrap());
    let received = Arc::new(std::sync::Mutex::new(None));
    let received2 = Arc::clone(&received);

    dispatcher.async_read_buffer(ConnId::next(), Arc::new(server), 5, move |buf| {
        *received2.lock().unwrap() = Some(buf);
    });

    tokio::io::AsyncWriteExt::write_all(&mut client, b"hello")
        .await
        .unwrap();

    for _ in 0..100 {
        if received.lock().unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(received.lock().unwrap().as_deref(), Some(&b"hello"[..]));
}

#[tokio::test]
async fn cancel_stops_further_timer_ticks() {
    let dispatcher = Dispatcher::new(link_async::Spawner::from_current().unwrap());
    let ticks = Arc::new(AtomicUsize::new(0));
    let ticks2 = Arc::clone(&ticks);
    let id = ConnId::next();

    dispatcher.register_timer(id, Duration::from_millis(5), move || {
        ticks2.fetch_add(1, Ordering::Relaxed);
        true
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    dispatcher.cancel(id);
    let at_cancel = ticks.load(Ordering::Relaxed);
    assert!(at_cancel > 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::Relaxed), at_cancel);
}
