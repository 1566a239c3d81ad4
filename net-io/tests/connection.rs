use net_io::Connection;
use tokio::net::{TcpListener, TcpStream};

#[tokio::test]
async fn send_recv_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        let mut conn = Connection::new(sock, 0, 1);
        let mut buf = [0u8; 5];
        conn.recv(&mut buf).await.unwrap();
        conn.send(&buf).await.unwrap();
    });

    let sock = TcpStream::connect(addr).await.unwrap();
    let mut conn = Connection::new(sock, 1, 1);
    conn.send(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    conn.recv(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello");

    server.await.unwrap();
}

#[tokio::test]
async fn recv_after_peer_close_is_peer_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        drop(sock);
    });

    let sock = TcpStream::connect(addr).await.unwrap();
    let mut conn = Connection::new(sock, 1, 1);
    let mut buf = [0u8; 5];
    let err = conn.recv(&mut buf).await.unwrap_err();
    assert!(err.is_peer_closed());

    server.await.unwrap();
}

#[tokio::test]
async fn send_receive_and_receive_send_exchange_symmetrically() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        let mut conn = Connection::new(sock, 0, 1);
        // higher rank: receive_send
        let got = conn.receive_send(5, b"world").await.unwrap();
        got
    });

    let sock = TcpStream::connect(addr).await.unwrap();
    let mut conn = Connection::new(sock, 1, 1);
    // lower rank: send_receive
    let got = conn.send_receive(b"hello", 5).await.unwrap();
    assert_eq!(got, b"world");

    let server_got = server.await.unwrap();
    assert_eq!(server_got, b"hello");
}
