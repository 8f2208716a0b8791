//! Listener tests over real sockets.

use ripple_protocol::{
    read_frame, write_frame, ClientMessage, ConnectRequest, ReducerCall, RowChange,
    ServerMessage, TableChange, TableName, MAX_ARGUMENT_LEN,
};
use ripple_server::{serve, ChatServer, ServerConfig};
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn start() -> (Arc<ChatServer>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(ChatServer::new(
        ServerConfig::new(addr).with_secret(b"listener-test".to_vec()),
    ));
    let s = Arc::clone(&server);
    thread::spawn(move || serve(s, listener));
    (server, addr)
}

struct Peer {
    out: TcpStream,
    input: BufReader<TcpStream>,
}

impl Peer {
    fn open(addr: SocketAddr) -> Self {
        let out = TcpStream::connect(addr).unwrap();
        out.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let input = BufReader::new(out.try_clone().unwrap());
        Self { out, input }
    }

    fn send(&mut self, message: ClientMessage) {
        write_frame(&mut self.out, &message).unwrap();
    }

    fn recv(&mut self) -> Option<ServerMessage> {
        read_frame(&mut self.input).unwrap()
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn full_session_over_tcp() {
    let (server, addr) = start();
    let mut peer = Peer::open(addr);

    peer.send(ClientMessage::Connect(ConnectRequest::new(
        "quickstart-chat",
        None,
    )));
    let identity = match peer.recv() {
        Some(ServerMessage::IdentityToken { identity, .. }) => identity,
        other => panic!("expected identity token, got {other:?}"),
    };

    peer.send(ClientMessage::Subscribe {
        tables: TableName::ALL.to_vec(),
    });
    match peer.recv() {
        Some(ServerMessage::InitialSubscription(snapshot)) => {
            assert!(matches!(
                &snapshot.changes[..],
                [TableChange::User(RowChange::Insert(u))] if u.identity == identity && u.online
            ));
        }
        other => panic!("expected snapshot, got {other:?}"),
    }

    peer.send(ClientMessage::CallReducer(ReducerCall::SendMessage {
        text: "over the wire".into(),
    }));
    match peer.recv() {
        Some(ServerMessage::TransactionUpdate { update, event }) => {
            assert_eq!(event.caller, identity);
            assert!(matches!(
                &update.changes[..],
                [TableChange::Message(RowChange::Insert(m))] if m.text == "over the wire"
            ));
        }
        other => panic!("expected transaction update, got {other:?}"),
    }

    drop(peer);
    wait_for(|| server.connection_count() == 0);
    server.with_database(|db| assert!(!db.user(&identity).unwrap().online));
}

#[test]
fn wrong_database_is_rejected() {
    let (server, addr) = start();
    let mut peer = Peer::open(addr);

    peer.send(ClientMessage::Connect(ConnectRequest::new("elsewhere", None)));
    assert!(matches!(
        peer.recv(),
        Some(ServerMessage::ConnectRejected { reason }) if reason.contains("elsewhere")
    ));
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn first_message_must_be_connect() {
    let (_server, addr) = start();
    let mut peer = Peer::open(addr);

    peer.send(ClientMessage::Subscribe { tables: vec![] });
    assert!(matches!(
        peer.recv(),
        Some(ServerMessage::ConnectRejected { .. })
    ));
}

#[test]
fn large_history_reaches_late_joiner() {
    let (_server, addr) = start();
    let text = "w".repeat(400_000);
    assert!(text.len() <= MAX_ARGUMENT_LEN);

    let mut writer = Peer::open(addr);
    writer.send(ClientMessage::Connect(ConnectRequest::new(
        "quickstart-chat",
        None,
    )));
    assert!(matches!(
        writer.recv(),
        Some(ServerMessage::IdentityToken { .. })
    ));
    writer.send(ClientMessage::Subscribe {
        tables: vec![TableName::Message],
    });
    assert!(matches!(
        writer.recv(),
        Some(ServerMessage::InitialSubscription(_))
    ));
    for _ in 0..3 {
        writer.send(ClientMessage::CallReducer(ReducerCall::SendMessage {
            text: text.clone(),
        }));
        assert!(matches!(
            writer.recv(),
            Some(ServerMessage::TransactionUpdate { .. })
        ));
    }

    let mut joiner = Peer::open(addr);
    joiner.send(ClientMessage::Connect(ConnectRequest::new(
        "quickstart-chat",
        None,
    )));
    assert!(matches!(
        joiner.recv(),
        Some(ServerMessage::IdentityToken { .. })
    ));
    joiner.send(ClientMessage::Subscribe {
        tables: vec![TableName::Message],
    });

    let mut chunks = 0;
    let mut rows = Vec::new();
    loop {
        match joiner.recv() {
            Some(ServerMessage::SubscriptionChunk(part)) => {
                chunks += 1;
                rows.extend(part.changes);
            }
            Some(ServerMessage::InitialSubscription(part)) => {
                rows.extend(part.changes);
                break;
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    assert!(chunks > 0);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|change| matches!(
        change,
        TableChange::Message(RowChange::Insert(m)) if m.text.len() == 400_000
    )));
}
