//! End-to-end coverage of the backend over a real TCP socket: handshake,
//! register/login, and the `FileTree` persistence round trip (§4.F).

use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use codebox_backend::server::Server;
use codebox_backend::store::Database;
use codebox_protocol::rpc::{Command, Response};
use codebox_protocol::tree::{Node, ValidPath};
use codebox_transport::SecureChannel;
use rsa::{RsaPrivateKey, RsaPublicKey};

fn spin_up_backend() -> (String, RsaPublicKey) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("codebox.sqlite");
    // Leaked on purpose: the tempdir must outlive the backend thread,
    // which runs for the rest of the process.
    std::mem::forget(dir);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let mut rng = rand::rngs::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public_key = RsaPublicKey::from(&private_key);

    let db = Database::open(db_path.to_str().unwrap(), b"test-pepper".to_vec()).unwrap();
    let server = Server::new(db, private_key);
    thread::spawn(move || {
        server.serve(listener).unwrap();
    });
    thread::sleep(Duration::from_millis(50));

    (addr, public_key)
}

#[test]
fn register_then_login_then_wrong_password_is_rejected() {
    let (addr, public_key) = spin_up_backend();

    let stream = TcpStream::connect(&addr).unwrap();
    let mut channel = SecureChannel::connect(stream, &public_key).unwrap();

    channel.send(&Command::AddUser { email: "carol@example.com".into(), password: "s3cret".into() }).unwrap();
    assert!(matches!(channel.recv::<Response>().unwrap(), Response::Bool(true)));

    channel
        .send(&Command::IsPasswordOk { email: "carol@example.com".into(), password: "s3cret".into() })
        .unwrap();
    assert!(matches!(channel.recv::<Response>().unwrap(), Response::Bool(true)));

    channel
        .send(&Command::IsPasswordOk { email: "carol@example.com".into(), password: "wrong".into() })
        .unwrap();
    assert!(matches!(channel.recv::<Response>().unwrap(), Response::Bool(false)));

    channel
        .send(&Command::IsPasswordOk { email: "nobody@example.com".into(), password: "whatever".into() })
        .unwrap();
    match channel.recv::<Response>().unwrap() {
        Response::Error { error_type, .. } => assert_eq!(error_type, "UserNotFoundError"),
        other => panic!("expected UserNotFoundError, got {other:?}"),
    }
}

#[test]
fn file_tree_persists_across_connections() {
    let (addr, public_key) = spin_up_backend();

    let stream = TcpStream::connect(&addr).unwrap();
    let mut channel = SecureChannel::connect(stream, &public_key).unwrap();
    channel.send(&Command::AddUser { email: "dave@example.com".into(), password: "pw".into() }).unwrap();
    channel.recv::<Response>().unwrap();

    let mut tree = codebox_protocol::tree::FileTree::new();
    tree.create_file(&ValidPath::parse("main.py").unwrap()).unwrap();
    channel.send(&Command::SetUserFilesStruct { email: "dave@example.com".into(), tree }).unwrap();
    assert!(matches!(channel.recv::<Response>().unwrap(), Response::Ack));
    drop(channel);

    // A fresh connection should see the persisted tree.
    let stream = TcpStream::connect(&addr).unwrap();
    let mut channel = SecureChannel::connect(stream, &public_key).unwrap();
    channel.send(&Command::GetUserFilesStruct { email: "dave@example.com".into() }).unwrap();
    match channel.recv::<Response>().unwrap() {
        Response::Tree(tree) => {
            assert_eq!(tree.children.len(), 1);
            assert_eq!(tree.children[0].name(), "main.py");
            assert!(matches!(tree.children[0], Node::File { .. }));
        }
        other => panic!("expected a tree, got {other:?}"),
    }
}
