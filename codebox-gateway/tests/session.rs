//! End-to-end coverage of the gateway's non-execution dispatch table:
//! register, login, and the file CRUD codes (§4.A), against a real
//! backend and a real WebSocket client. Execution (`EXEC`/`RUNF`) needs a
//! `docker` binary and is exercised only by `sandbox`'s unit tests.

use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use base64::Engine;
use codebox_backend::server::Server as BackendServer;
use codebox_backend::store::Database;
use codebox_gateway::backend_client::BackendClient;
use codebox_gateway::config::Config;
use codebox_gateway::server::Server as GatewayServer;
use codebox_protocol::frame::Frame;
use codebox_transport::BackendPool;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tungstenite::Message;

fn spin_up_backend() -> (String, RsaPublicKey) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("codebox.sqlite");
    std::mem::forget(dir);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let mut rng = rand::rngs::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public_key = RsaPublicKey::from(&private_key);

    let db = Database::open(db_path.to_str().unwrap(), b"test-pepper".to_vec()).unwrap();
    let server = BackendServer::new(db, private_key);
    thread::spawn(move || {
        server.serve(listener).unwrap();
    });
    thread::sleep(Duration::from_millis(50));
    (addr, public_key)
}

fn spin_up_gateway(backend_addr: String, backend_public_key: RsaPublicKey) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let gateway_addr = listener.local_addr().unwrap().to_string();
    let storage_dir = tempfile::tempdir().unwrap();
    let storage_base = storage_dir.path().to_path_buf();
    std::mem::forget(storage_dir);

    thread::spawn(move || {
        let pool = BackendPool::connect(&backend_addr, 2, backend_public_key).unwrap();
        let backend = BackendClient::new(pool);
        let config = Config {
            listen: String::new(),
            storage_base,
            backend_addr,
            backend_rsa_public_key_path: Default::default(),
            backend_pool_size: 2,
            sandbox_image: "python_runner".to_string(),
            inner_timeout: Duration::from_secs(60),
            outer_timeout: Duration::from_secs(61),
            input_poll_interval: Duration::from_millis(200),
            verbose: 0,
        };
        let server = GatewayServer::new(&backend, &config);
        server.serve(listener).unwrap();
    });
    thread::sleep(Duration::from_millis(50));
    gateway_addr
}

fn send_frame(ws: &mut tungstenite::WebSocket<TcpStream>, frame: Frame) {
    ws.send(Message::Text(frame.encode())).unwrap();
}

fn recv_frame(ws: &mut tungstenite::WebSocket<TcpStream>) -> Frame {
    loop {
        match ws.read().unwrap() {
            Message::Text(text) => return Frame::parse(&text).unwrap(),
            _ => continue,
        }
    }
}

#[test]
fn register_login_and_file_roundtrip() {
    let (backend_addr, backend_public_key) = spin_up_backend();
    let gateway_addr = spin_up_gateway(backend_addr, backend_public_key);

    let stream = TcpStream::connect(&gateway_addr).unwrap();
    let (mut ws, _) = tungstenite::client(format!("ws://{gateway_addr}/"), stream).unwrap();

    send_frame(&mut ws, Frame::new("REGI", vec!["eve@example.com".into(), "hunter2".into()]));
    let reply = recv_frame(&mut ws);
    assert_eq!(reply.code, "REGR");

    send_frame(&mut ws, Frame::new("LOGN", vec!["eve@example.com".into(), "hunter2".into()]));
    let reply = recv_frame(&mut ws);
    assert_eq!(reply.code, "LOGR");
    assert_eq!(reply.arg(0).unwrap(), "{\"children\":[]}");

    send_frame(
        &mut ws,
        Frame::new("CREA", vec!["{\"type\":\"file\",\"path\":\"a.py\"}".to_string()]),
    );
    assert_eq!(recv_frame(&mut ws).code, "CRER");

    send_frame(
        &mut ws,
        Frame::new("SAVF", vec!["{\"path\":\"a.py\",\"content\":\"print('hi')\"}".to_string()]),
    );
    assert_eq!(recv_frame(&mut ws).code, "SAVR");

    send_frame(&mut ws, Frame::new("GETF", vec!["a.py".to_string()]));
    let reply = recv_frame(&mut ws);
    assert_eq!(reply.code, "FILC");
    let content = base64::engine::general_purpose::STANDARD.decode(reply.arg(0).unwrap()).unwrap();
    assert_eq!(content, b"print('hi')");

    send_frame(&mut ws, Frame::new("DELF", vec!["a.py".to_string()]));
    assert_eq!(recv_frame(&mut ws).code, "DELR");

    send_frame(&mut ws, Frame::new("GETF", vec!["a.py".to_string()]));
    let reply = recv_frame(&mut ws);
    assert_eq!(reply.code, "ERRR");
}

#[test]
fn unauthenticated_access_is_rejected() {
    let (backend_addr, backend_public_key) = spin_up_backend();
    let gateway_addr = spin_up_gateway(backend_addr, backend_public_key);

    let stream = TcpStream::connect(&gateway_addr).unwrap();
    let (mut ws, _) = tungstenite::client(format!("ws://{gateway_addr}/"), stream).unwrap();

    send_frame(&mut ws, Frame::new("GETF", vec!["a.py".to_string()]));
    let reply = recv_frame(&mut ws);
    assert_eq!(reply.code, "ERRR");
    assert_eq!(reply.arg(0).unwrap(), "101");
}
