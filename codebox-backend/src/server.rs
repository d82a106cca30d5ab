//! The backend RPC accept loop and command dispatcher (§4.F).
//!
//! Grounded on the source's `ClientHandler`/`start_server`: one thread per
//! accepted connection, the RSA/AES handshake performed up front, then a
//! command loop until the peer disconnects. Per DESIGN NOTES, dispatch is
//! a closed match over `codebox_protocol::rpc::Command` rather than
//! reflection over method names, and every command acquires the same
//! process-wide write lock around the store for the duration of the call.

use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context;
use codebox_protocol::rpc::{Command, Response};
use codebox_transport::SecureChannel;
use rsa::RsaPrivateKey;
use tracing::{info, instrument, warn};

use crate::store::Database;

pub struct Server {
    db: Arc<Mutex<Database>>,
    rsa_private_key: Arc<RsaPrivateKey>,
}

impl Server {
    pub fn new(db: Database, rsa_private_key: RsaPrivateKey) -> Server {
        Server { db: Arc::new(Mutex::new(db)), rsa_private_key: Arc::new(rsa_private_key) }
    }

    #[instrument(skip(self))]
    pub fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        info!("backend listening");
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = ?e, "error accepting connection");
                    continue;
                }
            };
            let db = self.db.clone();
            let rsa_private_key = self.rsa_private_key.clone();
            thread::spawn(move || {
                if let Err(e) = handle_conn(stream, db, rsa_private_key) {
                    warn!(error = ?e, "client handler exited with error");
                }
            });
        }
        Ok(())
    }
}

#[instrument(skip(stream, db, rsa_private_key))]
fn handle_conn(
    stream: TcpStream,
    db: Arc<Mutex<Database>>,
    rsa_private_key: Arc<RsaPrivateKey>,
) -> anyhow::Result<()> {
    let peer = stream.peer_addr().context("reading peer addr")?;
    info!(%peer, "accepted connection");

    let mut channel = match SecureChannel::accept(stream, &rsa_private_key) {
        Ok(c) => c,
        Err(e) => {
            warn!(%peer, error = ?e, "handshake failed, closing connection");
            return Err(e);
        }
    };

    loop {
        let plaintext = match channel.recv_raw() {
            Ok(bytes) => bytes,
            Err(e) => {
                info!(%peer, error = ?e, "connection closed or transport error");
                return Ok(());
            }
        };

        let response = match codebox_transport::secure::decode::<Command>(&plaintext) {
            Ok(command) => dispatch(&db, command),
            Err(e) => {
                warn!(%peer, error = ?e, "received an unrecognized command tag");
                Response::unknown_command()
            }
        };
        if let Err(e) = channel.send(&response) {
            warn!(%peer, error = ?e, "failed to send response, closing connection");
            return Err(e);
        }
    }
}

/// Exhaustive dispatch over the allow-list (§4.F). Every variant acquires
/// the store's single lock for exactly the duration of its call.
fn dispatch(db: &Arc<Mutex<Database>>, command: Command) -> Response {
    let db = db.lock().unwrap();
    match command {
        Command::IsUserExist { email } => match db.is_user_exist(&email) {
            Ok(exists) => Response::Bool(exists),
            Err(e) => store_error_response(e),
        },
        Command::GetUserId { email } => match db.get_user_id(&email) {
            Ok(id) => Response::UserId(id),
            Err(e) => store_error_response(e),
        },
        Command::IsPasswordOk { email, password } => match db.is_password_ok(&email, &password) {
            Ok(ok) => Response::Bool(ok),
            Err(e) => store_error_response(e),
        },
        Command::AddUser { email, password } => match db.add_user(&email, &password) {
            Ok(created) => Response::Bool(created),
            Err(e) => store_error_response(e),
        },
        Command::SetUserFilesStruct { email, tree } => match db.set_user_files_struct(&email, &tree) {
            Ok(()) => Response::Ack,
            Err(e) => store_error_response(e),
        },
        Command::GetUserFilesStruct { email } => match db.get_user_files_struct(&email) {
            Ok(tree) => Response::Tree(tree),
            Err(e) => store_error_response(e),
        },
        Command::GetAllUsersString => match db.get_all_users_string() {
            Ok(s) => Response::AllUsersString(s),
            Err(e) => store_error_response(e),
        },
    }
}

fn store_error_response(e: crate::errors::StoreError) -> Response {
    use crate::errors::StoreError;
    match &e {
        StoreError::UserNotFound(email) => Response::error("UserNotFoundError", format!("no user found with email '{email}'")),
        _ => Response::error("StoreError", e.to_string()),
    }
}
