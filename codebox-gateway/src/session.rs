//! Per-client session state machine (§4.A). Grounded on the source's
//! `websocket_controller`: one `Session` owns one client socket, at most
//! one in-flight [`Execution`], and dispatches the full `CODE~arg~arg`
//! grammar from [`codebox_protocol::frame`].

use std::net::TcpStream;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use base64::Engine;
use codebox_protocol::errors::code;
use codebox_protocol::frame::{error_frame, Frame};
use codebox_protocol::tree::ValidPath;
use crossbeam_channel::TryRecvError;
use serde_derive::Deserialize;
use tracing::{info, instrument, warn};
use tungstenite::{Message, WebSocket};

use crate::backend_client::BackendClient;
use crate::config::Config;
use crate::sandbox::{Execution, ExecutionEvent};
use crate::vfs;

const EXECUTION_POLL_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Deserialize)]
struct SavfArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct CreaArgs {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

/// The full per-connection state (§3 `Session`: socket, authenticated
/// email, current execution, container tag).
pub struct Session<'a> {
    ws: WebSocket<TcpStream>,
    backend: &'a BackendClient,
    config: &'a Config,
    email: Option<String>,
    user_id: Option<u64>,
}

impl<'a> Session<'a> {
    pub fn new(ws: WebSocket<TcpStream>, backend: &'a BackendClient, config: &'a Config) -> Session<'a> {
        Session { ws, backend, config, email: None, user_id: None }
    }

    /// Runs the request/response loop until the client disconnects or a
    /// transport/crypto failure tears the session down (§5 propagation
    /// policy — only these two close the connection, everything else
    /// becomes a reply frame).
    #[instrument(skip(self))]
    pub fn run(&mut self) {
        loop {
            let message = match self.ws.read() {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    info!("client closed the connection");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "websocket read failed, closing session");
                    return;
                }
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => {
                    info!("client sent a close frame");
                    return;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                Message::Binary(_) => {
                    if self.send_text(error_frame(code::UNKNOWN)).is_err() {
                        return;
                    }
                    continue;
                }
            };

            let frame = match Frame::parse(&text) {
                Ok(frame) => frame,
                Err(_) => {
                    if self.send_text(error_frame(code::UNKNOWN)).is_err() {
                        return;
                    }
                    continue;
                }
            };

            if frame.code == "OUTT" {
                info!(email = ?self.email, "session logged out");
                return;
            }

            // `EXEC`/`RUNF` stream their own `OUTP`/`DONE` frames directly
            // from `drive_execution` and report success as an empty reply
            // here, so nothing further is sent for them.
            let reply = self.dispatch(&frame);
            if !reply.is_empty() && self.send_text(reply).is_err() {
                return;
            }
        }
    }

    fn send_text(&mut self, text: String) -> Result<(), tungstenite::Error> {
        self.ws.send(Message::Text(text))
    }

    /// Routes one frame to its handler, enforcing the authentication
    /// contract (§4.A: everything but `REGI`/`LOGN` requires a session
    /// email on file).
    fn dispatch(&mut self, frame: &Frame) -> String {
        if frame.code != "REGI" && frame.code != "LOGN" && self.email.is_none() {
            return error_frame(code::NOT_AUTHENTICATED);
        }

        let result = match frame.code.as_str() {
            "REGI" => self.handle_register(frame),
            "LOGN" => self.handle_login(frame),
            "GETF" => self.handle_get_file(frame),
            "SAVF" => self.handle_save_file(frame),
            "CREA" => self.handle_create(frame),
            "DELF" => self.handle_delete(frame),
            "DNLD" => self.handle_download(frame),
            "EXEC" => self.handle_exec(frame),
            "RUNF" => self.handle_runf(frame),
            _ => Err(error_frame(code::UNKNOWN)),
        };
        result.unwrap_or_else(|e| e)
    }

    fn storage_root(&self) -> Option<PathBuf> {
        self.user_id.map(|id| vfs::user_root(&self.config.storage_base, id))
    }

    fn handle_register(&mut self, frame: &Frame) -> Result<String, String> {
        let email = frame.arg(0).map_err(|_| error_frame(code::UNKNOWN))?;
        let password = frame.arg(1).map_err(|_| error_frame(code::UNKNOWN))?;
        let created = self.backend.add_user(email, password).map_err(|_| error_frame(code::UNKNOWN))?;
        if created {
            Ok(Frame::no_args("REGR").encode())
        } else {
            Err(error_frame(code::BAD_CREDENTIALS))
        }
    }

    /// On success, stores the email in the session and replies
    /// `LOGR~<tree-json>` (§4.A). Per DESIGN NOTES open question 3, a
    /// missing user and a wrong password are indistinguishable here —
    /// [`BackendClient::is_password_ok`] has already folded both into
    /// `Ok(false)`.
    fn handle_login(&mut self, frame: &Frame) -> Result<String, String> {
        let email = frame.arg(0).map_err(|_| error_frame(code::UNKNOWN))?.to_string();
        let password = frame.arg(1).map_err(|_| error_frame(code::UNKNOWN))?;

        let ok = self.backend.is_password_ok(&email, password).map_err(|_| error_frame(code::NOT_AUTHENTICATED))?;
        if !ok {
            return Err(error_frame(code::NOT_AUTHENTICATED));
        }

        let user_id = self
            .backend
            .get_user_id(&email)
            .map_err(|_| error_frame(code::NOT_AUTHENTICATED))?
            .ok_or_else(|| error_frame(code::NOT_AUTHENTICATED))?;
        vfs::ensure_user_root(&self.config.storage_base, user_id).map_err(|_| error_frame(code::STORAGE_UPDATE_FAILED))?;

        let tree = self.backend.get_user_files_struct(&email).map_err(|_| error_frame(code::UNKNOWN))?;
        let tree_json = serde_json::to_string(&tree).map_err(|_| error_frame(code::UNKNOWN))?;

        self.email = Some(email);
        self.user_id = Some(user_id);

        Ok(Frame::new("LOGR", vec![tree_json]).encode())
    }

    fn handle_get_file(&mut self, frame: &Frame) -> Result<String, String> {
        let root = self.storage_root().ok_or_else(|| error_frame(code::NOT_AUTHENTICATED))?;
        let path = ValidPath::parse(frame.arg(0).map_err(|_| error_frame(code::UNKNOWN))?)
            .map_err(|_| error_frame(code::NOT_FOUND))?;
        let content = vfs::read_file(&root, &path).map_err(|_| error_frame(code::NOT_FOUND))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        Ok(Frame::new("FILC", vec![encoded]).encode())
    }

    fn handle_save_file(&mut self, frame: &Frame) -> Result<String, String> {
        let root = self.storage_root().ok_or_else(|| error_frame(code::NOT_AUTHENTICATED))?;
        let args: SavfArgs =
            serde_json::from_str(frame.arg(0).map_err(|_| error_frame(code::UNKNOWN))?).map_err(|_| error_frame(code::UNKNOWN))?;
        let path = ValidPath::parse(&args.path).map_err(|_| error_frame(code::NOT_FOUND))?;
        vfs::write_file(&root, &path, &args.content).map_err(|_| error_frame(code::STORAGE_UPDATE_FAILED))?;
        Ok(Frame::no_args("SAVR").encode())
    }

    fn handle_create(&mut self, frame: &Frame) -> Result<String, String> {
        let root = self.storage_root().ok_or_else(|| error_frame(code::NOT_AUTHENTICATED))?;
        let email = self.email.clone().ok_or_else(|| error_frame(code::NOT_AUTHENTICATED))?;
        let args: CreaArgs =
            serde_json::from_str(frame.arg(0).map_err(|_| error_frame(code::UNKNOWN))?).map_err(|_| error_frame(code::UNKNOWN))?;
        let path = ValidPath::parse(&args.path).map_err(|_| error_frame(code::NOT_FOUND))?;

        let mut tree = self.backend.get_user_files_struct(&email).map_err(|_| error_frame(code::UNKNOWN))?;
        let tree_result = if args.kind == "folder" {
            tree.create_dir(&path)
        } else {
            tree.create_file(&path)
        };
        tree_result.map_err(|e| error_frame(e.client_code()))?;

        let disk_result = if args.kind == "folder" { vfs::create_dir(&root, &path) } else { vfs::create_file(&root, &path) };
        disk_result.map_err(|_| error_frame(code::STORAGE_UPDATE_FAILED))?;

        self.backend.set_user_files_struct(&email, &tree).map_err(|_| error_frame(code::STORAGE_UPDATE_FAILED))?;
        Ok(Frame::no_args("CRER").encode())
    }

    fn handle_delete(&mut self, frame: &Frame) -> Result<String, String> {
        let root = self.storage_root().ok_or_else(|| error_frame(code::NOT_AUTHENTICATED))?;
        let email = self.email.clone().ok_or_else(|| error_frame(code::NOT_AUTHENTICATED))?;
        let path = ValidPath::parse(frame.arg(0).map_err(|_| error_frame(code::UNKNOWN))?)
            .map_err(|_| error_frame(code::NOT_FOUND))?;

        let mut tree = self.backend.get_user_files_struct(&email).map_err(|_| error_frame(code::UNKNOWN))?;
        tree.delete(&path).map_err(|e| error_frame(e.client_code()))?;
        vfs::delete(&root, &path).map_err(|_| error_frame(code::STORAGE_UPDATE_FAILED))?;
        self.backend.set_user_files_struct(&email, &tree).map_err(|_| error_frame(code::STORAGE_UPDATE_FAILED))?;
        Ok(Frame::no_args("DELR").encode())
    }

    fn handle_download(&mut self, frame: &Frame) -> Result<String, String> {
        let root = self.storage_root().ok_or_else(|| error_frame(code::NOT_AUTHENTICATED))?;
        let path = ValidPath::parse(frame.arg(0).map_err(|_| error_frame(code::UNKNOWN))?)
            .map_err(|_| error_frame(code::NOT_FOUND))?;
        let content = vfs::read_file(&root, &path).map_err(|_| error_frame(code::NOT_FOUND))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        Ok(Frame::new("DNLR", vec![encoded]).encode())
    }

    fn handle_exec(&mut self, frame: &Frame) -> Result<String, String> {
        let code_b64 = frame.arg(0).map_err(|_| error_frame(code::UNKNOWN))?;
        let snippet = base64::engine::general_purpose::STANDARD
            .decode(code_b64)
            .map_err(|_| error_frame(code::UNKNOWN))?;
        let execution = Execution::start_inline(&self.config.sandbox_image, &snippet, self.config.inner_timeout)
            .map_err(|_| error_frame(code::UNKNOWN))?;
        self.drive_execution(execution);
        Ok(String::new())
    }

    fn handle_runf(&mut self, frame: &Frame) -> Result<String, String> {
        let root = self.storage_root().ok_or_else(|| error_frame(code::NOT_AUTHENTICATED))?;
        let path = ValidPath::parse(frame.arg(0).map_err(|_| error_frame(code::UNKNOWN))?)
            .map_err(|_| error_frame(code::NOT_FOUND))?;
        if !root.join(path.as_disk_relative()).is_file() {
            return Err(error_frame(code::NOT_FOUND));
        }
        let execution =
            Execution::start_from_storage(&self.config.sandbox_image, &root, &path.as_disk_relative(), self.config.inner_timeout)
                .map_err(|_| error_frame(code::UNKNOWN))?;
        self.drive_execution(execution);
        Ok(String::new())
    }

    /// Runs an execution to completion, streaming `OUTP`/`INPT` frames to
    /// the client and relaying its `INPR` replies back down, then sends
    /// the terminal `DONE` frame itself (the caller's `Ok(String::new())`
    /// is a no-op reply so this is the only writer of record).
    fn drive_execution(&mut self, execution: Execution) {
        let outer_deadline = Instant::now() + self.config.outer_timeout;
        let (events_tx, events_rx) = crossbeam_channel::bounded(64);
        let (blocked_tx, blocked_rx) = crossbeam_channel::bounded(1);
        let (input_tx, input_rx) = crossbeam_channel::bounded::<Vec<u8>>(1);
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);

        let input_poll_interval = self.config.input_poll_interval;
        let handle = thread::spawn(move || {
            execution.run(outer_deadline, events_tx, blocked_tx, input_rx, cancel_rx, input_poll_interval)
        });

        if let Err(e) = self.ws.get_ref().set_read_timeout(Some(EXECUTION_POLL_TIMEOUT)) {
            warn!(error = %e, "failed to set socket read timeout, execution streaming disabled");
            let _ = cancel_tx.send(());
            let _ = handle.join();
            return;
        }

        let mut awaiting_input = false;
        let disconnected = 'outer: loop {
            loop {
                match events_rx.try_recv() {
                    Ok(ExecutionEvent::Output(chunk)) => {
                        let encoded = base64::engine::general_purpose::STANDARD.encode(chunk);
                        if self.send_text(Frame::new("OUTP", vec![encoded]).encode()).is_err() {
                            break 'outer true;
                        }
                    }
                    Ok(ExecutionEvent::Done(exit_code)) => {
                        let _ = self.send_text(Frame::new("DONE", vec![exit_code.to_string()]).encode());
                        break 'outer false;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'outer false,
                }
            }

            if !awaiting_input && blocked_rx.try_recv().is_ok() {
                if self.send_text(Frame::no_args("INPT").encode()).is_err() {
                    break 'outer true;
                }
                awaiting_input = true;
            }

            match self.ws.read() {
                Ok(Message::Text(text)) => {
                    if let Ok(frame) = Frame::parse(&text) {
                        if frame.code == "INPR" && awaiting_input {
                            if let Ok(arg) = frame.arg(0) {
                                if let Ok(line) = base64::engine::general_purpose::STANDARD.decode(arg) {
                                    let _ = input_tx.send(line);
                                    awaiting_input = false;
                                }
                            }
                        }
                        // Any other frame mid-execution is silently ignored;
                        // §4.A only legalizes `INPR` in this window.
                    }
                }
                Ok(Message::Close(_)) => break 'outer true,
                Ok(_) => {}
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(_) => break 'outer true,
            }
        };

        if disconnected {
            let _ = cancel_tx.send(());
        }
        let _ = handle.join();
        let _ = self.ws.get_ref().set_read_timeout(None);
    }
}
