//! The gateway's accept loop (§4.A). Grounded on the backend's
//! `Server::serve` shape: one thread per accepted connection, here
//! upgraded to a WebSocket before handing off to a [`Session`].

use std::net::TcpListener;
use std::thread;

use tracing::{info, instrument, warn};

use crate::backend_client::BackendClient;
use crate::config::Config;
use crate::session::Session;

pub struct Server<'a> {
    backend: &'a BackendClient,
    config: &'a Config,
}

impl<'a> Server<'a> {
    pub fn new(backend: &'a BackendClient, config: &'a Config) -> Server<'a> {
        Server { backend, config }
    }

    #[instrument(skip(self, listener))]
    pub fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        info!("gateway listening");
        thread::scope(|scope| {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = ?e, "error accepting connection");
                        continue;
                    }
                };
                let backend = self.backend;
                let config = self.config;
                scope.spawn(move || {
                    let peer = stream.peer_addr().ok();
                    let ws = match tungstenite::accept(stream) {
                        Ok(ws) => ws,
                        Err(e) => {
                            warn!(?peer, error = ?e, "websocket upgrade failed");
                            return;
                        }
                    };
                    info!(?peer, "client connected");
                    Session::new(ws, backend, config).run();
                    info!(?peer, "client disconnected");
                });
            }
        });
        Ok(())
    }
}
