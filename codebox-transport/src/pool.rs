//! The backend connection pool (§4.E): a fixed-size set of eagerly-dialed,
//! handshake-complete sessions, acquired one at a time and released on
//! every exit path via the [`Lease`] RAII guard (§9 DESIGN NOTES:
//! "scoped acquisition ... becomes a lease type with guaranteed release on
//! all exit paths, including panics").
//!
//! Slots live in a bounded `crossbeam_channel` rather than behind a shared
//! mutex guarding a `Vec` — the teacher reaches for `crossbeam-channel`
//! wherever it needs blocking inter-thread handoff (`daemon::shell`'s
//! reader control channel), and a bounded channel gives "block until one
//! is free" and an optional deadline for free via `recv`/`recv_timeout`,
//! with no separate condvar bookkeeping.

use std::net::TcpStream;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use rsa::RsaPublicKey;
use tracing::{info, instrument, warn};

use crate::secure::SecureChannel;

/// A fixed-size pool of pre-dialed backend connections.
pub struct BackendPool {
    addr: String,
    server_public_key: RsaPublicKey,
    sender: Sender<SecureChannel<TcpStream>>,
    receiver: Receiver<SecureChannel<TcpStream>>,
}

impl BackendPool {
    /// Dials and handshakes `size` connections to `addr` up front.
    #[instrument(skip(server_public_key))]
    pub fn connect(addr: &str, size: usize, server_public_key: RsaPublicKey) -> anyhow::Result<BackendPool> {
        let (sender, receiver) = crossbeam_channel::bounded(size);
        for _ in 0..size {
            sender.send(dial(addr, &server_public_key)?).expect("channel sized to fit every dialed slot");
        }
        info!(size, addr, "backend pool dialed");
        Ok(BackendPool { addr: addr.to_string(), server_public_key, sender, receiver })
    }

    /// Acquires a session, blocking until one is free, with an optional
    /// deadline (§4.E: "implementations should accept an optional
    /// deadline").
    pub fn acquire(&self, deadline: Option<Duration>) -> anyhow::Result<Lease<'_>> {
        let channel = match deadline {
            None => self.receiver.recv().context("backend pool channel closed")?,
            Some(d) => self
                .receiver
                .recv_timeout(d)
                .context("timed out waiting for a backend pool slot")?,
        };
        Ok(Lease { pool: self, channel: Some(channel), poisoned: false })
    }

    fn redial(&self) -> anyhow::Result<SecureChannel<TcpStream>> {
        warn!(addr = %self.addr, "redialing poisoned backend slot");
        dial(&self.addr, &self.server_public_key)
    }
}

fn dial(addr: &str, server_public_key: &RsaPublicKey) -> anyhow::Result<SecureChannel<TcpStream>> {
    let stream = TcpStream::connect(addr).with_context(|| format!("dialing backend at {addr}"))?;
    SecureChannel::connect(stream, server_public_key).context("handshaking with backend")
}

/// A single exclusively-owned pool slot. Dropping the lease returns the
/// channel to the pool regardless of how the scope was exited —
/// including via panic, since `Drop::drop` still runs during unwinding. A
/// lease marked [`Lease::poison`] is re-dialed before being returned to
/// the pool rather than handed out dead on the next acquire.
pub struct Lease<'p> {
    pool: &'p BackendPool,
    channel: Option<SecureChannel<TcpStream>>,
    poisoned: bool,
}

impl<'p> Lease<'p> {
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    pub fn channel(&mut self) -> &mut SecureChannel<TcpStream> {
        self.channel.as_mut().expect("channel only taken on drop")
    }
}

impl<'p> Drop for Lease<'p> {
    fn drop(&mut self) {
        let channel = if self.poisoned {
            match self.pool.redial() {
                Ok(fresh) => fresh,
                Err(e) => {
                    // Nothing left to do but drop the slot entirely; the
                    // pool will run one connection short until an
                    // operator notices. A future acquire still succeeds
                    // as long as at least one other slot remains healthy.
                    tracing::error!(error = ?e, "failed to redial poisoned backend slot, dropping it");
                    return;
                }
            }
        } else {
            self.channel.take().expect("channel only taken on drop")
        };
        let _ = self.pool.sender.send(channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn spin_up_test_backend() -> (String, RsaPublicKey, rsa::RsaPrivateKey) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut rng = rand::rngs::OsRng;
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);

        let accept_key = private_key.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = stream.unwrap();
                let accept_key = accept_key.clone();
                thread::spawn(move || {
                    let mut channel = SecureChannel::accept(stream, &accept_key).unwrap();
                    loop {
                        let msg: Result<String, _> = channel.recv();
                        match msg {
                            Ok(m) => {
                                if channel.send(&format!("echo:{m}")).is_err() {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                });
            }
        });

        (addr, public_key, private_key)
    }

    #[test]
    fn acquire_release_round_trips_an_rpc() {
        let (addr, public_key, _private_key) = spin_up_test_backend();
        // give the listener thread a moment to bind and start accepting
        thread::sleep(Duration::from_millis(50));

        let pool = BackendPool::connect(&addr, 2, public_key).unwrap();
        let mut lease = pool.acquire(Some(Duration::from_secs(2))).unwrap();
        lease.channel().send(&"ping".to_string()).unwrap();
        let reply: String = lease.channel().recv().unwrap();
        assert_eq!(reply, "echo:ping");
        drop(lease);

        // the slot must have been returned to the pool
        let _second = pool.acquire(Some(Duration::from_millis(100))).unwrap();
    }

    #[test]
    #[allow(unused_must_use)]
    fn exhausted_pool_times_out() {
        let (addr, public_key, _private_key) = spin_up_test_backend();
        thread::sleep(Duration::from_millis(50));

        let pool = BackendPool::connect(&addr, 1, public_key).unwrap();
        let _held = pool.acquire(Some(Duration::from_secs(1))).unwrap();
        let result = pool.acquire(Some(Duration::from_millis(50)));
        assert!(result.is_err());
    }
}
