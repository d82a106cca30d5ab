//! The sandbox execution supervisor (§4.B). Grounded on the source's
//! `run_script`/`run_from_storage`/`get_python_pid`/`stream_output`, with
//! two binding corrections from §9 DESIGN NOTES:
//!
//! 1. inline code is piped to the container's stdin, never interpolated
//!    into a shell `echo` (open question 5);
//! 2. the wall-clock timeout sentinel is always `3`, not the `202` the
//!    source returns from one of its two near-duplicate code paths — this
//!    applies whether the kill comes from the in-container `timeout`
//!    wrapper (the common case, exit code 124) or the outer watchdog
//!    thread that backstops it.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use crossbeam_channel::{Receiver, Sender};
use tracing::{info, instrument};

use crate::container_tag;
use crate::input_block::InputBlockDetector;

const SANDBOX_WORKDIR: &str = "/home/sandboxuser/app";
const OUTPUT_CHUNK_SIZE: usize = 1024;
const PID_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PID_RESOLVE_WINDOW: Duration = Duration::from_secs(5);

/// Exit code sentinel for a wall-clock timeout (§4.B, canonical per §9 —
/// overriding the source's inconsistent `202` in `run_from_storage`).
pub const TIMEOUT_EXIT_CODE: i32 = 3;

/// Exit code the in-container `timeout` wrapper itself uses when it had to
/// kill the payload. This is normally the path that actually fires: the
/// inner `timeout {secs}s` expires at `inner_timeout`, well before the
/// outer watchdog's `outer_timeout` deadline, closing stdout and handing
/// `child.wait()` this code before the watchdog ever wakes up.
const INNER_TIMEOUT_COMMAND_EXIT_CODE: i32 = 124;

/// Maps a finished child's raw exit status to the code reported in `DONE`,
/// folding in both ways a timeout can surface: the watchdog thread killing
/// the process directly (`timed_out`), or the in-container `timeout`
/// wrapper having already killed it and exited 124 itself.
fn exit_code_for(timed_out: bool, status_code: Option<i32>) -> i32 {
    if timed_out || status_code == Some(INNER_TIMEOUT_COMMAND_EXIT_CODE) {
        TIMEOUT_EXIT_CODE
    } else {
        status_code.unwrap_or(1)
    }
}

/// One chunk of merged stdout/stderr, or the terminal exit status.
pub enum ExecutionEvent {
    Output(Vec<u8>),
    Done(i32),
}

/// One attempted run of user code (§3 `Execution`). The child lives
/// behind a mutex so a watchdog thread can kill it out from under a
/// blocking stdout read on the execution thread.
pub struct Execution {
    container_tag: String,
    child: Arc<Mutex<Child>>,
    stdout: std::process::ChildStdout,
    pid: Option<u32>,
}

enum Source {
    Inline(Vec<u8>),
    Stored { host_dir: std::path::PathBuf, rel_path: String },
}

impl Execution {
    #[instrument(skip(code))]
    pub fn start_inline(image: &str, code: &[u8], inner_timeout: Duration) -> anyhow::Result<Execution> {
        Execution::start(image, Source::Inline(code.to_vec()), inner_timeout)
    }

    #[instrument(skip(host_dir))]
    pub fn start_from_storage(
        image: &str,
        host_dir: &Path,
        rel_path: &str,
        inner_timeout: Duration,
    ) -> anyhow::Result<Execution> {
        Execution::start(
            image,
            Source::Stored { host_dir: host_dir.to_path_buf(), rel_path: rel_path.to_string() },
            inner_timeout,
        )
    }

    fn start(image: &str, source: Source, inner_timeout: Duration) -> anyhow::Result<Execution> {
        let tag = container_tag::next_tag();
        let timeout_secs = inner_timeout.as_secs();

        let mut command = Command::new("docker");
        command
            .arg("run")
            .arg("-i")
            .arg("--rm")
            .arg("--cpus=0.5")
            .arg("--memory=128m")
            .arg("--pids-limit=64")
            .arg("--network")
            .arg("none")
            .arg("--name")
            .arg(&tag);

        match &source {
            Source::Inline(_) => {
                command.arg(image).arg("/bin/bash").arg("-c").arg(format!(
                    "cat > script.py && timeout {timeout_secs}s python3 -u script.py 2>&1"
                ));
            }
            Source::Stored { host_dir, rel_path } => {
                let mount = format!("{}:{}:ro", host_dir.display(), SANDBOX_WORKDIR);
                command.arg("-v").arg(mount).arg(image).arg("/bin/bash").arg("-c").arg(format!(
                    "timeout {timeout_secs}s python3 -u {}/{} 2>&1",
                    SANDBOX_WORKDIR, rel_path
                ));
            }
        }

        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::null());

        let mut child = command.spawn().context("spawning docker run")?;

        if let Source::Inline(code) = &source {
            // Stream the snippet to the container's stdin rather than
            // interpolating it into a shell command — the in-container
            // `cat > script.py` reads it from the pipe itself.
            let mut stdin = child.stdin.take().context("docker run stdin was not piped")?;
            stdin.write_all(code).context("writing inline snippet to container stdin")?;
            if !code.ends_with(b"\n") {
                stdin.write_all(b"\n").ok();
            }
            drop(stdin); // EOF so `cat` returns and the script starts
        }

        let stdout = child.stdout.take().context("docker run stdout was not piped")?;

        info!(tag = %tag, "container started");

        Ok(Execution { container_tag: tag, child: Arc::new(Mutex::new(child)), stdout, pid: None })
    }

    /// Resolves the payload PID by polling `docker exec <name> pgrep -f
    /// script.py` until a numeric reply is obtained or the process exits
    /// (§4.B "PID discovery").
    fn resolve_pid(&mut self, script_name: &str, deadline: Instant) -> Option<u32> {
        loop {
            if Instant::now() >= deadline {
                return None;
            }
            if let Ok(Some(_status)) = self.child.lock().expect("child mutex poisoned").try_wait() {
                return None;
            }
            let output = Command::new("docker")
                .arg("exec")
                .arg(&self.container_tag)
                .arg("pgrep")
                .arg("-f")
                .arg(script_name)
                .output();
            if let Ok(output) = output {
                let text = String::from_utf8_lossy(&output.stdout);
                if let Some(first_line) = text.lines().next() {
                    if let Ok(pid) = first_line.trim().parse::<u32>() {
                        return Some(pid);
                    }
                }
            }
            thread::sleep(PID_POLL_INTERVAL);
        }
    }

    /// Drives the execution to completion: resolves the PID, runs the
    /// output streamer and input-block detector concurrently, and returns
    /// once a terminal `ExecutionEvent::Done` has been sent.
    ///
    /// `events` receives `ExecutionEvent::Output` chunks followed by
    /// exactly one terminal `ExecutionEvent::Done`. `on_input_blocked`
    /// signals the caller to emit `INPT`; `inputs` relays back the
    /// session's decoded `INPR` payload. `cancel` lets the caller tear the
    /// execution down early (client disconnect, §5).
    pub fn run(
        mut self,
        outer_deadline: Instant,
        events: Sender<ExecutionEvent>,
        on_input_blocked: Sender<()>,
        inputs: Receiver<Vec<u8>>,
        cancel: Receiver<()>,
        input_poll_interval: Duration,
    ) -> anyhow::Result<()> {
        self.pid = self.resolve_pid("script.py", Instant::now() + PID_RESOLVE_WINDOW);

        let detector_handle = self.pid.map(|pid| {
            let tag = self.container_tag.clone();
            let detector = InputBlockDetector::new(tag, pid, input_poll_interval);
            thread::spawn(move || detector.run(on_input_blocked, inputs))
        });

        let timed_out = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let watchdog = {
            let child = Arc::clone(&self.child);
            let timed_out = Arc::clone(&timed_out);
            let wait = outer_deadline.saturating_duration_since(Instant::now());
            thread::spawn(move || {
                let should_kill = crossbeam_channel::select! {
                    recv(cancel) -> _ => true,
                    recv(done_rx) -> _ => false,
                    default(wait) => {
                        timed_out.store(true, Ordering::SeqCst);
                        true
                    }
                };
                if should_kill {
                    if let Ok(mut child) = child.lock() {
                        let _ = child.kill();
                    }
                }
            })
        };

        let mut buf = vec![0u8; OUTPUT_CHUNK_SIZE];
        loop {
            match self.stdout.read(&mut buf) {
                Ok(0) => {
                    let status =
                        self.child.lock().expect("child mutex poisoned").wait().context("waiting for container exit")?;
                    let code = exit_code_for(timed_out.load(Ordering::SeqCst), status.code());
                    let _ = events.send(ExecutionEvent::Done(code));
                    break;
                }
                Ok(n) => {
                    let _ = events.send(ExecutionEvent::Output(buf[..n].to_vec()));
                }
                Err(e) => {
                    bail!("reading container output: {e}");
                }
            }
        }

        let _ = done_tx.send(());
        if let Some(handle) = detector_handle {
            let _ = handle.join();
        }
        let _ = watchdog.join();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_sentinel_is_three() {
        assert_eq!(TIMEOUT_EXIT_CODE, 3);
    }

    #[test]
    fn inner_timeout_wrapper_exit_maps_to_sentinel() {
        assert_eq!(exit_code_for(false, Some(124)), TIMEOUT_EXIT_CODE);
    }

    #[test]
    fn watchdog_kill_maps_to_sentinel_regardless_of_raw_status() {
        assert_eq!(exit_code_for(true, Some(137)), TIMEOUT_EXIT_CODE);
    }

    #[test]
    fn ordinary_exit_code_passes_through() {
        assert_eq!(exit_code_for(false, Some(0)), 0);
        assert_eq!(exit_code_for(false, Some(1)), 1);
    }
}
