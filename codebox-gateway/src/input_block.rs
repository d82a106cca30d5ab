//! Detects when the payload process is blocked waiting on stdin and
//! relays a line typed by the client back into it (§4.C). Grounded on
//! the source's `moniter_input_syscalls`/`stream_input`: a polling loop
//! over `ps -o state=` rather than a syscall trace, because the sandbox
//! has no ptrace access.

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{instrument, warn};

/// `ps -o state=` reports `S`/`D` for a process sleeping in a blocking
/// read; `R`/`Z`/empty (process gone) are not blocked.
fn is_blocked_state(state: &str) -> bool {
    matches!(state.trim(), "S" | "D")
}

pub struct InputBlockDetector {
    container_tag: String,
    pid: u32,
    poll_interval: Duration,
}

impl InputBlockDetector {
    pub fn new(container_tag: String, pid: u32, poll_interval: Duration) -> InputBlockDetector {
        InputBlockDetector { container_tag, pid, poll_interval }
    }

    /// Polls until the process looks blocked on stdin, signals once via
    /// `on_blocked`, then waits for exactly one line on `inputs` and
    /// writes it into `/proc/<pid>/fd/0`. Returns once a line has been
    /// delivered, or silently if the channels close first (the execution
    /// ended before anyone typed anything).
    #[instrument(skip(self, on_blocked, inputs), fields(tag = %self.container_tag, pid = self.pid))]
    pub fn run(&self, on_blocked: Sender<()>, inputs: Receiver<Vec<u8>>) {
        loop {
            thread::sleep(self.poll_interval);

            let output = Command::new("docker")
                .arg("exec")
                .arg(&self.container_tag)
                .arg("ps")
                .arg("-o")
                .arg("state=")
                .arg("-p")
                .arg(self.pid.to_string())
                .output();

            let state = match output {
                Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout).to_string(),
                // Non-zero exit means the pid (and likely the container) is gone.
                _ => return,
            };

            if !is_blocked_state(&state) {
                continue;
            }

            if on_blocked.send(()).is_err() {
                return;
            }

            let Ok(mut line) = inputs.recv() else {
                return;
            };
            if !line.ends_with(b"\n") {
                line.push(b'\n');
            }
            if let Err(e) = self.write_stdin(&line) {
                warn!(error = %e, "failed delivering input to blocked process");
            }
            return;
        }
    }

    fn write_stdin(&self, line: &[u8]) -> anyhow::Result<()> {
        let mut child = Command::new("docker")
            .arg("exec")
            .arg("-i")
            .arg(&self.container_tag)
            .arg("bash")
            .arg("-c")
            .arg(format!("cat > /proc/{}/fd/0", self.pid))
            .stdin(Stdio::piped())
            .spawn()?;
        let mut stdin = child.stdin.take().expect("docker exec stdin was not piped");
        stdin.write_all(line)?;
        drop(stdin);
        child.wait()?;
        Ok(())
    }
}
