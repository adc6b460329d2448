//! Log output that stays off the screen while the terminal preview owns it.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::EnvFilter;

/// Routes formatted log lines to stderr, or into a buffer while held.
#[derive(Clone, Default)]
pub struct LogGate {
    /// `Some` while held: lines collected since the hold began.
    pending: Arc<Mutex<Option<Vec<u8>>>>,
}

impl LogGate {
    /// Buffer log output until the returned guard is dropped.
    pub fn hold(&self) -> HeldLogs {
        *lock(&self.pending) = Some(Vec::new());
        HeldLogs { gate: self.clone() }
    }

    fn writer(&self) -> GateWriter {
        GateWriter { gate: self.clone() }
    }

    #[cfg(test)]
    fn buffered(&self) -> Option<usize> {
        lock(&self.pending).as_ref().map(Vec::len)
    }
}

fn lock(pending: &Mutex<Option<Vec<u8>>>) -> MutexGuard<'_, Option<Vec<u8>>> {
    // A panic mid-write leaves at worst a partial line behind.
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases held log lines to stderr when dropped.
pub struct HeldLogs {
    gate: LogGate,
}

impl Drop for HeldLogs {
    fn drop(&mut self) {
        if let Some(lines) = lock(&self.gate.pending).take() {
            let _ = io::stderr().write_all(&lines);
        }
    }
}

struct GateWriter {
    gate: LogGate,
}

impl Write for GateWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pending = lock(&self.gate.pending);
        match pending.as_mut() {
            Some(lines) => {
                lines.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => {
                drop(pending);
                io::stderr().write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Install the global subscriber: `RUST_LOG` filtering, output through `gate`.
pub fn init_logging(gate: &LogGate) {
    let gate = gate.clone();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(move || gate.writer())
        .init();
}
