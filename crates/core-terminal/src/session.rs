// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use rand::RngCore;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tracing::debug;

use crate::error::TerminalError;
use crate::ring::OutputRing;

const RING_CAPACITY: usize = 1000;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

static SENTINEL_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_sentinel(tag: &str) -> String {
    let seq = SENTINEL_SEQ.fetch_add(1, Ordering::SeqCst);
    let nonce = rand::thread_rng().next_u64();
    format!("__{tag}_{nonce:016x}_{seq}__")
}

/// One interactive shell session: an exclusively-owned pty, a ring-buffered
/// view of its raw output, and a mutex serializing command execution.
///
/// The pty reader runs on a dedicated OS thread because `portable_pty`'s
/// reader is a blocking `std::io::Read`; it pushes completed lines into
/// `ring` for as long as the session lives.
pub struct ShellSession {
    pub id: String,
    ring: Arc<OutputRing>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    command_mutex: AsyncMutex<()>,
    _child: Box<dyn portable_pty::Child + Send + Sync>,
    _master: Box<dyn portable_pty::MasterPty + Send>,
}

impl ShellSession {
    pub fn spawn(id: impl Into<String>, shell: &str) -> Result<Self, TerminalError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 40,
                cols: 160,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::OpenPty(e.into()))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.env("TERM", "xterm-256color");
        cmd.env("PS1", "$ ");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::SpawnShell(e.into()))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::OpenPty(e.into()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TerminalError::OpenPty(e.into()))?;

        let ring = Arc::new(OutputRing::new(RING_CAPACITY));
        spawn_reader_thread(reader, ring.clone());

        Ok(Self {
            id: id.into(),
            ring,
            writer: Arc::new(Mutex::new(writer)),
            command_mutex: AsyncMutex::new(()),
            _child: child,
            _master: pair.master,
        })
    }

    /// Runs `command` to completion and returns the output lines strictly
    /// between the `START` and `END` sentinels. No two commands execute
    /// concurrently within one session.
    pub async fn execute(&self, command: &str, timeout: Duration) -> Result<Vec<String>, TerminalError> {
        let _guard = self.command_mutex.lock().await;

        let start = next_sentinel("START");
        let end = next_sentinel("END");
        let script = format!("echo '{start}' && {command} && echo '{end}'\n");
        self.write(&script)?;

        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.ring.snapshot();
            if let Some(output) = extract_between(&snapshot, &start, &end) {
                return Ok(output);
            }
            if Instant::now() >= deadline {
                return Err(TerminalError::Timeout);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    fn write(&self, script: &str) -> Result<(), TerminalError> {
        let mut writer = self.writer.lock().unwrap();
        writer
            .write_all(script.as_bytes())
            .map_err(TerminalError::Write)?;
        writer.flush().map_err(TerminalError::Write)
    }

    pub fn tail(&self) -> Vec<String> {
        self.ring.snapshot()
    }
}

/// Given the ring buffer's current contents, return the lines strictly
/// between the last occurrence of `start` and the first occurrence of `end`
/// that follows it, or `None` if `end` has not yet appeared.
fn extract_between(lines: &[String], start: &str, end: &str) -> Option<Vec<String>> {
    let start_idx = lines.iter().rposition(|l| l.trim_end() == start)?;
    let end_idx = lines[start_idx + 1..]
        .iter()
        .position(|l| l.trim_end().starts_with(end))?
        + start_idx
        + 1;
    Some(lines[start_idx + 1..end_idx].to_vec())
}

fn spawn_reader_thread(mut reader: Box<dyn Read + Send>, ring: Arc<OutputRing>) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        let mut partial = String::new();
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    partial.push_str(&String::from_utf8_lossy(&buf[..n]));
                    while let Some(pos) = partial.find('\n') {
                        let line = partial[..pos].trim_end_matches('\r').to_string();
                        ring.push_line(line);
                        partial = partial[pos + 1..].to_string();
                    }
                }
                Err(e) => {
                    debug!(error = %e, "pty reader thread exiting");
                    break;
                }
            }
        }
    });
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
