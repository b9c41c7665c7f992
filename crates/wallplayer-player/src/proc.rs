//! Player process table.
//!
//! Sessions are matched to OS processes by scanning for the known player
//! binaries and reading each candidate's command line, so a session whose
//! pid was never captured at spawn time can still be reconciled later.

use std::fs;
use std::process::Command;

use tracing::{debug, warn};

use crate::types::ProcessRecord;

/// Player binaries we may have spawned.
const PLAYER_BINARIES: &[&str] = &["omxplayer.bin", "vlc"];

/// Snapshot of live player processes.
#[derive(Debug, Default)]
pub struct ProcessTable {
    records: Vec<ProcessRecord>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rescan the OS for live player processes.
    pub fn refresh(&mut self) {
        self.records.clear();

        for binary in PLAYER_BINARIES {
            for pid in pidof(binary) {
                match fs::read_to_string(format!("/proc/{}/cmdline", pid)) {
                    Ok(raw) => {
                        // /proc cmdline is NUL-separated.
                        let cmdline = raw.replace('\0', " ").trim().to_string();
                        self.records.push(ProcessRecord { pid, cmdline });
                    }
                    Err(_) => {
                        // Process exited between pidof and the read.
                        debug!(pid, "player process vanished during scan");
                    }
                }
            }
        }
    }

    /// All known player pids.
    pub fn pids(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.pid).collect()
    }

    /// Find the process whose command line carries `signature` (the
    /// session's unique control-channel name).
    pub fn find_by_signature(&self, signature: &str) -> Option<u32> {
        self.records
            .iter()
            .find(|r| r.cmdline.contains(signature))
            .map(|r| r.pid)
    }

    /// Forget a process without killing it.
    pub fn remove(&mut self, pid: u32) {
        self.records.retain(|r| r.pid != pid);
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, record: ProcessRecord) {
        self.records.push(record);
    }
}

fn pidof(binary: &str) -> Vec<u32> {
    let output = match Command::new("pidof").arg(binary).output() {
        Ok(output) => output,
        Err(e) => {
            warn!(binary, "pidof failed: {}", e);
            return Vec::new();
        }
    };

    String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// Terminate a process, escalating to SIGKILL when SIGTERM is ignored.
pub fn kill_process(pid: u32, force: bool) {
    let signal = if force { "-9" } else { "-15" };

    if let Err(e) = Command::new("kill").arg(signal).arg(pid.to_string()).status() {
        warn!(pid, "kill failed: {}", e);
    }
}
