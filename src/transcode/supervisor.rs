//! External encoder process supervision.
//!
//! Every spawned process is tracked from spawn to exit. A monitor task owns
//! the child: it publishes the final [`ExitOutcome`] on a watch channel and
//! handles termination requests with a graceful stop signal, a bounded grace
//! window, then a forced kill. Standard error is drained to debug logs;
//! standard output is either discarded or handed to the caller as a pipe.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, watch};

use crate::error::{Error, Result};

/// Final state of a supervised encoder process.
#[derive(Debug, Clone, Copy)]
pub struct ExitOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

struct TrackedProcess {
    term: mpsc::Sender<()>,
    exit: watch::Receiver<Option<ExitOutcome>>,
}

/// Spawns encoder processes and keeps a registry of the live ones so shutdown
/// can terminate everything it started.
pub struct Supervisor {
    program: PathBuf,
    grace: Duration,
    processes: Arc<DashMap<u64, TrackedProcess>>,
    next_id: AtomicU64,
}

/// Handle to one supervised process.
#[derive(Debug)]
pub struct ProcessHandle {
    stdout: Option<ChildStdout>,
    term: mpsc::Sender<()>,
    exit: watch::Receiver<Option<ExitOutcome>>,
}

impl Supervisor {
    pub fn new(program: PathBuf, grace: Duration) -> Self {
        Self {
            program,
            grace,
            processes: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Spawn the encoder with the given arguments. With `capture_stdout` the
    /// caller receives the stdout pipe; otherwise output goes nowhere and the
    /// encoder is expected to write files itself.
    pub fn spawn(&self, label: &str, args: &[String], capture_stdout: bool) -> Result<ProcessHandle> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(if capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::build(
                format!("failed to spawn {}: {e}", self.program.display()),
                None,
            )
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pid = child.id();
        tracing::debug!(%label, id, pid, "encoder spawned");

        if let Some(stderr) = child.stderr.take() {
            let label = label.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "plexrelay::encoder", %label, "{line}");
                }
            });
        }

        let stdout = child.stdout.take();
        let (term_tx, term_rx) = mpsc::channel(1);
        let (exit_tx, exit_rx) = watch::channel(None);

        self.processes.insert(
            id,
            TrackedProcess {
                term: term_tx.clone(),
                exit: exit_rx.clone(),
            },
        );

        tokio::spawn(monitor(
            id,
            label.to_string(),
            child,
            pid,
            term_rx,
            exit_tx,
            Arc::clone(&self.processes),
            self.grace,
        ));

        Ok(ProcessHandle {
            stdout,
            term: term_tx,
            exit: exit_rx,
        })
    }

    /// Number of processes currently tracked.
    pub fn live_count(&self) -> usize {
        self.processes.len()
    }

    /// Terminate every tracked process (graceful, then forced) and wait for
    /// all of them to be gone.
    pub async fn shutdown(&self) {
        let tracked: Vec<TrackedProcess> = {
            let ids: Vec<u64> = self.processes.iter().map(|e| *e.key()).collect();
            ids.into_iter()
                .filter_map(|id| self.processes.remove(&id).map(|(_, p)| p))
                .collect()
        };

        if tracked.is_empty() {
            return;
        }
        tracing::info!(count = tracked.len(), "terminating encoder processes");

        for process in &tracked {
            let _ = process.term.try_send(());
        }
        for process in tracked {
            let mut exit = process.exit;
            while exit.borrow().is_none() {
                if exit.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

impl ProcessHandle {
    /// Take the stdout pipe. Only available once, and only for processes
    /// spawned with `capture_stdout`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// A watch receiver that resolves to the exit outcome; lets holders
    /// observe an unexpected exit without taking the handle.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ExitOutcome>> {
        self.exit.clone()
    }

    /// Exit outcome if the process has already finished.
    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        *self.exit.borrow()
    }

    /// Wait for the process to finish.
    pub async fn wait(&mut self) -> ExitOutcome {
        loop {
            if let Some(outcome) = *self.exit.borrow() {
                return outcome;
            }
            if self.exit.changed().await.is_err() {
                // monitor died without publishing; treat as failure
                return ExitOutcome {
                    success: false,
                    code: None,
                };
            }
        }
    }

    /// Wait and map an abnormal exit to a build error.
    pub async fn wait_checked(&mut self, what: &str) -> Result<()> {
        let outcome = self.wait().await;
        if outcome.success {
            Ok(())
        } else {
            Err(Error::build(
                format!("{what} exited abnormally"),
                outcome.code,
            ))
        }
    }

    /// Request a graceful stop and wait until the process is confirmed gone.
    /// Never fails: after the grace window the process is killed outright.
    pub async fn terminate(&mut self) {
        let _ = self.term.try_send(());
        self.wait().await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn monitor(
    id: u64,
    label: String,
    mut child: Child,
    pid: Option<u32>,
    mut term_rx: mpsc::Receiver<()>,
    exit_tx: watch::Sender<Option<ExitOutcome>>,
    processes: Arc<DashMap<u64, TrackedProcess>>,
    grace: Duration,
) {
    let outcome = tokio::select! {
        status = child.wait() => outcome_from(&label, status),
        _ = term_rx.recv() => {
            request_stop(pid);
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => outcome_from(&label, status),
                Err(_) => {
                    tracing::warn!(%label, "encoder ignored stop request, killing");
                    let _ = child.start_kill();
                    outcome_from(&label, child.wait().await)
                }
            }
        }
    };

    tracing::debug!(%label, code = ?outcome.code, success = outcome.success, "encoder exited");
    processes.remove(&id);
    let _ = exit_tx.send(Some(outcome));
}

fn outcome_from(label: &str, status: std::io::Result<std::process::ExitStatus>) -> ExitOutcome {
    match status {
        Ok(status) => ExitOutcome {
            success: status.success(),
            code: status.code(),
        },
        Err(e) => {
            tracing::warn!(%label, error = %e, "failed to reap encoder process");
            ExitOutcome {
                success: false,
                code: None,
            }
        }
    }
}

#[cfg(unix)]
fn request_stop(pid: Option<u32>) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_stop(_pid: Option<u32>) {}
