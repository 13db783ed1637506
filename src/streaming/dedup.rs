//! Per-key deduplication of in-flight builds.
//!
//! At most one build runs per key at any instant; every concurrent caller for
//! the same key attaches to that build and observes the same outcome. The
//! entry is removed exactly once, when the build settles, so a later caller
//! after a failure starts a clean retry. Builds run on their own task and
//! keep running even if every requester disconnects.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::Error;

/// Outcome shared between the build owner and all attached waiters.
pub type BuildResult = std::result::Result<(), Arc<Error>>;

type ResultSlot = watch::Receiver<Option<BuildResult>>;

/// In-flight build table keyed by asset (or asset + segment).
#[derive(Clone, Default)]
pub struct BuildRegistry {
    jobs: Arc<Mutex<HashMap<String, ResultSlot>>>,
}

/// What a caller got when claiming a key.
pub enum Claim {
    /// Nothing in flight; the caller must spawn the build via [`JobSlot::spawn`].
    Owner(JobSlot),
    /// A build is running; wait on it.
    Waiter(JobWaiter),
}

pub struct JobSlot {
    key: String,
    jobs: Arc<Mutex<HashMap<String, ResultSlot>>>,
    tx: watch::Sender<Option<BuildResult>>,
    rx: ResultSlot,
}

pub struct JobWaiter {
    rx: ResultSlot,
}

impl BuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`: the first caller becomes the owner, everyone else a waiter.
    pub fn claim(&self, key: &str) -> Claim {
        let mut jobs = self.jobs.lock().expect("build registry poisoned");
        if let Some(rx) = jobs.get(key) {
            return Claim::Waiter(JobWaiter { rx: rx.clone() });
        }
        let (tx, rx) = watch::channel(None);
        jobs.insert(key.to_string(), rx.clone());
        Claim::Owner(JobSlot {
            key: key.to_string(),
            jobs: Arc::clone(&self.jobs),
            tx,
            rx,
        })
    }

    /// Run `build` under `key`, or attach to an identical in-flight build.
    pub async fn run_exclusive<F, Fut>(&self, key: &str, build: F) -> BuildResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
    {
        match self.claim(key) {
            Claim::Owner(slot) => slot.spawn(build()).wait().await,
            Claim::Waiter(mut waiter) => waiter.wait().await,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.jobs.lock().expect("build registry poisoned").len()
    }
}

impl JobSlot {
    /// Drive `build` on its own task. The registry entry is removed before
    /// the result is published, so a caller arriving after settlement starts
    /// a fresh build rather than reading a stale one.
    pub fn spawn(
        self,
        build: impl Future<Output = crate::error::Result<()>> + Send + 'static,
    ) -> JobWaiter {
        let Self { key, jobs, tx, rx } = self;
        tokio::spawn(async move {
            let result = build.await.map_err(Arc::new);
            jobs.lock().expect("build registry poisoned").remove(&key);
            let _ = tx.send(Some(result));
        });
        JobWaiter { rx }
    }
}

impl JobWaiter {
    /// Wait for the build to settle.
    pub async fn wait(&mut self) -> BuildResult {
        loop {
            {
                let current = self.rx.borrow();
                if let Some(result) = current.as_ref() {
                    return result.clone();
                }
            }
            if self.rx.changed().await.is_err() {
                return Err(Arc::new(Error::build(
                    "build task dropped before settling",
                    None,
                )));
            }
        }
    }
}
