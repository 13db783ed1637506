//! Live sliding-window session provider.
//!
//! One continuously-appending encode runs per asset. The encoder maintains a
//! bounded window of segments on disk (old ones deleted as new ones land), so
//! playback can continue indefinitely without pre-encoding the whole asset,
//! at the cost of no seeking beyond the window. Sessions are touched on every
//! read and evicted once idle past the TTL.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::time::Instant;

use crate::config::{Config, EncoderConfig};
use crate::error::{Error, Result};
use crate::library::PlexClient;
use crate::streaming::paths::{self, PLAYLIST_FILE};
use crate::streaming::{fswait, playlist, SegmentSource, StreamProvider};
use crate::transcode::{args, ExitOutcome, ProcessHandle, Supervisor};

/// Window size used when the configured value is 0 ("unbounded"), which only
/// makes sense for the VOD muxer.
const DEFAULT_WINDOW_SEGMENTS: u32 = 6;

/// One running live transcode bound to one asset.
pub struct LiveSession {
    asset_id: String,
    dir: PathBuf,
    playlist_path: PathBuf,
    last_access: parking_lot::Mutex<Instant>,
    exit: watch::Receiver<Option<ExitOutcome>>,
    process: Mutex<ProcessHandle>,
}

impl LiveSession {
    fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_access.lock().elapsed() > ttl
    }

    /// True once the encoder process has exited, expectedly or not.
    fn has_ended(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Terminate the encoder (graceful, then forced) and remove the session
    /// directory. Safe to call more than once.
    async fn stop(&self) {
        self.process.lock().await.terminate().await;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(asset_id = %self.asset_id, error = %e, "failed to remove session directory");
            }
        }
        tracing::debug!(asset_id = %self.asset_id, "live session stopped");
    }
}

type SessionSlot = Arc<OnceCell<Arc<LiveSession>>>;

#[derive(Clone)]
pub struct LiveStreamProvider {
    cache_root: PathBuf,
    segment_duration: u32,
    window_segments: u32,
    ttl: Duration,
    playlist_wait: Duration,
    playlist_poll: Duration,
    encoder: EncoderConfig,
    client: Arc<PlexClient>,
    supervisor: Arc<Supervisor>,
    sessions: Arc<DashMap<String, SessionSlot>>,
    session_seq: Arc<AtomicU64>,
}

impl LiveStreamProvider {
    pub fn new(config: &Config, client: Arc<PlexClient>, supervisor: Arc<Supervisor>) -> Self {
        let window = match config.streaming.window_segments {
            0 => DEFAULT_WINDOW_SEGMENTS,
            n => n,
        };
        Self {
            cache_root: config.streaming.cache_dir.join("live"),
            segment_duration: config.streaming.segment_duration,
            window_segments: window,
            ttl: config.streaming.session_ttl,
            playlist_wait: config.streaming.playlist_wait,
            playlist_poll: config.streaming.playlist_poll,
            encoder: config.encoder.clone(),
            client,
            supervisor,
            sessions: Arc::new(DashMap::new()),
            session_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the asset's session, starting one if none is running. A session
    /// found ended or expired is torn down and replaced once.
    async fn ensure_session(&self, asset_id: &str) -> Result<Arc<LiveSession>> {
        let mut replaced = false;
        loop {
            let slot: SessionSlot = self
                .sessions
                .entry(asset_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();
            let session = slot
                .get_or_try_init(|| self.start_session(asset_id))
                .await?
                .clone();

            if (session.has_ended() || session.is_expired(self.ttl)) && !replaced {
                replaced = true;
                tracing::info!(asset_id, "replacing ended live session");
                self.sessions.remove_if(asset_id, |_, slot| {
                    slot.get()
                        .is_some_and(|current| Arc::ptr_eq(current, &session))
                });
                session.stop().await;
                continue;
            }

            session.touch();
            return Ok(session);
        }
    }

    /// Start the encoder for one asset and wait for its manifest to appear.
    async fn start_session(&self, asset_id: &str) -> Result<Arc<LiveSession>> {
        let seq = self.session_seq.fetch_add(1, Ordering::Relaxed);
        let dir = self.cache_root.join(format!("{asset_id}-{seq}"));
        tokio::fs::create_dir_all(&dir).await?;

        let session = match self.spawn_session(asset_id, &dir).await {
            Ok(session) => session,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&dir).await;
                return Err(e);
            }
        };

        match fswait::wait_for_file(&session.playlist_path, self.playlist_wait, self.playlist_poll)
            .await
        {
            Ok(()) => Ok(session),
            Err(e) => {
                tracing::warn!(asset_id, "live session produced no manifest in time");
                session.stop().await;
                Err(e)
            }
        }
    }

    async fn spawn_session(&self, asset_id: &str, dir: &std::path::Path) -> Result<Arc<LiveSession>> {
        let source_url = self.client.primary_stream_url(asset_id).await?;
        let playlist_path = dir.join(PLAYLIST_FILE);
        let encode_args = args::live_args(
            &self.encoder,
            &source_url,
            self.segment_duration,
            self.window_segments,
            &dir.join("segment_%05d.ts"),
            &playlist_path,
        );

        tracing::info!(asset_id, "starting live session");
        let process = self
            .supervisor
            .spawn(&format!("live:{asset_id}"), &encode_args, false)?;

        Ok(Arc::new(LiveSession {
            asset_id: asset_id.to_string(),
            dir: dir.to_path_buf(),
            playlist_path,
            last_access: parking_lot::Mutex::new(Instant::now()),
            exit: process.exit_watch(),
            process: Mutex::new(process),
        }))
    }

    /// Stop and remove every session that is idle past the TTL or whose
    /// encoder exited. Returns how many were evicted.
    pub async fn evict_expired(&self) -> usize {
        let mut victims = Vec::new();
        for entry in self.sessions.iter() {
            if let Some(session) = entry.value().get() {
                if session.is_expired(self.ttl) || session.has_ended() {
                    victims.push((entry.key().clone(), Arc::clone(session)));
                }
            }
        }

        let mut removed = 0;
        for (asset_id, session) in victims {
            tracing::info!(asset_id = %asset_id, "evicting idle live session");
            self.sessions.remove_if(&asset_id, |_, slot| {
                slot.get()
                    .is_some_and(|current| Arc::ptr_eq(current, &session))
            });
            session.stop().await;
            removed += 1;
        }
        removed
    }

    /// Number of sessions currently tracked (including ones still starting).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl StreamProvider for LiveStreamProvider {
    async fn playlist(&self, asset_id: &str) -> Result<String> {
        if !paths::is_safe_asset_id(asset_id) {
            return Err(Error::InvalidAssetId);
        }
        let session = self.ensure_session(asset_id).await?;

        match tokio::fs::read_to_string(&session.playlist_path).await {
            Ok(raw) => Ok(playlist::rewrite(asset_id, &raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotReady),
            Err(e) => Err(e.into()),
        }
    }

    async fn segment(&self, asset_id: &str, name: &str) -> Result<SegmentSource> {
        if !paths::is_safe_asset_id(asset_id) {
            return Err(Error::InvalidAssetId);
        }
        // a segment read never starts a session; the playlist does that
        let session = match self.sessions.get(asset_id) {
            Some(slot) => match slot.get() {
                Some(session) => Arc::clone(session),
                None => return Err(Error::NotReady),
            },
            None => return Err(Error::NotFound),
        };
        session.touch();

        let path = paths::resolve_segment_path(&session.dir, name)
            .ok_or(Error::InvalidSegmentName)?;
        if tokio::fs::try_exists(&path).await? {
            // window files are transient; clients must not cache them
            Ok(SegmentSource::File {
                path,
                immutable: false,
            })
        } else {
            Err(Error::NotFound)
        }
    }

    async fn shutdown(&self) {
        let sessions: Vec<Arc<LiveSession>> = self
            .sessions
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect();
        self.sessions.clear();
        for session in sessions {
            session.stop().await;
        }
    }
}

/// Start a background task that periodically evicts idle sessions.
pub fn start_sweep_task(
    provider: LiveStreamProvider,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            provider.evict_expired().await;
        }
    })
}
