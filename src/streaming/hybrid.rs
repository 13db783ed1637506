//! Hybrid provider: background VOD build with JIT-like early availability.
//!
//! The first touch of an asset fires the full VOD build in the background.
//! Playlist requests poll the filling cache until a minimum number of
//! segments exist (with a grace escape for short assets), then hand out a
//! synthesized full-duration manifest on the assumption the build stays ahead
//! of playback. Segment requests wait, bounded, for their specific file.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::{Config, HybridConfig};
use crate::error::{Error, Result};
use crate::library::PlexClient;
use crate::streaming::paths;
use crate::streaming::vod::VodCacheProvider;
use crate::streaming::{fswait, playlist, SegmentSource, StreamProvider};

#[derive(Clone)]
pub struct HybridProvider {
    segment_duration: u32,
    fallback_duration_secs: f64,
    settings: HybridConfig,
    client: Arc<PlexClient>,
    vod: Arc<VodCacheProvider>,
    in_flight: Arc<DashMap<String, ()>>,
    completed: Arc<DashMap<String, ()>>,
}

impl HybridProvider {
    pub fn new(config: &Config, client: Arc<PlexClient>, vod: Arc<VodCacheProvider>) -> Self {
        Self {
            segment_duration: config.streaming.segment_duration,
            fallback_duration_secs: config.streaming.fallback_duration_secs,
            settings: config.hybrid.clone(),
            client,
            vod,
            in_flight: Arc::new(DashMap::new()),
            completed: Arc::new(DashMap::new()),
        }
    }

    /// Fire the VOD build for this asset unless it already ran or is running.
    /// The caller never waits on it.
    fn trigger_build(&self, asset_id: &str) {
        if self.completed.contains_key(asset_id) {
            return;
        }
        if self.in_flight.insert(asset_id.to_string(), ()).is_some() {
            return;
        }

        let this = self.clone();
        let id = asset_id.to_string();
        tokio::spawn(async move {
            match this.vod.ensure(&id).await {
                Ok(()) => {
                    this.completed.insert(id.clone(), ());
                }
                Err(e) => {
                    tracing::error!(asset_id = %id, error = %e, "background VOD build failed");
                }
            }
            this.in_flight.remove(&id);
        });
    }

    /// Poll the cache until the readiness threshold is met or the deadline
    /// expires. Returns NotReady only when zero segments ever materialized.
    async fn wait_for_initial_segments(&self, asset_id: &str) -> Result<Vec<String>> {
        let dir = self.vod.cache_dir_for(asset_id);
        let started = Instant::now();
        // short assets may never reach the minimum; after a few polls a
        // non-empty window is good enough
        let grace = self.settings.poll_interval * 3;

        while started.elapsed() < self.settings.wait_timeout {
            let segments = fswait::list_segments(&dir).await?;
            if segments.len() >= self.settings.min_ready_segments {
                return Ok(segments);
            }
            if !segments.is_empty() && started.elapsed() > grace {
                return Ok(segments);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }

        let segments = fswait::list_segments(&dir).await?;
        if segments.is_empty() {
            Err(Error::NotReady)
        } else {
            Ok(segments)
        }
    }
}

#[async_trait]
impl StreamProvider for HybridProvider {
    async fn playlist(&self, asset_id: &str) -> Result<String> {
        if !paths::is_safe_asset_id(asset_id) {
            return Err(Error::InvalidAssetId);
        }
        self.trigger_build(asset_id);
        self.wait_for_initial_segments(asset_id).await?;

        // full-duration manifest: references every eventual segment, not just
        // the ones already on disk
        let metadata = self.client.get_metadata(asset_id).await?;
        let total_seconds = metadata.duration_seconds(self.fallback_duration_secs);
        Ok(playlist::synthesize(
            asset_id,
            total_seconds,
            self.segment_duration,
        ))
    }

    async fn segment(&self, asset_id: &str, name: &str) -> Result<SegmentSource> {
        if !paths::is_safe_asset_id(asset_id) {
            return Err(Error::InvalidAssetId);
        }
        let path = paths::resolve_segment_path(&self.vod.cache_dir_for(asset_id), name)
            .ok_or(Error::InvalidSegmentName)?;

        self.trigger_build(asset_id);
        fswait::wait_for_file(&path, self.settings.read_timeout, self.settings.read_poll).await?;

        Ok(SegmentSource::File {
            path,
            immutable: true,
        })
    }

    async fn shutdown(&self) {}
}
