//! Full VOD cache provider.
//!
//! The first playlist request for an asset triggers one complete transcode
//! into a permanent on-disk cache; once the playlist file exists, every later
//! request is a plain file read. The whole asset is built as one job, so a
//! segment that is not on disk is simply not found.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, EncoderConfig};
use crate::error::{Error, Result};
use crate::library::PlexClient;
use crate::streaming::dedup::BuildRegistry;
use crate::streaming::paths::{self, PLAYLIST_FILE};
use crate::streaming::{playlist, SegmentSource, StreamProvider};
use crate::transcode::{args, Supervisor};

#[derive(Clone)]
pub struct VodCacheProvider {
    cache_root: PathBuf,
    segment_duration: u32,
    window_segments: u32,
    encoder: EncoderConfig,
    client: Arc<PlexClient>,
    supervisor: Arc<Supervisor>,
    builds: BuildRegistry,
}

impl VodCacheProvider {
    pub fn new(config: &Config, client: Arc<PlexClient>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            cache_root: config.streaming.cache_dir.clone(),
            segment_duration: config.streaming.segment_duration,
            window_segments: config.streaming.window_segments,
            encoder: config.encoder.clone(),
            client,
            supervisor,
            builds: BuildRegistry::new(),
        }
    }

    pub fn cache_dir_for(&self, asset_id: &str) -> PathBuf {
        self.cache_root.join(asset_id)
    }

    pub fn playlist_path_for(&self, asset_id: &str) -> PathBuf {
        self.cache_dir_for(asset_id).join(PLAYLIST_FILE)
    }

    /// Make sure the asset's cache exists, building it if needed. Idempotent
    /// after the first success; concurrent callers share one build.
    pub async fn ensure(&self, asset_id: &str) -> Result<()> {
        if tokio::fs::try_exists(self.playlist_path_for(asset_id)).await? {
            return Ok(());
        }

        let this = self.clone();
        let id = asset_id.to_string();
        self.builds
            .run_exclusive(asset_id, move || async move { this.build(&id).await })
            .await
            .map_err(Error::from)
    }

    /// Wipe and rebuild the asset's cache directory with one full-length
    /// encode. Serialized per asset by the build registry.
    async fn build(&self, asset_id: &str) -> Result<()> {
        let dir = self.cache_dir_for(asset_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&dir).await?;

        let source_url = self.client.primary_stream_url(asset_id).await?;
        let playlist_path = dir.join(PLAYLIST_FILE);
        let encode_args = args::vod_args(
            &self.encoder,
            &source_url,
            self.segment_duration,
            self.window_segments,
            &dir.join("segment_%05d.ts"),
            &playlist_path,
        );

        tracing::info!(asset_id, "starting VOD build");
        let mut process = self
            .supervisor
            .spawn(&format!("vod:{asset_id}"), &encode_args, false)?;
        process.wait_checked("VOD build").await?;

        if !tokio::fs::try_exists(&playlist_path).await? {
            return Err(Error::build(
                "encoder finished without producing a playlist",
                None,
            ));
        }
        tracing::info!(asset_id, "VOD build complete");
        Ok(())
    }
}

#[async_trait]
impl StreamProvider for VodCacheProvider {
    async fn playlist(&self, asset_id: &str) -> Result<String> {
        if !paths::is_safe_asset_id(asset_id) {
            return Err(Error::InvalidAssetId);
        }
        self.ensure(asset_id).await?;
        let raw = tokio::fs::read_to_string(self.playlist_path_for(asset_id)).await?;
        Ok(playlist::rewrite(asset_id, &raw))
    }

    async fn segment(&self, asset_id: &str, name: &str) -> Result<SegmentSource> {
        if !paths::is_safe_asset_id(asset_id) {
            return Err(Error::InvalidAssetId);
        }
        let path = paths::resolve_segment_path(&self.cache_dir_for(asset_id), name)
            .ok_or(Error::InvalidSegmentName)?;

        if tokio::fs::try_exists(&path).await? {
            Ok(SegmentSource::File {
                path,
                immutable: true,
            })
        } else {
            Err(Error::NotFound)
        }
    }

    async fn shutdown(&self) {}
}
