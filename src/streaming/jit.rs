//! Just-in-time segment provider.
//!
//! The manifest is synthesized up front from the asset's duration, so it can
//! reference segments that have never been encoded. A segment request either
//! streams the cached file or starts an encode seeked to that segment's
//! offset, writing a temporary file while tee-ing the same bytes to the
//! waiting requester. Late joiners for the same segment attach to the build
//! and read the finished file instead of the live stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::{Config, EncoderConfig};
use crate::error::{Error, Result};
use crate::library::PlexClient;
use crate::streaming::dedup::{BuildRegistry, Claim};
use crate::streaming::paths;
use crate::streaming::{playlist, SegmentSource, StreamProvider};
use crate::transcode::{args, Supervisor};

const TEE_CHANNEL_CAPACITY: usize = 16;
const READ_CHUNK_BYTES: usize = 64 * 1024;

type TeeSender = mpsc::Sender<std::io::Result<Bytes>>;

#[derive(Clone)]
pub struct JitProvider {
    cache_root: PathBuf,
    segment_duration: u32,
    fallback_duration_secs: f64,
    encoder: EncoderConfig,
    client: Arc<PlexClient>,
    supervisor: Arc<Supervisor>,
    builds: BuildRegistry,
    /// Resolved source URLs, cached for the process lifetime. Never evicted;
    /// a URL the library stops honoring surfaces as a build failure, which is
    /// retryable.
    source_urls: Arc<DashMap<String, String>>,
}

impl JitProvider {
    pub fn new(config: &Config, client: Arc<PlexClient>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            cache_root: config.streaming.cache_dir.join("jit"),
            segment_duration: config.streaming.segment_duration,
            fallback_duration_secs: config.streaming.fallback_duration_secs,
            encoder: config.encoder.clone(),
            client,
            supervisor,
            builds: BuildRegistry::new(),
            source_urls: Arc::new(DashMap::new()),
        }
    }

    pub fn cache_dir_for(&self, asset_id: &str) -> PathBuf {
        self.cache_root.join(asset_id)
    }

    async fn source_url(&self, asset_id: &str) -> Result<String> {
        if let Some(url) = self.source_urls.get(asset_id) {
            return Ok(url.clone());
        }
        let url = self.client.primary_stream_url(asset_id).await?;
        self.source_urls.insert(asset_id.to_string(), url.clone());
        Ok(url)
    }

    /// Encode one segment into `final_path`, streaming every chunk to `tee`
    /// while the encode runs. The temporary file only becomes visible via an
    /// atomic rename after the encoder exits cleanly.
    async fn build_segment(
        &self,
        asset_id: &str,
        name: &str,
        final_path: &Path,
        index: u32,
        mut tee: Option<TeeSender>,
    ) -> Result<()> {
        let result = self
            .run_encode(asset_id, name, final_path, index, &mut tee)
            .await;
        if result.is_err() {
            if let Some(tx) = &tee {
                let _ = tx
                    .send(Err(std::io::Error::other("segment encode failed")))
                    .await;
            }
        }
        result
    }

    async fn run_encode(
        &self,
        asset_id: &str,
        name: &str,
        final_path: &Path,
        index: u32,
        tee: &mut Option<TeeSender>,
    ) -> Result<()> {
        let source_url = self.source_url(asset_id).await?;
        let start_seconds = f64::from(index) * f64::from(self.segment_duration);
        let encode_args = args::segment_args(
            &self.encoder,
            &source_url,
            start_seconds,
            self.segment_duration,
        );

        tracing::info!(asset_id, segment = name, start_seconds, "starting JIT encode");
        let tmp_path = final_path.with_extension("ts.tmp");

        let copy_result = async {
            let mut process =
                self.supervisor
                    .spawn(&format!("jit:{asset_id}:{name}"), &encode_args, true)?;
            let mut stdout = process
                .take_stdout()
                .ok_or_else(|| Error::build("encoder stdout unavailable", None))?;
            let mut file = tokio::fs::File::create(&tmp_path).await?;

            let mut buf = BytesMut::with_capacity(READ_CHUNK_BYTES);
            loop {
                let n = stdout.read_buf(&mut buf).await?;
                if n == 0 {
                    break;
                }
                let chunk = buf.split().freeze();
                file.write_all(&chunk).await?;
                // a disconnected requester only drops the tee; caching
                // continues regardless
                let requester_gone = match tee.as_ref() {
                    Some(tx) => tx.send(Ok(chunk)).await.is_err(),
                    None => false,
                };
                if requester_gone {
                    *tee = None;
                }
            }
            file.flush().await?;
            file.sync_all().await?;
            drop(file);

            process.wait_checked("JIT encode").await
        }
        .await;

        match copy_result {
            Ok(()) => {
                tokio::fs::rename(&tmp_path, final_path).await?;
                tracing::info!(asset_id, segment = name, "segment cached");
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                tracing::error!(asset_id, segment = name, error = %e, "JIT encode failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl StreamProvider for JitProvider {
    async fn playlist(&self, asset_id: &str) -> Result<String> {
        if !paths::is_safe_asset_id(asset_id) {
            return Err(Error::InvalidAssetId);
        }
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
        let index = paths::parse_segment_index(name).ok_or(Error::InvalidSegmentName)?;
        let dir = self.cache_dir_for(asset_id);
        let path = paths::resolve_segment_path(&dir, name).ok_or(Error::InvalidSegmentName)?;

        tokio::fs::create_dir_all(&dir).await?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(SegmentSource::File {
                path,
                immutable: true,
            });
        }

        let key = format!("{asset_id}:{name}");
        match self.builds.claim(&key) {
            Claim::Owner(slot) => {
                let (tee_tx, tee_rx) = mpsc::channel(TEE_CHANNEL_CAPACITY);
                let this = self.clone();
                let id = asset_id.to_string();
                let segment_name = name.to_string();
                let target = path.clone();
                let mut waiter = slot.spawn(async move {
                    this.build_segment(&id, &segment_name, &target, index, Some(tee_tx))
                        .await
                });

                let mut stream = ReceiverStream::new(tee_rx);
                match stream.next().await {
                    Some(Ok(first_chunk)) => {
                        let head = futures::stream::once(async move {
                            Ok::<_, std::io::Error>(first_chunk)
                        });
                        Ok(SegmentSource::Stream(head.chain(stream).boxed()))
                    }
                    Some(Err(marker)) => {
                        // the build failed before any output; report the
                        // settled outcome, not the marker
                        match waiter.wait().await {
                            Err(err) => Err(Error::from(err)),
                            Ok(()) => Err(Error::build(marker.to_string(), None)),
                        }
                    }
                    None => {
                        // encode finished before producing output
                        waiter.wait().await.map_err(Error::from)?;
                        Ok(SegmentSource::File {
                            path,
                            immutable: true,
                        })
                    }
                }
            }
            Claim::Waiter(mut waiter) => {
                waiter.wait().await.map_err(Error::from)?;
                Ok(SegmentSource::File {
                    path,
                    immutable: true,
                })
            }
        }
    }

    async fn shutdown(&self) {}
}
