//! Adaptive HLS delivery strategies.
//!
//! One provider is active per process, selected by configuration. Each turns
//! a library asset id into a playlist plus segment bytes with a different
//! trade-off:
//!
//! - **live**: one continuously-running encode per asset with a sliding
//!   segment window; cheap to start, no seeking beyond the window
//! - **vod**: one eager full-length encode into a permanent cache; slow first
//!   request, everything cached after
//! - **jit**: each segment encoded on demand by seeking the source; full
//!   random access, storage and CPU paid per segment touched
//! - **hybrid**: VOD build fired in the background, requests served from the
//!   progressively-filling cache once enough segments exist

pub mod dedup;
pub mod fswait;
pub mod hybrid;
pub mod jit;
pub mod live;
pub mod paths;
pub mod playlist;
pub mod vod;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::config::{Config, ProviderKind};
use crate::error::Result;
use crate::library::PlexClient;
use crate::transcode::Supervisor;

/// Byte stream handed to the HTTP layer for an in-progress encode.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Where a segment response's bytes come from.
pub enum SegmentSource {
    /// A finished file in the cache. `immutable` selects the cache headers:
    /// permanent caches may be cached forever, sliding-window files may not.
    File { path: PathBuf, immutable: bool },
    /// A live tee of an encode still in progress.
    Stream(ByteStream),
}

impl std::fmt::Debug for SegmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentSource::File { path, immutable } => f
                .debug_struct("File")
                .field("path", path)
                .field("immutable", immutable)
                .finish(),
            SegmentSource::Stream(_) => f.debug_tuple("Stream").field(&"..").finish(),
        }
    }
}

/// One delivery strategy. All requests for playlists and segments go through
/// exactly one implementation, chosen at startup.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Produce the HLS manifest for an asset, with all segment references in
    /// public-route form.
    async fn playlist(&self, asset_id: &str) -> Result<String>;

    /// Produce the bytes of one segment.
    async fn segment(&self, asset_id: &str, name: &str) -> Result<SegmentSource>;

    /// Stop accepting work and release provider-owned resources. Encoder
    /// processes themselves are terminated by the supervisor.
    async fn shutdown(&self);
}

/// Construct the configured provider.
pub fn build_provider(
    config: &Config,
    client: Arc<PlexClient>,
    supervisor: Arc<Supervisor>,
) -> Arc<dyn StreamProvider> {
    match config.streaming.provider {
        ProviderKind::Live => {
            let provider = live::LiveStreamProvider::new(config, client, supervisor);
            live::start_sweep_task(provider.clone(), config.streaming.session_ttl);
            Arc::new(provider)
        }
        ProviderKind::Vod => Arc::new(vod::VodCacheProvider::new(config, client, supervisor)),
        ProviderKind::Jit => Arc::new(jit::JitProvider::new(config, client, supervisor)),
        ProviderKind::Hybrid => {
            let vod = Arc::new(vod::VodCacheProvider::new(
                config,
                Arc::clone(&client),
                supervisor,
            ));
            Arc::new(hybrid::HybridProvider::new(config, client, vod))
        }
    }
}
