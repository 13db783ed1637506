//! Shared harness for integration tests.
//!
//! Provides a mock media-library server, a stand-in encoder script that
//! produces deterministic HLS artifacts, and helpers to assemble providers or
//! a full HTTP server against them.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use plexrelay::config::{
    Config, EncoderConfig, HybridConfig, LibraryConfig, ProviderKind, ServerConfig,
    StreamingConfig,
};
use plexrelay::library::PlexClient;
use plexrelay::server::{create_router, AppContext};
use plexrelay::streaming::{build_provider, StreamProvider};
use plexrelay::transcode::Supervisor;

/// Stand-in encoder. Understands the three invocation shapes the service
/// uses: HLS-to-files (VOD), HLS-to-files with a sliding window (live, stays
/// running until terminated), and a single segment to stdout (JIT). Segment
/// durations come from an `extinf` file next to the script; every invocation
/// is appended to `spawn.log`.
const FAKE_FFMPEG: &str = r##"#!/bin/sh
here=$(cd "$(dirname "$0")" && pwd)
printf '%s\n' "$*" >> "$here/spawn.log"

if [ -f "$here/delay" ]; then
  sleep "$(cat "$here/delay")"
fi

mode=files
live=0
segpattern=""
playlist=""
prev=""
for a in "$@"; do
  [ "$prev" = "-hls_segment_filename" ] && segpattern="$a"
  case "$a" in
    pipe:1) mode=pipe ;;
    *omit_endlist*) live=1 ;;
    *.m3u8) playlist="$a" ;;
  esac
  prev="$a"
done

if [ "$mode" = "pipe" ]; then
  printf 'FAKETS-%s' "$$"
  exit 0
fi

[ -n "$segpattern" ] || exit 1
[ -n "$playlist" ] || exit 1
outdir=$(dirname "$segpattern")

if [ -f "$here/extinf" ]; then
  durations=$(cat "$here/extinf")
else
  durations="4.000 4.000 4.000"
fi

{
  echo "#EXTM3U"
  echo "#EXT-X-VERSION:3"
  echo "#EXT-X-TARGETDURATION:4"
  echo "#EXT-X-MEDIA-SEQUENCE:0"
} > "$playlist.part"

i=0
for d in $durations; do
  name=$(printf 'segment_%05d.ts' "$i")
  printf 'ts-data-%d' "$i" > "$outdir/$name"
  echo "#EXTINF:$d," >> "$playlist.part"
  echo "$name" >> "$playlist.part"
  i=$((i+1))
done

if [ "$live" = "0" ]; then
  echo "#EXT-X-ENDLIST" >> "$playlist.part"
fi
mv "$playlist.part" "$playlist"

if [ "$live" = "1" ]; then
  trap 'exit 0' TERM INT
  while :; do sleep 1; done
fi
exit 0
"##;

pub struct TestHarness {
    pub cache: TempDir,
    pub library: MockServer,
    tools: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        let library = MockServer::start().await;
        let cache = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();

        let script = tools.path().join("ffmpeg");
        std::fs::write(&script, FAKE_FFMPEG).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        Self {
            cache,
            library,
            tools,
        }
    }

    pub fn ffmpeg_path(&self) -> PathBuf {
        self.tools.path().join("ffmpeg")
    }

    /// How many times the encoder has been invoked.
    pub fn spawn_count(&self) -> usize {
        std::fs::read_to_string(self.tools.path().join("spawn.log"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    /// Set the segment durations the fake encoder will emit.
    pub fn set_extinf(&self, values: &[&str]) {
        std::fs::write(self.tools.path().join("extinf"), values.join(" ")).unwrap();
    }

    /// Make every fake encode take at least this long, to hold builds open
    /// while concurrent requests pile up.
    pub fn set_delay(&self, seconds: &str) {
        std::fs::write(self.tools.path().join("delay"), seconds).unwrap();
    }

    pub fn config(&self, provider: ProviderKind) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            library: LibraryConfig {
                base_url: self.library.uri(),
                token: "test-token".to_string(),
            },
            encoder: EncoderConfig {
                ffmpeg_path: self.ffmpeg_path(),
                grace: Duration::from_millis(300),
                ..EncoderConfig::default()
            },
            streaming: StreamingConfig {
                provider,
                cache_dir: self.cache.path().to_path_buf(),
                segment_duration: 4,
                playlist_wait: Duration::from_secs(5),
                playlist_poll: Duration::from_millis(50),
                ..StreamingConfig::default()
            },
            hybrid: HybridConfig::default(),
        }
    }

    /// Mount the library metadata endpoint for one asset.
    pub async fn mount_metadata(&self, asset_id: &str, duration_ms: u64) {
        let body = serde_json::json!({
            "MediaContainer": {
                "Metadata": [{
                    "title": "Test Movie",
                    "duration": duration_ms,
                    "thumb": format!("/library/metadata/{asset_id}/thumb"),
                    "art": format!("/library/metadata/{asset_id}/art"),
                    "Media": [{
                        "Part": [{"key": format!("/library/parts/{asset_id}/file.mkv")}]
                    }]
                }]
            }
        });
        Mock::given(method("GET"))
            .and(path(format!("/library/metadata/{asset_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.library)
            .await;
    }

    /// Build the configured provider plus its collaborators.
    pub fn build(&self, config: &Config) -> (Arc<dyn StreamProvider>, Arc<Supervisor>, Arc<PlexClient>) {
        let client = Arc::new(PlexClient::new(&config.library));
        let supervisor = Arc::new(Supervisor::new(
            config.encoder.ffmpeg_path.clone(),
            config.encoder.grace,
        ));
        let provider = build_provider(config, Arc::clone(&client), Arc::clone(&supervisor));
        (provider, supervisor, client)
    }

    /// Spin up the full HTTP server on an ephemeral port.
    pub async fn spawn_server(&self, config: &Config) -> SocketAddr {
        let (provider, _supervisor, client) = self.build(config);
        let ctx = AppContext {
            provider,
            library: client,
            healthy: Arc::new(AtomicBool::new(true)),
        };
        let app = create_router(ctx);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}
