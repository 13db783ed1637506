//! Environment-based configuration.
//!
//! All tunables come from environment variables, resolved once at startup by
//! [`load_from_env`]. Only the library base URL and token are required;
//! everything else falls back to a default. Numeric variables that fail to
//! parse fall back silently, matching the usual "best effort" env semantics.

mod types;

pub use types::{
    Config, EncoderConfig, HybridConfig, LibraryConfig, ProviderKind, ServerConfig,
    StreamingConfig,
};

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Load the full configuration from the process environment.
///
/// Fails only on missing required variables (`PLEX_BASE_URL`, `PLEX_TOKEN`)
/// or an unknown `STREAM_PROVIDER` value.
pub fn load_from_env() -> Result<Config> {
    let defaults_server = ServerConfig::default();
    let defaults_encoder = EncoderConfig::default();
    let defaults_streaming = StreamingConfig::default();
    let defaults_hybrid = HybridConfig::default();

    let provider = match var("STREAM_PROVIDER") {
        Some(raw) => raw.parse::<ProviderKind>().map_err(Error::Config)?,
        None => defaults_streaming.provider,
    };

    Ok(Config {
        server: ServerConfig {
            host: var("HOST").unwrap_or(defaults_server.host),
            port: parse_number("PORT", defaults_server.port),
        },
        library: LibraryConfig {
            base_url: required("PLEX_BASE_URL")?.trim_end_matches('/').to_string(),
            token: required("PLEX_TOKEN")?,
        },
        encoder: EncoderConfig {
            ffmpeg_path: var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults_encoder.ffmpeg_path),
            log_level: var("FFMPEG_LOG_LEVEL").unwrap_or(defaults_encoder.log_level),
            preset: var("FFMPEG_PRESET"),
            crf: var("FFMPEG_CRF").and_then(|v| v.parse().ok()),
            max_delay: parse_number("FFMPEG_MAX_DELAY", defaults_encoder.max_delay),
            probe_size: parse_number("FFMPEG_PROBESIZE", defaults_encoder.probe_size),
            analyze_duration: parse_number(
                "FFMPEG_ANALYZE_DURATION",
                defaults_encoder.analyze_duration,
            ),
            video_codec: var("VIDEO_CODEC").unwrap_or(defaults_encoder.video_codec),
            video_profile: var("VIDEO_PROFILE"),
            video_bitrate: var("VIDEO_BITRATE").unwrap_or(defaults_encoder.video_bitrate),
            audio_codec: var("AUDIO_CODEC").unwrap_or(defaults_encoder.audio_codec),
            audio_bitrate: var("AUDIO_BITRATE").unwrap_or(defaults_encoder.audio_bitrate),
            grace: millis("PROCESS_GRACE_MS", defaults_encoder.grace),
        },
        streaming: StreamingConfig {
            provider,
            cache_dir: var("STREAM_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults_streaming.cache_dir),
            segment_duration: parse_number(
                "HLS_SEGMENT_DURATION",
                defaults_streaming.segment_duration,
            )
            .max(1),
            window_segments: parse_number("HLS_WINDOW_SEGMENTS", defaults_streaming.window_segments),
            session_ttl: secs("SESSION_TTL_SECS", defaults_streaming.session_ttl),
            playlist_wait: millis("PLAYLIST_WAIT_TIMEOUT_MS", defaults_streaming.playlist_wait),
            playlist_poll: millis("PLAYLIST_WAIT_POLL_MS", defaults_streaming.playlist_poll),
            fallback_duration_secs: parse_number(
                "FALLBACK_DURATION_SECS",
                defaults_streaming.fallback_duration_secs,
            ),
        },
        hybrid: HybridConfig {
            min_ready_segments: parse_number(
                "HYBRID_MIN_READY_SEGMENTS",
                defaults_hybrid.min_ready_segments,
            ),
            wait_timeout: millis(
                "HYBRID_SEGMENT_WAIT_TIMEOUT_MS",
                defaults_hybrid.wait_timeout,
            ),
            poll_interval: millis(
                "HYBRID_SEGMENT_POLL_INTERVAL_MS",
                defaults_hybrid.poll_interval,
            ),
            read_timeout: millis(
                "HYBRID_SEGMENT_READ_TIMEOUT_MS",
                defaults_hybrid.read_timeout,
            ),
            read_poll: millis("HYBRID_SEGMENT_READ_POLL_MS", defaults_hybrid.read_poll),
        },
    })
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String> {
    var(key).ok_or_else(|| Error::config(format!("missing required environment variable {}", key)))
}

fn parse_number<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

fn millis(key: &str, fallback: Duration) -> Duration {
    var(key)
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(fallback)
}

fn secs(key: &str, fallback: Duration) -> Duration {
    var(key)
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}
