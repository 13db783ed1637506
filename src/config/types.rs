use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub encoder: EncoderConfig,
    pub streaming: StreamingConfig,
    pub hybrid: HybridConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4000
}

/// Remote media-library access. Both fields are required; startup fails
/// without them.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Base URL of the library server, without a trailing slash.
    pub base_url: String,
    /// Access token appended to every library request.
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub ffmpeg_path: PathBuf,
    pub log_level: String,
    pub preset: Option<String>,
    pub crf: Option<u32>,
    pub max_delay: u64,
    pub probe_size: u64,
    pub analyze_duration: u64,
    pub video_codec: String,
    pub video_profile: Option<String>,
    pub video_bitrate: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// How long a process gets to exit after a graceful stop request before
    /// it is force-killed.
    pub grace: Duration,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            log_level: "error".to_string(),
            preset: None,
            crf: None,
            max_delay: 50_000,
            probe_size: 20_000_000,
            analyze_duration: 20_000_000,
            video_codec: "copy".to_string(),
            video_profile: None,
            video_bitrate: "3500k".to_string(),
            audio_codec: "copy".to_string(),
            audio_bitrate: "128k".to_string(),
            grace: Duration::from_millis(2000),
        }
    }
}

/// Which delivery strategy serves all stream requests. Exactly one is active
/// per process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProviderKind {
    #[default]
    Live,
    Vod,
    Jit,
    Hybrid,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "vod" => Ok(Self::Vod),
            "jit" => Ok(Self::Jit),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(format!("unknown stream provider: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamingConfig {
    pub provider: ProviderKind,
    pub cache_dir: PathBuf,
    /// Target segment length in seconds.
    pub segment_duration: u32,
    /// Sliding window size for the live provider; 0 means "unbounded
    /// playlist" for the VOD muxer.
    pub window_segments: u32,
    /// Idle TTL after which a live session is evicted.
    pub session_ttl: Duration,
    /// How long to wait for the live manifest to appear on disk.
    pub playlist_wait: Duration,
    pub playlist_poll: Duration,
    /// Asset duration assumed when library metadata has none.
    pub fallback_duration_secs: f64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            cache_dir: PathBuf::from("./.streams"),
            segment_duration: 4,
            window_segments: 0,
            session_ttl: Duration::from_secs(120),
            playlist_wait: Duration::from_millis(15_000),
            playlist_poll: Duration::from_millis(200),
            fallback_duration_secs: 600.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Segments that must exist before a playlist is handed out.
    pub min_ready_segments: usize,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    /// Deadline for one specific segment file to appear.
    pub read_timeout: Duration,
    pub read_poll: Duration,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            min_ready_segments: 10,
            wait_timeout: Duration::from_millis(15_000),
            poll_interval: Duration::from_millis(500),
            read_timeout: Duration::from_millis(10_000),
            read_poll: Duration::from_millis(200),
        }
    }
}
