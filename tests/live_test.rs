//! Live session lifecycle: manifest rewriting, TTL eviction, replacement.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::TestHarness;
use plexrelay::config::ProviderKind;
use plexrelay::library::PlexClient;
use plexrelay::streaming::live::LiveStreamProvider;
use plexrelay::streaming::{SegmentSource, StreamProvider};
use plexrelay::transcode::Supervisor;

fn live_for(
    h: &TestHarness,
    config: &plexrelay::config::Config,
) -> (LiveStreamProvider, Arc<Supervisor>) {
    let client = Arc::new(PlexClient::new(&config.library));
    let supervisor = Arc::new(Supervisor::new(
        h.ffmpeg_path(),
        Duration::from_millis(300),
    ));
    (
        LiveStreamProvider::new(config, client, Arc::clone(&supervisor)),
        supervisor,
    )
}

#[tokio::test]
async fn playlist_starts_a_session_and_rewrites_the_manifest() {
    let h = TestHarness::new().await;
    h.mount_metadata("42", 600_000).await;
    let config = h.config(ProviderKind::Live);
    let (provider, supervisor) = live_for(&h, &config);

    let manifest = provider.playlist("42").await.unwrap();
    assert!(manifest.contains("/stream/movies/42/segment_00000.ts"));
    // the window is still appending; no end-of-list marker
    assert!(!manifest.contains("#EXT-X-ENDLIST"));

    assert_eq!(provider.session_count(), 1);
    assert_eq!(supervisor.live_count(), 1);

    // a segment read comes straight from the session window
    let source = provider.segment("42", "segment_00000.ts").await.unwrap();
    match source {
        SegmentSource::File { path, immutable } => {
            assert!(!immutable);
            assert_eq!(std::fs::read(path).unwrap(), b"ts-data-0");
        }
        SegmentSource::Stream(_) => panic!("live segments are files in the window"),
    }

    provider.shutdown().await;
    supervisor.shutdown().await;
}

#[tokio::test]
async fn concurrent_playlist_requests_attach_to_one_session() {
    let h = TestHarness::new().await;
    h.mount_metadata("42", 600_000).await;
    let config = h.config(ProviderKind::Live);
    let (provider, supervisor) = live_for(&h, &config);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let provider = provider.clone();
            tokio::spawn(async move { provider.playlist("42").await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    assert_eq!(provider.session_count(), 1);
    assert_eq!(h.spawn_count(), 1);

    provider.shutdown().await;
    supervisor.shutdown().await;
}

#[tokio::test]
async fn idle_sessions_are_evicted_and_their_directories_removed() {
    let h = TestHarness::new().await;
    h.mount_metadata("42", 600_000).await;
    let mut config = h.config(ProviderKind::Live);
    config.streaming.session_ttl = Duration::from_millis(500);
    let (provider, supervisor) = live_for(&h, &config);

    provider.playlist("42").await.unwrap();
    assert_eq!(provider.session_count(), 1);
    let live_root = h.cache.path().join("live");
    assert_eq!(std::fs::read_dir(&live_root).unwrap().count(), 1);

    // untouched for longer than the TTL
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(provider.evict_expired().await, 1);

    assert_eq!(provider.session_count(), 0);
    assert_eq!(std::fs::read_dir(&live_root).unwrap().count(), 0);
    assert_eq!(supervisor.live_count(), 0);

    provider.shutdown().await;
    supervisor.shutdown().await;
}

#[tokio::test]
async fn reads_keep_a_session_alive_past_the_ttl() {
    let h = TestHarness::new().await;
    h.mount_metadata("42", 600_000).await;
    let mut config = h.config(ProviderKind::Live);
    config.streaming.session_ttl = Duration::from_millis(600);
    let (provider, supervisor) = live_for(&h, &config);

    provider.playlist("42").await.unwrap();
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        // every read refreshes last-access
        provider.playlist("42").await.unwrap();
    }
    assert_eq!(provider.evict_expired().await, 0);
    assert_eq!(provider.session_count(), 1);
    assert_eq!(h.spawn_count(), 1);

    provider.shutdown().await;
    supervisor.shutdown().await;
}

#[tokio::test]
async fn a_request_after_eviction_starts_a_fresh_session() {
    let h = TestHarness::new().await;
    h.mount_metadata("42", 600_000).await;
    let mut config = h.config(ProviderKind::Live);
    config.streaming.session_ttl = Duration::from_millis(400);
    let (provider, supervisor) = live_for(&h, &config);

    provider.playlist("42").await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(provider.evict_expired().await, 1);

    // the next playlist request replaces the evicted session
    provider.playlist("42").await.unwrap();
    assert_eq!(provider.session_count(), 1);
    assert_eq!(h.spawn_count(), 2);

    provider.shutdown().await;
    supervisor.shutdown().await;
}

#[tokio::test]
async fn segment_reads_without_a_session_are_not_found() {
    let h = TestHarness::new().await;
    h.mount_metadata("42", 600_000).await;
    let config = h.config(ProviderKind::Live);
    let (provider, _supervisor) = live_for(&h, &config);

    let err = provider.segment("42", "segment_00000.ts").await.unwrap_err();
    assert!(matches!(
        err.root(),
        plexrelay::error::Error::NotFound
    ));
}
