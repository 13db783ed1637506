//! End-to-end tests for the full VOD cache provider over HTTP.

mod common;

use common::TestHarness;
use plexrelay::config::ProviderKind;

#[tokio::test]
async fn vod_playlist_builds_once_and_serves_rewritten_manifest() {
    let h = TestHarness::new().await;
    h.set_extinf(&["4.000", "4.000", "2.000"]);
    h.mount_metadata("42", 10_000).await;
    let addr = h.spawn_server(&h.config(ProviderKind::Vod)).await;

    let resp = reqwest::get(format!("http://{addr}/stream/movies/42/index.m3u8"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "application/vnd.apple.mpegurl"
    );
    assert_eq!(
        resp.headers()
            .get("cache-control")
            .unwrap()
            .to_str()
            .unwrap(),
        "no-store"
    );

    let manifest = resp.text().await.unwrap();
    let extinf: Vec<&str> = manifest
        .lines()
        .filter(|l| l.starts_with("#EXTINF:"))
        .collect();
    assert_eq!(extinf, vec!["#EXTINF:4.000,", "#EXTINF:4.000,", "#EXTINF:2.000,"]);
    for index in 0..3 {
        assert!(
            manifest.contains(&format!("/stream/movies/42/segment_0000{index}.ts")),
            "missing segment {index} in {manifest}"
        );
    }
    assert!(manifest.trim_end().ends_with("#EXT-X-ENDLIST"));
    assert_eq!(h.spawn_count(), 1);

    // idempotent: the cache is already built, so no new encoder run
    let resp = reqwest::get(format!("http://{addr}/stream/movies/42/index.m3u8"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(h.spawn_count(), 1);
}

#[tokio::test]
async fn vod_segments_are_plain_cached_reads() {
    let h = TestHarness::new().await;
    h.set_extinf(&["4.000", "4.000", "2.000"]);
    h.mount_metadata("42", 10_000).await;
    let addr = h.spawn_server(&h.config(ProviderKind::Vod)).await;

    // build via the playlist, then read a segment
    reqwest::get(format!("http://{addr}/stream/movies/42/index.m3u8"))
        .await
        .unwrap();

    let resp = reqwest::get(format!("http://{addr}/stream/movies/42/segment_00000.ts"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "video/mp2t"
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"ts-data-0");

    // a segment the build never produced is absent, not built on demand
    let resp = reqwest::get(format!("http://{addr}/stream/movies/42/segment_00099.ts"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.json::<serde_json::Value>().await.unwrap()["error"],
        "Segment not found"
    );
    assert_eq!(h.spawn_count(), 1);
}

#[tokio::test]
async fn malformed_segment_names_are_rejected_without_touching_the_cache() {
    let h = TestHarness::new().await;
    h.mount_metadata("42", 10_000).await;
    let addr = h.spawn_server(&h.config(ProviderKind::Vod)).await;

    for name in ["bogus.ts", "segment_1.ts", "..%2F..%2Fetc%2Fpasswd"] {
        let resp = reqwest::get(format!("http://{addr}/stream/movies/42/{name}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "accepted {name}");
        assert_eq!(
            resp.json::<serde_json::Value>().await.unwrap()["error"],
            "Invalid segment name"
        );
    }
    assert_eq!(h.spawn_count(), 0);
}

#[tokio::test]
async fn concurrent_playlist_requests_share_one_build() {
    let h = TestHarness::new().await;
    h.mount_metadata("7", 12_000).await;
    // hold the build open so every request lands while it is in flight
    h.set_delay("1");
    let addr = h.spawn_server(&h.config(ProviderKind::Vod)).await;

    let url = format!("http://{addr}/stream/movies/7/index.m3u8");
    let requests: Vec<_> = (0..4)
        .map(|_| {
            let url = url.clone();
            tokio::spawn(async move { reqwest::get(url).await.unwrap().status() })
        })
        .collect();

    for request in requests {
        assert_eq!(request.await.unwrap(), 200);
    }
    assert_eq!(h.spawn_count(), 1);
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let h = TestHarness::new().await;
    let addr = h.spawn_server(&h.config(ProviderKind::Vod)).await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.json::<serde_json::Value>().await.unwrap()["healthy"],
        true
    );
}

#[tokio::test]
async fn upstream_metadata_failure_surfaces_as_the_request_failure() {
    let h = TestHarness::new().await;
    // no metadata mounted: the library 404s the lookup
    let addr = h.spawn_server(&h.config(ProviderKind::Vod)).await;

    let resp = reqwest::get(format!("http://{addr}/stream/movies/404/index.m3u8"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    // the failed build settled and was cleared; nothing is left running
    assert_eq!(h.spawn_count(), 0);
}
