//! HLS manifest synthesis and rewriting.
//!
//! Two modes. Synthesis builds a complete VOD manifest from nothing but the
//! asset duration, so it can reference segments that do not exist yet (JIT
//! and hybrid delivery rely on this). Rewriting takes a manifest the encoder
//! wrote to disk and redirects its bare segment references to the public
//! stream route.

use std::fmt::Write;

use crate::streaming::paths::segment_file_name;

/// Public route prefix under which segments are served.
pub const STREAM_ROUTE_PREFIX: &str = "/stream/movies";

/// Public URL for one segment of an asset.
pub fn segment_route(asset_id: &str, name: &str) -> String {
    format!("{STREAM_ROUTE_PREFIX}/{asset_id}/{name}")
}

/// Build a full VOD manifest for `total_seconds` of content cut into
/// `segment_duration`-second pieces. The final entry is clamped to at least
/// 0.1 s so rounding never produces a zero or negative duration.
pub fn synthesize(asset_id: &str, total_seconds: f64, segment_duration: u32) -> String {
    let seg = f64::from(segment_duration.max(1));
    let target_duration = seg.ceil() as u64;
    let count = ((total_seconds / seg).ceil() as i64).max(1) as u64;

    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    out.push_str("#EXT-X-VERSION:3\n");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{target_duration}");
    out.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
    out.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");

    for index in 0..count {
        let remaining = total_seconds - seg * index as f64;
        let duration = if index == count - 1 {
            remaining.max(0.1)
        } else {
            seg
        };
        let _ = writeln!(
            out,
            "#EXTINF:{duration:.3},\n{}",
            segment_route(asset_id, &segment_file_name(index as u32))
        );
    }

    out.push_str("#EXT-X-ENDLIST\n");
    out
}

/// Rewrite an encoder-produced manifest so that every line holding a bare
/// `.ts` or `.key` file name points at the public segment route. Directives,
/// blank lines, and anything URL-shaped pass through untouched.
pub fn rewrite(asset_id: &str, raw: &str) -> String {
    raw.split('\n')
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return line.to_string();
            }
            if is_bare_media_reference(trimmed) {
                segment_route(asset_id, trimmed)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_bare_media_reference(line: &str) -> bool {
    let Some((_, extension)) = line.rsplit_once('.') else {
        return false;
    };
    if !extension.eq_ignore_ascii_case("ts") && !extension.eq_ignore_ascii_case("key") {
        return false;
    }
    line.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}
