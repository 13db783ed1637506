//! Encoder argument-building policy.
//!
//! Three invocation shapes share one input/codec section:
//! - `live_args`: realtime HLS with a sliding segment window
//! - `vod_args`: one full-length HLS encode into a permanent cache
//! - `segment_args`: one seeked, fixed-duration segment to stdout

use std::path::Path;

use crate::config::EncoderConfig;

const COPY: &str = "copy";

/// Arguments for a continuously-appending live HLS encode. Old segments are
/// deleted as new ones land, so the playlist never grows past `window`.
pub fn live_args(
    enc: &EncoderConfig,
    source_url: &str,
    segment_duration: u32,
    window: u32,
    segment_pattern: &Path,
    playlist: &Path,
) -> Vec<String> {
    let mut args = input_section(enc, source_url, true, false, None);
    args.extend(codec_section(enc, false));
    push(
        &mut args,
        [
            "-f",
            "hls",
            "-hls_time",
            &segment_duration.to_string(),
            "-hls_list_size",
            &window.to_string(),
            "-hls_flags",
            "delete_segments+append_list+omit_endlist+program_date_time",
            "-hls_segment_type",
            "mpegts",
            "-hls_playlist_type",
            "event",
            "-hls_segment_filename",
            &segment_pattern.to_string_lossy(),
            &playlist.to_string_lossy(),
        ],
    );
    args
}

/// Arguments for a whole-asset VOD HLS encode: fixed segment length,
/// independent segments, end-of-list marker. `list_size` 0 keeps every
/// segment in the playlist.
pub fn vod_args(
    enc: &EncoderConfig,
    source_url: &str,
    segment_duration: u32,
    list_size: u32,
    segment_pattern: &Path,
    playlist: &Path,
) -> Vec<String> {
    let mut args = input_section(enc, source_url, false, true, None);
    args.extend(codec_section(enc, false));
    push(
        &mut args,
        [
            "-f",
            "hls",
            "-hls_time",
            &segment_duration.to_string(),
            "-hls_list_size",
            &list_size.to_string(),
            "-hls_playlist_type",
            "vod",
            "-hls_segment_type",
            "mpegts",
            "-hls_flags",
            "independent_segments",
            "-hls_segment_filename",
            &segment_pattern.to_string_lossy(),
            &playlist.to_string_lossy(),
        ],
    );
    args
}

/// Arguments for a single just-in-time segment: seek the source to the
/// segment's offset and emit exactly one segment length of MPEG-TS on stdout.
pub fn segment_args(
    enc: &EncoderConfig,
    source_url: &str,
    start_seconds: f64,
    segment_duration: u32,
) -> Vec<String> {
    let mut args = input_section(enc, source_url, false, false, Some(start_seconds));
    args.extend(codec_section(enc, true));
    push(
        &mut args,
        [
            "-t",
            &segment_duration.to_string(),
            "-f",
            "mpegts",
            "-muxdelay",
            "0",
            "-muxpreload",
            "0",
            "pipe:1",
        ],
    );
    args
}

fn input_section(
    enc: &EncoderConfig,
    source_url: &str,
    realtime: bool,
    overwrite: bool,
    seek_seconds: Option<f64>,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        enc.log_level.clone(),
    ];
    if overwrite {
        args.push("-y".to_string());
    }
    if realtime {
        args.push("-re".to_string());
    }
    if let Some(seconds) = seek_seconds {
        push(&mut args, ["-ss", &format!("{seconds:.3}")]);
    }
    push(
        &mut args,
        [
            "-i",
            source_url,
            "-max_delay",
            &enc.max_delay.to_string(),
            "-probesize",
            &enc.probe_size.to_string(),
            "-analyzeduration",
            &enc.analyze_duration.to_string(),
            // first video and audio stream only; subtitles and data dropped
            "-map",
            "0:v:0",
            "-map",
            "0:a:0?",
            "-map",
            "-0:s",
            "-map",
            "-0:d",
        ],
    );
    args
}

fn codec_section(enc: &EncoderConfig, jit_tuning: bool) -> Vec<String> {
    let mut args = Vec::new();

    push(&mut args, ["-c:v", &enc.video_codec]);
    if enc.video_codec != COPY {
        if jit_tuning {
            // segments are decoded independently by the player; pin a
            // predictable profile and keyframe cadence
            push(
                &mut args,
                [
                    "-profile:v",
                    "high",
                    "-level:v",
                    "4.1",
                    "-r",
                    "30",
                    "-g",
                    "120",
                    "-keyint_min",
                    "120",
                ],
            );
        } else if let Some(profile) = &enc.video_profile {
            push(&mut args, ["-profile:v", profile]);
        }
        push(&mut args, ["-b:v", &enc.video_bitrate]);
        if let Some(preset) = &enc.preset {
            push(&mut args, ["-preset", preset]);
        }
        if let Some(crf) = enc.crf {
            push(&mut args, ["-crf", &crf.to_string()]);
        }
    }

    push(&mut args, ["-c:a", &enc.audio_codec]);
    if enc.audio_codec != COPY {
        if jit_tuning {
            push(&mut args, ["-ac", "2", "-ar", "48000"]);
        }
        push(&mut args, ["-b:a", &enc.audio_bitrate]);
    }

    args
}

fn push<'a>(args: &mut Vec<String>, items: impl IntoIterator<Item = &'a str>) {
    args.extend(items.into_iter().map(str::to_string));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn enc() -> EncoderConfig {
        EncoderConfig::default()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn live_args_run_realtime_with_a_sliding_window() {
        let args = live_args(
            &enc(),
            "http://src/stream",
            4,
            6,
            &PathBuf::from("/cache/live/42-0/segment_%05d.ts"),
            &PathBuf::from("/cache/live/42-0/index.m3u8"),
        );
        assert!(args.contains(&"-re".to_string()));
        assert!(has_pair(&args, "-hls_list_size", "6"));
        assert!(has_pair(
            &args,
            "-hls_flags",
            "delete_segments+append_list+omit_endlist+program_date_time"
        ));
        assert!(has_pair(&args, "-hls_playlist_type", "event"));
        assert_eq!(args.last().unwrap(), "/cache/live/42-0/index.m3u8");
    }

    #[test]
    fn vod_args_overwrite_and_mark_segments_independent() {
        let args = vod_args(
            &enc(),
            "http://src/stream",
            4,
            0,
            &PathBuf::from("/cache/42/segment_%05d.ts"),
            &PathBuf::from("/cache/42/index.m3u8"),
        );
        assert!(args.contains(&"-y".to_string()));
        assert!(!args.contains(&"-re".to_string()));
        assert!(has_pair(&args, "-hls_list_size", "0"));
        assert!(has_pair(&args, "-hls_playlist_type", "vod"));
        assert!(has_pair(&args, "-hls_flags", "independent_segments"));

        let args = vod_args(
            &enc(),
            "http://src/stream",
            4,
            20,
            &PathBuf::from("/cache/42/segment_%05d.ts"),
            &PathBuf::from("/cache/42/index.m3u8"),
        );
        assert!(has_pair(&args, "-hls_list_size", "20"));
    }

    #[test]
    fn segment_args_seek_with_millisecond_precision_and_pipe_out() {
        let args = segment_args(&enc(), "http://src/stream", 48.0, 4);
        assert!(has_pair(&args, "-ss", "48.000"));
        assert!(has_pair(&args, "-t", "4"));
        assert_eq!(args.last().unwrap(), "pipe:1");
        // seek must land before the input
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
    }

    #[test]
    fn copy_codecs_skip_all_tuning() {
        let args = segment_args(&enc(), "http://src/stream", 0.0, 4);
        assert!(has_pair(&args, "-c:v", "copy"));
        assert!(has_pair(&args, "-c:a", "copy"));
        assert!(!args.contains(&"-crf".to_string()));
        assert!(!args.contains(&"-preset".to_string()));
        assert!(!args.contains(&"-b:v".to_string()));
        assert!(!args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn transcoding_codecs_carry_bitrate_and_tuning() {
        let mut settings = enc();
        settings.video_codec = "libx264".to_string();
        settings.audio_codec = "aac".to_string();
        settings.preset = Some("veryfast".to_string());
        settings.crf = Some(23);

        let args = vod_args(
            &settings,
            "http://src/stream",
            4,
            0,
            &PathBuf::from("/cache/42/segment_%05d.ts"),
            &PathBuf::from("/cache/42/index.m3u8"),
        );
        assert!(has_pair(&args, "-b:v", "3500k"));
        assert!(has_pair(&args, "-b:a", "128k"));
        assert!(has_pair(&args, "-preset", "veryfast"));
        assert!(has_pair(&args, "-crf", "23"));

        // JIT shape pins its own video profile
        let args = segment_args(&settings, "http://src/stream", 8.0, 4);
        assert!(has_pair(&args, "-profile:v", "high"));
        assert!(has_pair(&args, "-ac", "2"));
    }
}
