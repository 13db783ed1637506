//! Response types for the media-library metadata API.
//!
//! Only the fields this service consumes are modeled; everything else in the
//! library's payloads is ignored.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MediaContainerResponse {
    #[serde(rename = "MediaContainer")]
    pub media_container: MediaContainer,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaContainer {
    #[serde(rename = "Metadata", default)]
    pub metadata: Vec<Metadata>,
}

/// One library item. Durations are reported in milliseconds and may appear on
/// the item, its media, or the media's part depending on library version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default, alias = "Duration")]
    pub duration: Option<f64>,

    /// Poster artwork path, relative to the library base URL.
    #[serde(default)]
    pub thumb: Option<String>,

    /// Background artwork path, relative to the library base URL.
    #[serde(default)]
    pub art: Option<String>,

    #[serde(rename = "Media", default)]
    pub media: Vec<Media>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Media {
    #[serde(default, alias = "Duration")]
    pub duration: Option<f64>,

    #[serde(rename = "Part", default)]
    pub part: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Part {
    #[serde(default, alias = "Duration")]
    pub duration: Option<f64>,

    /// Playback key, resolved against the library base URL.
    #[serde(default)]
    pub key: Option<String>,

    /// Direct file path, used when no key is present.
    #[serde(default)]
    pub file: Option<String>,
}

impl Metadata {
    /// Total duration in seconds, taken from the first place the library
    /// reports it; `fallback` when absent or not a finite positive number.
    pub fn duration_seconds(&self, fallback: f64) -> f64 {
        let millis = self
            .duration
            .or_else(|| self.media.first().and_then(|m| m.duration))
            .or_else(|| {
                self.media
                    .first()
                    .and_then(|m| m.part.first())
                    .and_then(|p| p.duration)
            });

        match millis {
            Some(ms) if ms.is_finite() && ms > 0.0 => ms / 1000.0,
            _ => fallback,
        }
    }

    /// Artwork path for an image request: `thumb` for poster-style images,
    /// `art` for background-style ones.
    pub fn artwork_path(&self, image: &str) -> Option<&str> {
        if image.contains("poster") {
            self.thumb.as_deref()
        } else if image.contains("background") {
            self.art.as_deref()
        } else {
            None
        }
    }

    /// The first part of the first media entry, where the playable stream
    /// lives.
    pub fn primary_part(&self) -> Option<&Part> {
        self.media.first().and_then(|m| m.part.first())
    }
}
