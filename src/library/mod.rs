//! Remote media-library integration.
//!
//! Providers use this client to resolve an asset's playable source URL and
//! duration metadata; the image routes use it to proxy artwork. The HTTP
//! layer never talks to the library directly for streaming.

mod client;
mod types;

pub use client::PlexClient;
pub use types::{Media, MediaContainer, MediaContainerResponse, Metadata, Part};
