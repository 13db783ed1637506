//! HTTP client for the remote media library.
//!
//! Every request carries the configured access token as a query parameter.
//! Lookups are not retried; a failed lookup surfaces as the request's failure.

use std::time::Duration;

use reqwest::Url;

use crate::config::LibraryConfig;
use crate::error::{Error, Result};
use crate::library::types::{MediaContainerResponse, Metadata};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const TOKEN_PARAM: &str = "X-Plex-Token";

/// Client for library metadata, stream-URL resolution, and artwork.
pub struct PlexClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl PlexClient {
    pub fn new(config: &LibraryConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    /// Fetch the metadata record for one library item.
    pub async fn get_metadata(&self, asset_id: &str) -> Result<Metadata> {
        let url = format!("{}/library/metadata/{}", self.base_url, asset_id);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[(TOKEN_PARAM, self.token.as_str())])
            .send()
            .await
            .map_err(|e| Error::upstream(format!("metadata request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::upstream(format!("metadata request rejected: {e}")))?;

        let body: MediaContainerResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("malformed metadata payload: {e}")))?;

        body.media_container
            .metadata
            .into_iter()
            .next()
            .ok_or_else(|| Error::upstream(format!("asset {asset_id} not found")))
    }

    /// Resolve the playable source URL for an item's primary media part.
    pub async fn primary_stream_url(&self, asset_id: &str) -> Result<String> {
        let metadata = self.get_metadata(asset_id).await?;
        let part = metadata
            .primary_part()
            .ok_or_else(|| Error::upstream(format!("asset {asset_id} has no media part")))?;

        let reference = part
            .key
            .as_deref()
            .or(part.file.as_deref())
            .ok_or_else(|| Error::upstream(format!("asset {asset_id} part has no playback URL")))?;

        self.absolute_url(reference)
    }

    /// Stream an artwork asset (poster/background) from the library.
    pub async fn fetch_artwork(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.absolute_url(path)?;
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("artwork request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::upstream(format!("artwork request rejected: {e}")))
    }

    /// Turn a library-relative reference into an absolute URL carrying the
    /// access token. Absolute references keep their host; the token is only
    /// appended when missing.
    fn absolute_url(&self, reference: &str) -> Result<String> {
        let mut url = if reference.starts_with("http") {
            Url::parse(reference)
                .map_err(|e| Error::upstream(format!("invalid library URL {reference}: {e}")))?
        } else {
            let base = Url::parse(&self.base_url)
                .map_err(|e| Error::upstream(format!("invalid library base URL: {e}")))?;
            base.join(reference)
                .map_err(|e| Error::upstream(format!("invalid library path {reference}: {e}")))?
        };

        let has_token = url.query_pairs().any(|(k, _)| k == TOKEN_PARAM);
        if !has_token {
            url.query_pairs_mut().append_pair(TOKEN_PARAM, &self.token);
        }

        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PlexClient {
        PlexClient::new(&LibraryConfig {
            base_url: "http://plex.local:32400".to_string(),
            token: "secret".to_string(),
        })
    }

    #[test]
    fn relative_references_join_the_base_and_gain_the_token() {
        let url = client().absolute_url("/library/parts/7/file.mkv").unwrap();
        assert_eq!(
            url,
            "http://plex.local:32400/library/parts/7/file.mkv?X-Plex-Token=secret"
        );
    }

    #[test]
    fn absolute_references_keep_their_host() {
        let url = client()
            .absolute_url("http://other.host/stream.mkv")
            .unwrap();
        assert!(url.starts_with("http://other.host/stream.mkv"));
        assert!(url.contains("X-Plex-Token=secret"));
    }

    #[test]
    fn existing_token_is_not_duplicated() {
        let url = client()
            .absolute_url("http://other.host/stream.mkv?X-Plex-Token=abc")
            .unwrap();
        assert_eq!(url.matches("X-Plex-Token").count(), 1);
        assert!(url.contains("X-Plex-Token=abc"));
    }
}
