// Remote catalog / streaming API client
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::model::{Quality, Song};

/// Wire shape of one catalog search entry, keyed by song id in the response map.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchEntry {
    title: String,
    artist: String,
    thumbnail_url: String,
    duration: u32,
}

/// Thin client over the remote catalog and streaming endpoints.
///
/// All methods are stateless; the underlying `reqwest::Client` pools
/// connections and is cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL the playback engine streams from; the audio bytes are consumed
    /// directly, never written locally.
    pub fn stream_url(&self, id: &str, quality: Quality) -> String {
        format!("{}/stream?id={}&quality={}", self.base_url, id, quality)
    }

    /// Start a download fetch for the given song. The caller owns the
    /// response body stream.
    pub async fn download(&self, id: &str, quality: Quality) -> Result<reqwest::Response> {
        let url = format!("{}/download?id={}&quality={}", self.base_url, id, quality);
        debug!(%id, %quality, "starting download fetch");
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        Ok(resp)
    }

    /// Search the remote catalog. The response is a JSON map of song id to
    /// entry; an unexpected payload shape is a `MalformedResponse`.
    ///
    /// Returned songs are not checked against the Content Store here;
    /// `is_downloaded` is always false and is the caller's concern.
    pub async fn search(&self, query: &str) -> Result<Vec<Song>> {
        let resp = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("query", query)])
            .send()
            .await?
            .error_for_status()?;

        let body = resp.text().await?;
        let entries: HashMap<String, SearchEntry> = serde_json::from_str(&body)
            .map_err(|e| EngineError::MalformedResponse(format!("search: {}", e)))?;

        let songs = entries
            .into_iter()
            .map(|(id, entry)| Song {
                id,
                title: entry.title,
                artist: entry.artist,
                thumbnail_url: entry.thumbnail_url,
                duration: entry.duration,
                is_downloaded: false,
            })
            .collect();
        Ok(songs)
    }

    /// Report which search result the user picked, so the backend can
    /// re-weight future results. Response body is ignored.
    pub async fn update_search_weight(&self, query: &str, selected_id: &str) -> Result<()> {
        let body = serde_json::json!({
            "query": query,
            "selectedId": selected_id,
        });

        self.http
            .post(format!("{}/search/update-weight", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetch raw bytes from an arbitrary URL (thumbnail artwork).
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.http.get(url).send().await?.error_for_status()?;
        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_parses_id_keyed_map() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search?query=test")
            .with_status(200)
            .with_body(
                r#"{"abc123": {"title": "Title", "artist": "Artist", "thumbnailUrl": "http://img/x.jpg", "duration": 212}}"#,
            )
            .create_async()
            .await;

        let api = ApiClient::new(server.url());
        let songs = api.search("test").await.unwrap();
        mock.assert_async().await;

        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].id, "abc123");
        assert_eq!(songs[0].artist, "Artist");
        assert_eq!(songs[0].duration, 212);
        assert!(!songs[0].is_downloaded);
    }

    #[tokio::test]
    async fn test_search_rejects_malformed_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search?query=test")
            .with_status(200)
            .with_body(r#"["not", "a", "map"]"#)
            .create_async()
            .await;

        let api = ApiClient::new(server.url());
        let err = api.search("test").await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_update_search_weight_posts_selection() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search/update-weight")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "query": "never gonna",
                "selectedId": "dQw4w9WgXcQ",
            })))
            .with_status(200)
            .create_async()
            .await;

        let api = ApiClient::new(server.url());
        api.update_search_weight("never gonna", "dQw4w9WgXcQ")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_stream_url_shape() {
        let api = ApiClient::new("https://api.example.com/");
        assert_eq!(
            api.stream_url("xyz", Quality::Lossless),
            "https://api.example.com/stream?id=xyz&quality=lossless"
        );
    }
}
