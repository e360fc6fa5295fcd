//! Blob store access for uploaded files
//!
//! The platform stores uploads in its own blob service; the worker only
//! needs the bytes back by URL. Production fetches over HTTP, tests use
//! the in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::types::FetchError;

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches uploaded files over HTTP.
pub struct HttpFileStore {
    client: reqwest::Client,
}

impl HttpFileStore {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for HttpFileStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError {
                url: url.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

/// In-memory file store used by tests and local runs.
#[derive(Default)]
pub struct MemoryFileStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.files.write().insert(url.into(), bytes);
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.files
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError {
                url: url.to_string(),
                message: "file not found".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryFileStore::new();
        store.put("mem://a.csv", b"code\nLOC-a\n".to_vec());
        let bytes = store.fetch("mem://a.csv").await.unwrap();
        assert_eq!(bytes, b"code\nLOC-a\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let store = MemoryFileStore::new();
        let err = store.fetch("mem://missing.csv").await.unwrap_err();
        assert!(err.to_string().contains("missing.csv"));
    }
}
