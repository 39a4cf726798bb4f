//! Document fetching and id formatting
//!
//! The resolver retrieves raw schema text through the `DocumentFetcher`
//! trait, so the transport can be swapped: HTTP by default, an in-memory map
//! for tests. Schema ids are mapped to fetch addresses by a `NameFormatter`
//! (identity by default), so a deployment can prepend a directory-service
//! root without touching the documents themselves.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Transport-level failure retrieving a document. Never retried.
#[derive(Error, Debug)]
#[error("Problem loading [{address}]: {reason}")]
pub struct FetchError {
    pub address: String,
    pub reason: String,
}

/// Retrieves document text from an address.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch the raw text at `address`.
    async fn fetch(&self, address: &str) -> Result<String, FetchError>;
}

/// Default fetcher: a plain HTTP GET.
///
/// Any response status in [400, 600) is a fetch error.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, address: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(address)
            .send()
            .await
            .map_err(|e| FetchError {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError {
                address: address.to_string(),
                reason: format!("status [{}]", status.as_u16()),
            });
        }

        response.text().await.map_err(|e| FetchError {
            address: address.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Maps a schema id to the address it should be fetched from.
pub trait NameFormatter: Send + Sync {
    fn format(&self, id: &str) -> String;
}

/// Default formatter: ids are already fetchable addresses.
pub struct IdentityFormatter;

impl NameFormatter for IdentityFormatter {
    fn format(&self, id: &str) -> String {
        id.to_string()
    }
}

/// Prepends a fixed base (such as a directory-service root) to every id.
pub struct BaseAddressFormatter {
    base: String,
}

impl BaseAddressFormatter {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl NameFormatter for BaseAddressFormatter {
    fn format(&self, id: &str) -> String {
        format!("{}{}", self.base, id)
    }
}

/// In-memory fetcher serving a fixed map of address -> body.
///
/// Counts requests per address, which lets tests observe fetch
/// deduplication without real network traffic.
#[derive(Default)]
pub struct StaticFetcher {
    documents: HashMap<String, String>,
    hit_counts: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for requests to `address`.
    pub fn insert(&mut self, address: impl Into<String>, body: impl Into<String>) {
        self.documents.insert(address.into(), body.into());
    }

    /// How many times `address` has been requested.
    pub fn hits(&self, address: &str) -> usize {
        self.hit_counts
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentFetcher for StaticFetcher {
    async fn fetch(&self, address: &str) -> Result<String, FetchError> {
        *self
            .hit_counts
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_insert(0) += 1;

        self.documents
            .get(address)
            .cloned()
            .ok_or_else(|| FetchError {
                address: address.to_string(),
                reason: "status [404]".to_string(),
            })
    }
}
