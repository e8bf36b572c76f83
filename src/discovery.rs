//! Discovery client & cache.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    cache::Cache,
    http_client::{HttpClient, HttpRequest},
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum DiscoveryError {
    #[error("peer at {base_url} declares itself unavailable (enabled=false)")]
    Disabled { base_url: String },
    #[error("discovery of {base_url} failed: {cause}")]
    Failed { base_url: String, cause: String },
}

/// `{name, shareTypes[], protocols: {name -> path}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceType {
    pub name: String,
    #[serde(default, rename = "shareTypes")]
    pub share_types: Vec<String>,
    #[serde(default)]
    pub protocols: std::collections::BTreeMap<String, String>,
}

/// `{keyId, publicKeyPem, algorithm}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKey {
    #[serde(rename = "keyId")]
    pub key_id: String,
    #[serde(rename = "publicKeyPem")]
    pub public_key_pem: String,
    pub algorithm: String,
}

/// Discovery document. `criteria` and `resourceTypes` are always present, possibly
/// empty, never absent — `#[serde(default)]` enforces the "always an array" invariant on parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Discovery {
    pub enabled: bool,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(rename = "endPoint")]
    pub end_point: String,
    pub provider: String,
    #[serde(default, rename = "tokenEndPoint")]
    pub token_end_point: Option<String>,
    #[serde(default, rename = "resourceTypes")]
    pub resource_types: Vec<ResourceType>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default, rename = "publicKeys")]
    pub public_keys: Vec<PublicKey>,
    #[serde(default, rename = "inviteAcceptDialog")]
    pub invite_accept_dialog: Option<String>,
}

impl Discovery {
    pub fn has_capability(&self, s: &str) -> bool {
        self.capabilities.iter().any(|c| c == s)
    }

    pub fn has_criteria(&self, s: &str) -> bool {
        self.criteria.iter().any(|c| c == s)
    }

    pub fn get_public_key(&self, key_id: &str) -> Option<&PublicKey> {
        self.public_keys.iter().find(|k| k.key_id == key_id)
    }

    /// Joins the origin of `endPoint` with the `webdav` resource type's path and a relative
    /// webdav id.
    pub fn build_webdav_url(&self, webdav_id: &str) -> Option<String> {
        let webdav_path = self
            .resource_types
            .iter()
            .find_map(|rt| rt.protocols.get("webdav"))?;
        let end_point: hyper::Uri = self.end_point.parse().ok()?;
        let scheme = end_point.scheme_str()?;
        let authority = end_point.authority()?.as_str();
        let webdav_path = webdav_path.trim_end_matches('/');
        let webdav_id = webdav_id.trim_start_matches('/');
        Some(format!("{scheme}://{authority}{webdav_path}/{webdav_id}"))
    }
}

pub const TTL_DISCOVERY: Duration = Duration::from_secs(15 * 60);
const WELL_KNOWN_PATH: &str = "/.well-known/ocm";
const FALLBACK_PATH: &str = "/ocm-provider";
const MAX_DISCOVERY_BYTES: usize = 1024 * 1024;

pub struct DiscoveryClient {
    cache: Arc<dyn Cache<String, String>>,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl DiscoveryClient {
    pub fn new(cache: Arc<dyn Cache<String, String>>, http: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self { cache, http, timeout }
    }

    fn cache_key(base_url: &str) -> String {
        format!("discovery:{base_url}")
    }

    /// Fetches `/.well-known/ocm`, falling back to `/ocm-provider`; serves from cache on hit.
    pub async fn discover(&self, base_url: &str) -> Result<Discovery, DiscoveryError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let key = Self::cache_key(&base_url);

        if let Some(cached) = self.cache.get(&key).await {
            if let Ok(doc) = serde_json::from_str::<Discovery>(&cached) {
                return Ok(doc);
            }
            // unmarshal failure on read is non-fatal: fall through to re-fetch.
        }

        let primary = self.fetch(&format!("{base_url}{WELL_KNOWN_PATH}")).await;
        let doc = match primary {
            Ok(doc) => doc,
            Err(primary_err) => self
                .fetch(&format!("{base_url}{FALLBACK_PATH}"))
                .await
                .map_err(|_| DiscoveryError::Failed {
                    base_url: base_url.clone(),
                    cause: primary_err,
                })?,
        };

        if !doc.enabled {
            return Err(DiscoveryError::Disabled { base_url });
        }

        if let Ok(serialized) = serde_json::to_string(&doc) {
            self.cache.set(key, serialized, TTL_DISCOVERY).await;
        }

        Ok(doc)
    }

    async fn fetch(&self, url: &str) -> Result<Discovery, String> {
        let response = self
            .http
            .send(HttpRequest::get(url), self.timeout, MAX_DISCOVERY_BYTES)
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("{url} returned HTTP {}", response.status));
        }
        serde_json::from_slice::<Discovery>(&response.body).map_err(|e| e.to_string())
    }
}
