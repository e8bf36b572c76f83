//! Token endpoint & store: exchanges a share's shared secret for a short-lived access token,
//! and holds minted tokens for later WebDAV credential checks.

use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{authority, cache::Cache, shares::OutgoingShareRepo};

const TOKEN_BYTES: usize = 32;
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExchangeRequestBody {
    pub grant_type: String,
    pub client_id: String,
    pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenEndpointError {
    #[error("unsupported content type, expected form or json")]
    UnsupportedContentType,
    #[error("request body could not be parsed: {0}")]
    MalformedBody(String),
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,
    #[error("invalid_grant")]
    InvalidGrant,
    #[error("invalid_client")]
    InvalidClient,
    #[error("token exchange is disabled on this instance")]
    NotImplemented,
}

const SUPPORTED_GRANT_TYPES: &[&str] = &["authorization_code", "ocm_share"];

/// Parses the request body by declared content type: `application/x-www-form-urlencoded` or
/// `application/json`. Any other content type is rejected rather than guessed at.
pub fn parse_request_body(
    content_type: &str,
    body: &[u8],
) -> Result<TokenExchangeRequestBody, TokenEndpointError> {
    #[derive(Deserialize)]
    struct Fields {
        grant_type: String,
        client_id: String,
        code: String,
    }

    let fields: Fields = if content_type.starts_with("application/x-www-form-urlencoded") {
        let body_str =
            std::str::from_utf8(body).map_err(|e| TokenEndpointError::MalformedBody(e.to_string()))?;
        serde_urlencoded::from_str(body_str).map_err(|e| TokenEndpointError::MalformedBody(e.to_string()))?
    } else if content_type.starts_with("application/json") {
        serde_json::from_slice(body).map_err(|e| TokenEndpointError::MalformedBody(e.to_string()))?
    } else {
        return Err(TokenEndpointError::UnsupportedContentType);
    };

    Ok(TokenExchangeRequestBody {
        grant_type: fields.grant_type,
        client_id: fields.client_id,
        code: fields.code,
    })
}

/// Compares `client_id` against `receiver_host` the way peer identity is compared everywhere
/// else in the core: normalize both under `scheme` and compare. If normalization of either side
/// fails (a malformed authority string reaches us from across the wire), fall back to a plain
/// case-sensitive string comparison rather than treating the failure as a match.
fn client_id_matches_receiver_host(client_id: &str, receiver_host: &str, scheme: &str) -> bool {
    let normalized_client = authority::normalize(client_id, scheme);
    let normalized_receiver = authority::normalize(receiver_host, scheme);
    if normalized_client.is_empty() || normalized_receiver.is_empty() {
        return client_id == receiver_host;
    }
    normalized_client == normalized_receiver
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenExchangeResponseBody {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// `Cache-Control`/`Pragma` headers every token endpoint response must carry, mirroring OAuth
/// token endpoint conventions.
pub const NO_STORE_HEADERS: &[(&str, &str)] = &[
    ("Cache-Control", "no-store"),
    ("Pragma", "no-cache"),
];

#[derive(Debug, Clone)]
pub(crate) struct TokenRecord {
    outgoing_share_id: uuid::Uuid,
}

/// Mints and stores exchanged access tokens, keyed by the opaque token value.
pub struct TokenStore {
    cache: Box<dyn Cache<String, TokenRecord>>,
    ttl: Duration,
}

impl TokenStore {
    pub fn new(cache: Box<dyn Cache<String, TokenRecord>>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Builds a token store backed by a fresh in-memory cache. The usual way to construct one
    /// outside this module, since [`TokenRecord`] itself is crate-private.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Box::new(crate::cache::InMemoryCache::default()), ttl)
    }

    fn mint_token() -> String {
        let mut bytes = [0_u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    pub(crate) async fn store(&self, outgoing_share_id: uuid::Uuid) -> String {
        let token = Self::mint_token();
        self.cache
            .set(token.clone(), TokenRecord { outgoing_share_id }, self.ttl)
            .await;
        token
    }

    /// Looks up the outgoing share a previously minted token was issued for. `None` means the
    /// token is unknown or has expired.
    pub async fn lookup(&self, token: &str) -> Option<uuid::Uuid> {
        self.cache.get(&token.to_string()).await.map(|r| r.outgoing_share_id)
    }
}

/// Exchanges a shared secret (`code`) for a freshly minted access token. `client_id` must match
/// the outgoing share's recorded `receiverHost` under scheme-aware comparison.
pub async fn exchange(
    outgoing_shares: &dyn OutgoingShareRepo,
    token_store: &TokenStore,
    scheme: &str,
    req: &TokenExchangeRequestBody,
) -> Result<TokenExchangeResponseBody, TokenEndpointError> {
    if !SUPPORTED_GRANT_TYPES.contains(&req.grant_type.as_str()) {
        return Err(TokenEndpointError::UnsupportedGrantType);
    }

    let share = outgoing_shares
        .get_by_shared_secret(&req.code)
        .await
        .ok_or(TokenEndpointError::InvalidGrant)?;

    if !client_id_matches_receiver_host(&req.client_id, &share.receiver_host, scheme) {
        return Err(TokenEndpointError::InvalidClient);
    }

    let token = token_store.store(share.share_id).await;
    Ok(TokenExchangeResponseBody {
        access_token: token,
        token_type: "Bearer",
        expires_in: token_store.ttl.as_secs(),
    })
}
