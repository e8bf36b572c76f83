//! WebDAV credential layer: path/method gating and the authorization decision between an
//! exchanged bearer token and a raw shared-secret Basic credential.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    compat::{BasicAuthPattern, PeerProfile},
    config::WebdavTokenExchangeMode,
    shares::{OutgoingShare, OutgoingShareRepo},
    token::TokenStore,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("webdav path must be /webdav/ocm/{{webdavID}}")]
    MalformedPath,
    #[error("webdavID is not a valid UUID")]
    InvalidWebdavId,
    #[error("path traversal segment rejected")]
    PathTraversal,
    #[error("method {0} is not permitted on the WebDAV surface (read-only)")]
    WriteMethodRejected(String),
}

const READ_ONLY_METHODS: &[&str] = &["GET", "HEAD", "PROPFIND", "OPTIONS"];

/// Validates `method` against the read-only allowlist and `path` against the expected
/// `/webdav/ocm/{webdavID}[/...]` shape, rejecting any `..` segment.
pub fn validate_request(method: &str, path: &str) -> Result<String, PathError> {
    if !READ_ONLY_METHODS.contains(&method.to_uppercase().as_str()) {
        return Err(PathError::WriteMethodRejected(method.to_string()));
    }

    let trimmed = path.trim_start_matches('/');
    let mut segments = trimmed.split('/');
    if segments.next() != Some("webdav") || segments.next() != Some("ocm") {
        return Err(PathError::MalformedPath);
    }
    let webdav_id = segments.next().ok_or(PathError::MalformedPath)?;
    if webdav_id.is_empty() {
        return Err(PathError::MalformedPath);
    }
    if segments.clone().any(|s| s == "..") {
        return Err(PathError::PathTraversal);
    }
    uuid::Uuid::parse_str(webdav_id).map_err(|_| PathError::InvalidWebdavId)?;

    Ok(webdav_id.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    Basic { pattern: BasicAuthPattern, secret: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("missing Authorization header")]
    Missing,
    #[error("Authorization header is not a recognized Bearer or Basic credential")]
    Unrecognized,
    #[error("Basic credential is not valid base64 or not UTF-8")]
    MalformedBasic,
}

/// Decodes an `Authorization` header value into one of the four recognized Basic shapes or a
/// Bearer token, in the fixed priority order: `token:`, `token:token`, `:token`, `id:token`.
pub fn extract_credential(authorization: Option<&str>) -> Result<Credential, CredentialError> {
    let header = authorization.ok_or(CredentialError::Missing)?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        return Ok(Credential::Bearer(token.trim().to_string()));
    }

    let Some(encoded) = header.strip_prefix("Basic ") else {
        return Err(CredentialError::Unrecognized);
    };
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| CredentialError::MalformedBasic)?;
    let decoded = String::from_utf8(decoded).map_err(|_| CredentialError::MalformedBasic)?;
    let idx = decoded.find(':').ok_or(CredentialError::MalformedBasic)?;
    let (user, pass) = (&decoded[..idx], &decoded[idx + 1..]);

    let (pattern, secret) = if !user.is_empty() && pass.is_empty() {
        (BasicAuthPattern::TokenColon, user)
    } else if !user.is_empty() && user == pass {
        (BasicAuthPattern::TokenColonToken, user)
    } else if user.is_empty() && !pass.is_empty() {
        (BasicAuthPattern::ColonToken, pass)
    } else if !user.is_empty() && !pass.is_empty() {
        (BasicAuthPattern::IdColonToken, pass)
    } else {
        return Err(CredentialError::MalformedBasic);
    };

    Ok(Credential::Basic {
        pattern,
        secret: secret.to_string(),
    })
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("exchanged token is unknown or expired")]
    UnknownToken,
    #[error("token does not grant access to this webdavID")]
    TokenWebdavIdMismatch,
    #[error("peer profile does not allow this Basic credential shape")]
    PatternNotAllowed,
    #[error("webdavID is not a known outgoing share")]
    UnknownWebdavId,
    #[error("this share requires an exchanged token; the raw shared secret is not accepted")]
    MustExchangeToken,
    #[error("shared secret does not match")]
    SharedSecretMismatch,
}

/// Runs the authorization decision tree for one WebDAV request: a Bearer credential is checked
/// against the token store; a Basic credential is checked against the peer profile's allowed
/// pattern list, the configured enforcement mode, and finally the share's own shared secret.
pub async fn authorize(
    mode: WebdavTokenExchangeMode,
    profile: &PeerProfile,
    outgoing_shares: &dyn OutgoingShareRepo,
    token_store: &TokenStore,
    webdav_id: &str,
    credential: &Credential,
) -> Result<OutgoingShare, AuthorizationError> {
    match credential {
        Credential::Bearer(token) => {
            let share_id = token_store
                .lookup(token)
                .await
                .ok_or(AuthorizationError::UnknownToken)?;
            let share = outgoing_shares
                .get_by_id(share_id)
                .await
                .ok_or(AuthorizationError::UnknownToken)?;
            if share.webdav_id != webdav_id {
                return Err(AuthorizationError::TokenWebdavIdMismatch);
            }
            Ok(share)
        }
        Credential::Basic { pattern, secret } => {
            if !profile.is_basic_auth_pattern_allowed(*pattern) {
                return Err(AuthorizationError::PatternNotAllowed);
            }
            if mode == WebdavTokenExchangeMode::Enforced {
                return Err(AuthorizationError::MustExchangeToken);
            }
            let share = outgoing_shares
                .get_by_webdav_id(webdav_id)
                .await
                .ok_or(AuthorizationError::UnknownWebdavId)?;

            let relaxed = mode == WebdavTokenExchangeMode::Lenient && profile.relax_must_exchange_token;
            if share.must_exchange_token && !relaxed {
                return Err(AuthorizationError::MustExchangeToken);
            }
            if &share.shared_secret != secret {
                return Err(AuthorizationError::SharedSecretMismatch);
            }
            Ok(share)
        }
    }
}
