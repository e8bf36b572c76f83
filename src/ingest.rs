//! Incoming share ingest: validates an inbound share-create request, resolves its recipient
//! against the local user directory, and stores it idempotently.

use async_trait::async_trait;

use crate::{
    address, authority,
    error::BoxError,
    identity::UserDirectory,
    shares::{IncomingShare, IncomingShareRepo, IncomingShareRepoError, ShareStatus},
};

#[derive(Debug, Clone)]
pub struct WebdavProtocol {
    pub shared_secret: String,
    pub permissions: Vec<String>,
    pub uri: Option<String>,
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProtocolPayload {
    pub name: String,
    pub webdav: Option<WebdavProtocol>,
}

/// The wire shape of an inbound `POST /ocm/shares` request, already parsed from JSON but not
/// yet validated.
#[derive(Debug, Clone)]
pub struct ShareCreateRequest {
    pub share_with: String,
    pub name: String,
    pub provider_id: String,
    pub owner: String,
    pub sender: String,
    pub share_type: String,
    pub resource_type: String,
    pub protocol: ProtocolPayload,
    pub sender_host: String,
}

/// One problem with a single named field, e.g. `{name: "shareWith", message: "NOT_FOUND"}`.
#[derive(Debug, Clone)]
pub struct FieldError {
    pub name: String,
    pub message: String,
}

impl FieldError {
    fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing required field(s): {}", .0.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", "))]
    MissingFields(Vec<FieldError>),
    #[error("invalid field(s): {}", .0.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", "))]
    InvalidFields(Vec<FieldError>),
    #[error("recipient could not be resolved")]
    RecipientNotFound,
    #[error("federated opaque id idp {got:?} does not match this instance's own provider {expected:?}")]
    RecipientIdpMismatch { expected: String, got: String },
    #[error("shareType {0:?} is not supported")]
    UnsupportedShareType(String),
}

// `group` shares are an explicit non-goal: any shareType other than `user` is rejected with a
// dedicated 501, not folded into the generic invalid-field list.
const VALID_SHARE_TYPES: &[&str] = &["user"];
const VALID_WEBDAV_PERMISSIONS: &[&str] = &["read", "write", "share"];
const VALID_WEBDAV_REQUIREMENTS: &[&str] = &["must-exchange-token"];

/// Required-field presence check. Accumulates every missing field rather than stopping at the
/// first, so a caller sees the whole problem in one response.
fn validate_required_fields(req: &ShareCreateRequest) -> Result<(), IngestError> {
    let mut missing = Vec::new();
    if req.share_with.trim().is_empty() {
        missing.push(FieldError::new("shareWith", "REQUIRED"));
    }
    if req.name.trim().is_empty() {
        missing.push(FieldError::new("name", "REQUIRED"));
    }
    if req.provider_id.trim().is_empty() {
        missing.push(FieldError::new("providerId", "REQUIRED"));
    }
    if req.owner.trim().is_empty() {
        missing.push(FieldError::new("owner", "REQUIRED"));
    }
    if req.sender.trim().is_empty() {
        missing.push(FieldError::new("sender", "REQUIRED"));
    }
    if req.share_type.trim().is_empty() {
        missing.push(FieldError::new("shareType", "REQUIRED"));
    }
    if req.resource_type.trim().is_empty() {
        missing.push(FieldError::new("resourceType", "REQUIRED"));
    }
    if req.protocol.name.trim().is_empty() {
        missing.push(FieldError::new("protocol.name", "REQUIRED"));
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(IngestError::MissingFields(missing))
    }
}

/// Extracts the authority and scheme a `shareWith`/address provider side should be compared
/// against: `local_provider` is a full origin (e.g. `https://ocm.example.com`), while the
/// provider side of an address is a bare authority.
fn local_provider_authority(local_provider: &str) -> (String, &'static str) {
    if let Some(rest) = local_provider.strip_prefix("https://") {
        (rest.trim_end_matches('/').to_string(), "https")
    } else if let Some(rest) = local_provider.strip_prefix("http://") {
        (rest.trim_end_matches('/').to_string(), "http")
    } else {
        (local_provider.trim_end_matches('/').to_string(), "https")
    }
}

/// Format validation, run only once required fields are present. `resourceType` is deliberately
/// not whitelisted here — it is accepted opaquely and passed through.
fn validate_field_formats(req: &ShareCreateRequest, local_provider: &str) -> Result<(), IngestError> {
    let mut invalid = Vec::new();
    if address::parse(&req.owner).is_err() {
        invalid.push(FieldError::new("owner", "INVALID_FORMAT"));
    }
    if address::parse(&req.sender).is_err() {
        invalid.push(FieldError::new("sender", "INVALID_FORMAT"));
    }
    // Only address-shaped shareWith values (`identifier@provider`) carry a provider side to
    // check; a bare local ID/username/email has no provider component and is left to recipient
    // resolution.
    if let Some(idx) = req.share_with.rfind('@') {
        let provider = &req.share_with[idx + 1..];
        if !provider.is_empty() {
            let (local_authority, scheme) = local_provider_authority(local_provider);
            if authority::normalize(provider, scheme) != authority::normalize(&local_authority, scheme) {
                invalid.push(FieldError::new("shareWith", "PROVIDER_MISMATCH"));
            }
        }
    }
    if req.protocol.name == "webdav" && req.protocol.webdav.is_none() {
        invalid.push(FieldError::new("protocol.webdav", "REQUIRED"));
    }
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(IngestError::InvalidFields(invalid))
    }
}

/// Validates the `webdav` protocol sub-object: required `uri`, non-empty `sharedSecret`, a
/// non-empty permissions list drawn only from the known vocabulary, and a requirements list
/// drawn only from the known vocabulary (`must-use-mfa` and anything unrecognized is rejected).
fn validate_webdav(webdav: &WebdavProtocol) -> Result<(), IngestError> {
    let mut invalid = Vec::new();
    if webdav.shared_secret.trim().is_empty() {
        invalid.push(FieldError::new("protocol.webdav.sharedSecret", "REQUIRED"));
    }
    if webdav.uri.as_deref().map_or(true, |uri| uri.trim().is_empty()) {
        invalid.push(FieldError::new("protocol.webdav.uri", "REQUIRED"));
    }
    if webdav.permissions.is_empty() {
        invalid.push(FieldError::new("protocol.webdav.permissions", "REQUIRED"));
    }
    for permission in &webdav.permissions {
        if !VALID_WEBDAV_PERMISSIONS.contains(&permission.as_str()) {
            invalid.push(FieldError::new(
                "protocol.webdav.permissions",
                format!("invalid value {permission:?}"),
            ));
        }
    }
    for requirement in &webdav.requirements {
        if !VALID_WEBDAV_REQUIREMENTS.contains(&requirement.as_str()) {
            invalid.push(FieldError::new(
                "protocol.webdav.requirements",
                format!("unsupported requirement {requirement:?}"),
            ));
        }
    }
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(IngestError::InvalidFields(invalid))
    }
}

/// Resolves `share_with` against the local user directory in the fixed order: local ID,
/// username, email, then (unless it looks like standard base64) a federated-opaque-ID decode
/// whose idp must equal `local_provider`.
pub async fn resolve_recipient(
    user_directory: &dyn UserDirectory,
    share_with: &str,
    local_provider: &str,
) -> Result<crate::identity::LocalUser, IngestError> {
    if let Some(user) = user_directory.find_by_id(share_with).await {
        return Ok(user);
    }
    if let Some(user) = user_directory.find_by_username(share_with).await {
        return Ok(user);
    }
    if let Some(user) = user_directory.find_by_email(share_with).await {
        return Ok(user);
    }
    if address::looks_like_standard_base64(share_with) {
        return Err(IngestError::RecipientNotFound);
    }
    let (user_id, idp) = address::decode_federated_opaque_id(share_with)
        .map_err(|_| IngestError::RecipientNotFound)?;
    if idp != local_provider {
        return Err(IngestError::RecipientIdpMismatch {
            expected: local_provider.to_string(),
            got: idp,
        });
    }
    user_directory
        .find_by_id(&user_id)
        .await
        .ok_or(IngestError::RecipientNotFound)
}

/// Notifies the sending instance of an accept/decline decision. A capability boundary so tests
/// never need a live peer.
#[async_trait]
pub trait ShareNotifier: Send + Sync {
    async fn notify(&self, notification: ShareNotification) -> Result<(), BoxError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ShareAccepted,
    ShareDeclined,
}

#[derive(Debug, Clone)]
pub struct ShareNotification {
    pub kind: NotificationKind,
    pub provider_id: String,
    pub sender_host: String,
    pub recipient_user_id: String,
}

/// The result of [`ingest_share`]: the stored share, plus whether this call is what created it
/// (as opposed to an idempotent replay of an already-stored delivery).
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub share: IncomingShare,
    pub is_new: bool,
}

/// Validates and stores an inbound share-create request, returning the stored share. A repeat
/// delivery of the same `(senderHost, providerID)` pair returns the already-stored share rather
/// than erroring, so retries from a peer are idempotent.
pub async fn ingest_share(
    repo: &dyn IncomingShareRepo,
    user_directory: &dyn UserDirectory,
    local_provider: &str,
    req: ShareCreateRequest,
) -> Result<IngestOutcome, IngestError> {
    validate_required_fields(&req)?;
    if !VALID_SHARE_TYPES.contains(&req.share_type.as_str()) {
        return Err(IngestError::UnsupportedShareType(req.share_type.clone()));
    }
    validate_field_formats(&req, local_provider)?;
    if let Some(webdav) = &req.protocol.webdav {
        validate_webdav(webdav)?;
    }

    let recipient = resolve_recipient(user_directory, &req.share_with, local_provider).await?;

    let permissions = req
        .protocol
        .webdav
        .as_ref()
        .map(|w| w.permissions.clone())
        .unwrap_or_default();
    let shared_secret = req
        .protocol
        .webdav
        .as_ref()
        .map(|w| w.shared_secret.clone())
        .unwrap_or_default();
    let must_exchange_token = req
        .protocol
        .webdav
        .as_ref()
        .map(|w| w.requirements.iter().any(|r| r == "must-exchange-token"))
        .unwrap_or(false);

    let share = IncomingShare {
        share_id: uuid::Uuid::nil(),
        provider_id: req.provider_id.clone(),
        sender_host: req.sender_host.clone(),
        webdav_id: uuid::Uuid::now_v7().to_string(),
        shared_secret,
        permissions,
        owner: req.owner,
        sender: req.sender,
        share_with: req.share_with,
        name: req.name,
        resource_type: req.resource_type,
        share_type: req.share_type,
        recipient_user_id: recipient.id,
        recipient_display_name: recipient.display_name,
        status: ShareStatus::Pending,
        created_at: time::OffsetDateTime::now_utc(),
        must_exchange_token,
    };

    match repo.create(share).await {
        Ok(created) => Ok(IngestOutcome { share: created, is_new: true }),
        Err(IncomingShareRepoError::AlreadyExists { existing_share_id: _ }) => {
            let existing = repo
                .get_by_provider_id(&req.sender_host, &req.provider_id)
                .await
                .ok_or(IngestError::RecipientNotFound)?;
            Ok(IngestOutcome { share: existing, is_new: false })
        }
        Err(IncomingShareRepoError::NotFound) => unreachable!("create never returns NotFound"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("share not found")]
    NotFound,
    #[error("share is not pending, cannot decide it again")]
    NotPending,
}

/// Accepts or declines a share, stamping its status and firing a best-effort notification back
/// to the sender. Deciding a `Pending` share transitions it and notifies. Re-deciding a share the
/// same way it was already decided (accept-on-accepted, decline-on-declined) is idempotent: it
/// returns the share unchanged and fires no new notification. Deciding it the *other* way
/// (accept-on-declined, decline-on-accepted) is a conflict.
pub async fn decide_share(
    repo: &dyn IncomingShareRepo,
    notifier: &dyn ShareNotifier,
    recipient_user_id: &str,
    share_id: uuid::Uuid,
    accept: bool,
) -> Result<IncomingShare, DecisionError> {
    let mut share = repo
        .get_by_id(recipient_user_id, share_id)
        .await
        .map_err(|_| DecisionError::NotFound)?;

    match (share.status, accept) {
        (ShareStatus::Accepted, true) | (ShareStatus::Declined, false) => return Ok(share),
        (ShareStatus::Pending, _) => {}
        _ => return Err(DecisionError::NotPending),
    }

    share.status = if accept { ShareStatus::Accepted } else { ShareStatus::Declined };
    let updated = repo
        .update(recipient_user_id, share.clone())
        .await
        .map_err(|_| DecisionError::NotFound)?;

    let kind = if accept {
        NotificationKind::ShareAccepted
    } else {
        NotificationKind::ShareDeclined
    };
    if let Err(e) = notifier
        .notify(ShareNotification {
            kind,
            provider_id: updated.provider_id.clone(),
            sender_host: updated.sender_host.clone(),
            recipient_user_id: recipient_user_id.to_string(),
        })
        .await
    {
        tracing::warn!(error = %e, share_id = %share_id, "failed to notify sender of share decision");
    }

    Ok(updated)
}
