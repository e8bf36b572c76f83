//! Route handlers. Each one adapts an HTTP request/response to the narrow core function it
//! delegates to — validation and business logic stay in their own modules, not here.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    address,
    identity::UserDirectory,
    ingest::{self, DecisionError, IngestError, ProtocolPayload, ShareCreateRequest, WebdavProtocol},
    notifications::{self, NotificationError},
    shares::ShareStatus,
    token::{self, TokenEndpointError},
    webdav::{self, AuthorizationError, CredentialError, PathError},
};

use super::state::AppState;

pub async fn discovery(State(state): State<AppState>) -> Json<crate::discovery::Discovery> {
    Json((*state.own_discovery).clone())
}

// ---------------------------------------------------------------------------------------------
// POST /ocm/shares
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WebdavProtocolWire {
    #[serde(rename = "sharedSecret")]
    shared_secret: String,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    requirements: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProtocolWire {
    name: String,
    #[serde(default)]
    webdav: Option<WebdavProtocolWire>,
}

#[derive(Debug, Deserialize)]
pub struct ShareCreateWire {
    #[serde(rename = "shareWith")]
    share_with: String,
    name: String,
    #[serde(rename = "providerId")]
    provider_id: String,
    owner: String,
    sender: String,
    #[serde(rename = "shareType")]
    share_type: String,
    #[serde(rename = "resourceType")]
    resource_type: String,
    protocol: ProtocolWire,
}

impl ShareCreateWire {
    fn into_request(self, sender_host: String) -> ShareCreateRequest {
        ShareCreateRequest {
            share_with: self.share_with,
            name: self.name,
            provider_id: self.provider_id,
            owner: self.owner,
            sender: self.sender,
            share_type: self.share_type,
            resource_type: self.resource_type,
            protocol: ProtocolPayload {
                name: self.protocol.name,
                webdav: self.protocol.webdav.map(|w| WebdavProtocol {
                    shared_secret: w.shared_secret,
                    permissions: w.permissions,
                    uri: w.uri,
                    requirements: w.requirements,
                }),
            },
            sender_host,
        }
    }
}

#[derive(Debug, Serialize)]
struct ShareCreatedWire {
    #[serde(rename = "recipientDisplayName")]
    recipient_display_name: String,
}

fn validation_error_response(message: &str, fields: &[ingest::FieldError]) -> Response {
    let validation_errors: Vec<_> = fields
        .iter()
        .map(|f| serde_json::json!({ "name": f.name, "message": f.message }))
        .collect();
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "message": message, "validationErrors": validation_errors })),
    )
        .into_response()
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::MissingFields(fields) => {
                validation_error_response("VALIDATION_FAILED", &fields)
            }
            IngestError::InvalidFields(fields) => {
                validation_error_response("VALIDATION_FAILED", &fields)
            }
            IngestError::RecipientNotFound | IngestError::RecipientIdpMismatch { .. } => {
                validation_error_response(
                    "RECIPIENT_NOT_FOUND",
                    &[ingest::FieldError {
                        name: "shareWith".to_string(),
                        message: "NOT_FOUND".to_string(),
                    }],
                )
            }
            IngestError::UnsupportedShareType(share_type) => (
                StatusCode::NOT_IMPLEMENTED,
                Json(serde_json::json!({
                    "message": "SHARE_TYPE_NOT_SUPPORTED",
                    "shareType": share_type,
                })),
            )
                .into_response(),
        }
    }
}

fn sender_host_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-ocm-sender-host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn create_share(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(wire): Json<ShareCreateWire>,
) -> Result<Response, IngestError> {
    let sender_host = sender_host_from_headers(&headers);
    let req = wire.into_request(sender_host);
    let local_provider = &state.config.instance.public_origin;
    let outcome = ingest::ingest_share(
        state.incoming_shares.as_ref(),
        state.user_directory.as_ref(),
        local_provider,
        req,
    )
    .await?;

    let status = if outcome.is_new { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(ShareCreatedWire {
            recipient_display_name: outcome.share.recipient_display_name,
        }),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct IncomingShareWire {
    id: String,
    name: String,
    owner: String,
    sender: String,
    status: &'static str,
}

impl IntoResponse for DecisionError {
    fn into_response(self) -> Response {
        let status = match self {
            DecisionError::NotFound => StatusCode::NOT_FOUND,
            DecisionError::NotPending => StatusCode::CONFLICT,
        };
        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DecisionWire {
    accept: bool,
}

pub async fn get_share(
    State(state): State<AppState>,
    Path(share_id): Path<uuid::Uuid>,
    headers: HeaderMap,
) -> Result<Json<IncomingShareWire>, Response> {
    let recipient_user_id = recipient_user_id_from_headers(&headers)
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "missing recipient identity").into_response())?;
    let share = state
        .incoming_shares
        .get_by_id(&recipient_user_id, share_id)
        .await
        .map_err(|_| (StatusCode::NOT_FOUND, "share not found").into_response())?;
    Ok(Json(IncomingShareWire {
        id: share.share_id.to_string(),
        name: share.name,
        owner: share.owner,
        sender: share.sender,
        status: status_label(share.status),
    }))
}

fn scheme_of(origin: &str) -> &str {
    if origin.starts_with("http://") {
        "http"
    } else {
        "https"
    }
}

fn status_label(status: ShareStatus) -> &'static str {
    match status {
        ShareStatus::Pending => "pending",
        ShareStatus::Accepted => "accepted",
        ShareStatus::Declined => "declined",
    }
}

fn recipient_user_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-ocm-recipient-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

pub async fn decide_share(
    State(state): State<AppState>,
    Path(share_id): Path<uuid::Uuid>,
    headers: HeaderMap,
    Json(decision): Json<DecisionWire>,
) -> Result<Json<IncomingShareWire>, Response> {
    let recipient_user_id = recipient_user_id_from_headers(&headers)
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "missing recipient identity").into_response())?;

    let share = ingest::decide_share(
        state.incoming_shares.as_ref(),
        state.notifier.as_ref(),
        &recipient_user_id,
        share_id,
        decision.accept,
    )
    .await
    .map_err(IntoResponse::into_response)?;

    Ok(Json(IncomingShareWire {
        id: share.share_id.to_string(),
        name: share.name,
        owner: share.owner,
        sender: share.sender,
        status: status_label(share.status),
    }))
}

// ---------------------------------------------------------------------------------------------
// POST /{tokenExchangePath}
// ---------------------------------------------------------------------------------------------

impl IntoResponse for TokenEndpointError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            TokenEndpointError::UnsupportedContentType => (StatusCode::BAD_REQUEST, "invalid_request"),
            TokenEndpointError::MalformedBody(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            // Unsupported grant_type is rejected with `invalid_grant`, not a value outside the
            // OAuth error vocabulary this endpoint promises.
            TokenEndpointError::UnsupportedGrantType => (StatusCode::BAD_REQUEST, "invalid_grant"),
            TokenEndpointError::InvalidGrant => (StatusCode::BAD_REQUEST, "invalid_grant"),
            TokenEndpointError::InvalidClient => (StatusCode::UNAUTHORIZED, "invalid_client"),
            TokenEndpointError::NotImplemented => (StatusCode::NOT_IMPLEMENTED, "not_implemented"),
        };
        let mut response = (status, Json(serde_json::json!({ "error": error }))).into_response();
        for (name, value) in token::NO_STORE_HEADERS {
            response.headers_mut().insert(*name, value.parse().unwrap());
        }
        response
    }
}

pub async fn token_exchange(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Response> {
    if !state.config.token_exchange.enabled {
        return Err(TokenEndpointError::NotImplemented.into_response());
    }

    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let scheme = scheme_of(&state.config.instance.public_origin);

    let req = token::parse_request_body(content_type, &body[..]).map_err(IntoResponse::into_response)?;
    let resp = token::exchange(state.outgoing_shares.as_ref(), &state.token_store, scheme, &req)
        .await
        .map_err(IntoResponse::into_response)?;

    let mut response = Json(resp).into_response();
    for (name, value) in token::NO_STORE_HEADERS {
        response.headers_mut().insert(*name, value.parse().unwrap());
    }
    Ok(response)
}

// ---------------------------------------------------------------------------------------------
// POST /ocm/notifications
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NotificationWire {
    #[serde(rename = "notificationType")]
    notification_type: String,
    #[serde(rename = "resourceType")]
    resource_type: String,
    #[serde(rename = "providerId")]
    provider_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    notification: Option<serde_json::Value>,
    #[serde(default, rename = "sendingServiceOwnerURL")]
    #[allow(dead_code)]
    sending_service_owner_url: Option<String>,
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = match self {
            NotificationError::MissingFields(_) | NotificationError::InvalidNotificationType(_) => {
                StatusCode::BAD_REQUEST
            }
            NotificationError::ShareNotFound => StatusCode::NOT_FOUND,
            NotificationError::SenderMismatch => StatusCode::FORBIDDEN,
        };
        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}

pub async fn receive_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(wire): Json<NotificationWire>,
) -> Result<StatusCode, Response> {
    let sender_host = sender_host_from_headers(&headers);
    let scheme = scheme_of(&state.config.instance.public_origin);

    notifications::ingest_notification(
        state.outgoing_shares.as_ref(),
        scheme,
        notifications::NotificationRequest {
            notification_type: wire.notification_type,
            resource_type: wire.resource_type,
            provider_id: wire.provider_id,
            sender_host,
        },
    )
    .await
    .map_err(IntoResponse::into_response)?;

    Ok(StatusCode::CREATED)
}

// ---------------------------------------------------------------------------------------------
// POST /ocm/invite-accepted
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InviteAcceptedWire {
    #[serde(default)]
    #[allow(dead_code)]
    token: Option<String>,
    #[serde(default, rename = "recipientProvider")]
    #[allow(dead_code)]
    recipient_provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InviteAcceptedResponseWire {
    #[serde(rename = "userID")]
    user_id: String,
    email: String,
    name: String,
}

/// The local user the invite is about is identified the same way a recipient is identified
/// elsewhere on this surface: an opaque header set by the caller.
pub async fn invite_accepted(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(_wire): Json<InviteAcceptedWire>,
) -> Result<Json<InviteAcceptedResponseWire>, Response> {
    let local_user_id = recipient_user_id_from_headers(&headers)
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "missing local user identity").into_response())?;
    let user = state
        .user_directory
        .find_by_id(&local_user_id)
        .await
        .ok_or_else(|| (StatusCode::NOT_FOUND, "unknown local user").into_response())?;

    // Always a padded base64url federated opaque ID, never the raw `base64std(uid)@provider`
    // shape some peers use for plain addresses.
    let local_provider = &state.config.instance.public_origin;
    let user_id = address::encode_federated_opaque_id(&user.id, local_provider);

    Ok(Json(InviteAcceptedResponseWire {
        user_id,
        email: user.email,
        name: user.display_name,
    }))
}

// ---------------------------------------------------------------------------------------------
// /webdav/ocm/{webdavID}
// ---------------------------------------------------------------------------------------------

impl IntoResponse for PathError {
    fn into_response(self) -> Response {
        let status = match self {
            PathError::WriteMethodRejected(_) => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

impl IntoResponse for CredentialError {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, self.to_string()).into_response();
        response.headers_mut().insert(
            axum::http::header::WWW_AUTHENTICATE,
            axum::http::HeaderValue::from_static(r#"Bearer, Basic realm="OCM WebDAV""#),
        );
        response
    }
}

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, self.to_string()).into_response()
    }
}

pub async fn webdav_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    req_path: axum::extract::OriginalUri,
) -> Result<Response, Response> {
    let webdav_id =
        webdav::validate_request("GET", req_path.0.path()).map_err(IntoResponse::into_response)?;

    let credential = webdav::extract_credential(
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    )
    .map_err(IntoResponse::into_response)?;

    let sender_host = sender_host_from_headers(&headers);
    let profile = state.profiles.lookup(&sender_host);

    let share = webdav::authorize(
        state.config.webdav.webdav_token_exchange_mode,
        &profile,
        state.outgoing_shares.as_ref(),
        &state.token_store,
        &webdav_id,
        &credential,
    )
    .await
    .map_err(IntoResponse::into_response)?;

    Ok((StatusCode::OK, Json(serde_json::json!({ "localPath": share.local_path }))).into_response())
}
