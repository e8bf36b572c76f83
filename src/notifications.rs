//! Inbound share-lifecycle notifications: the sender-side counterpart to [`crate::ingest`],
//! applied to outgoing shares when the receiving instance reports an accept/decline/unshare.

use crate::{authority, shares::OutgoingShareRepo};

const VALID_NOTIFICATION_TYPES: &[&str] = &["SHARE_ACCEPTED", "SHARE_DECLINED", "SHARE_UNSHARED"];

#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub notification_type: String,
    pub resource_type: String,
    pub provider_id: String,
    pub sender_host: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("notificationType {0:?} is not recognized")]
    InvalidNotificationType(String),
    #[error("no outgoing share matches providerId")]
    ShareNotFound,
    #[error("sender_mismatch")]
    SenderMismatch,
}

/// Validates and applies an inbound `/ocm/notifications` delivery against this instance's own
/// outgoing shares. The caller's identity (`req.sender_host`) must match the matched share's
/// recorded `receiverHost` under scheme-aware comparison — notifications only ever arrive from
/// the instance a share was sent to.
pub async fn ingest_notification(
    outgoing_shares: &dyn OutgoingShareRepo,
    scheme: &str,
    req: NotificationRequest,
) -> Result<(), NotificationError> {
    let mut missing = Vec::new();
    if req.notification_type.trim().is_empty() {
        missing.push("notificationType".to_string());
    }
    if req.resource_type.trim().is_empty() {
        missing.push("resourceType".to_string());
    }
    if req.provider_id.trim().is_empty() {
        missing.push("providerId".to_string());
    }
    if !missing.is_empty() {
        return Err(NotificationError::MissingFields(missing));
    }
    if !VALID_NOTIFICATION_TYPES.contains(&req.notification_type.as_str()) {
        return Err(NotificationError::InvalidNotificationType(req.notification_type));
    }

    let share = outgoing_shares
        .get_by_provider_id(&req.provider_id)
        .await
        .ok_or(NotificationError::ShareNotFound)?;

    if authority::normalize(&req.sender_host, scheme) != authority::normalize(&share.receiver_host, scheme) {
        return Err(NotificationError::SenderMismatch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shares::{InMemoryOutgoingShareRepo, OutgoingShare, OutgoingShareStatus};

    fn share() -> OutgoingShare {
        OutgoingShare {
            share_id: uuid::Uuid::nil(),
            provider_id: "p-out-1".to_string(),
            webdav_id: "wd-1".to_string(),
            shared_secret: "s1".to_string(),
            local_path: "/tmp/f".to_string(),
            receiver_host: "receiver.example.com".to_string(),
            receiver_end_point: "https://receiver.example.com/ocm".to_string(),
            share_with: "bob@receiver.example.com".to_string(),
            name: "doc".to_string(),
            resource_type: "file".to_string(),
            permissions: vec!["read".to_string()],
            owner: "alice".to_string(),
            sender: "alice@local".to_string(),
            status: OutgoingShareStatus::Pending,
            sent_at: None,
            error: None,
            must_exchange_token: false,
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn req() -> NotificationRequest {
        NotificationRequest {
            notification_type: "SHARE_ACCEPTED".to_string(),
            resource_type: "file".to_string(),
            provider_id: "p-out-1".to_string(),
            sender_host: "receiver.example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn matching_notification_is_accepted() {
        let repo = InMemoryOutgoingShareRepo::new();
        repo.create(share()).await;
        ingest_notification(repo.as_ref(), "https", req()).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_provider_id_is_not_found() {
        let repo = InMemoryOutgoingShareRepo::new();
        let mut r = req();
        r.provider_id = "does-not-exist".to_string();
        let err = ingest_notification(repo.as_ref(), "https", r).await.unwrap_err();
        assert!(matches!(err, NotificationError::ShareNotFound));
    }

    #[tokio::test]
    async fn sender_not_matching_receiver_host_is_rejected() {
        let repo = InMemoryOutgoingShareRepo::new();
        repo.create(share()).await;
        let mut r = req();
        r.sender_host = "attacker.example.com".to_string();
        let err = ingest_notification(repo.as_ref(), "https", r).await.unwrap_err();
        assert!(matches!(err, NotificationError::SenderMismatch));
    }

    #[tokio::test]
    async fn sender_matches_under_default_port_normalization() {
        let repo = InMemoryOutgoingShareRepo::new();
        repo.create(share()).await;
        let mut r = req();
        r.sender_host = "receiver.example.com:443".to_string();
        ingest_notification(repo.as_ref(), "https", r).await.unwrap();
    }

    #[tokio::test]
    async fn missing_fields_are_all_reported_together() {
        let repo = InMemoryOutgoingShareRepo::new();
        let r = NotificationRequest {
            notification_type: String::new(),
            resource_type: String::new(),
            provider_id: "p-out-1".to_string(),
            sender_host: "receiver.example.com".to_string(),
        };
        let err = ingest_notification(repo.as_ref(), "https", r).await.unwrap_err();
        match err {
            NotificationError::MissingFields(fields) => {
                assert!(fields.contains(&"notificationType".to_string()));
                assert!(fields.contains(&"resourceType".to_string()));
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrecognized_notification_type_is_rejected() {
        let repo = InMemoryOutgoingShareRepo::new();
        repo.create(share()).await;
        let mut r = req();
        r.notification_type = "SHARE_TELEPORTED".to_string();
        let err = ingest_notification(repo.as_ref(), "https", r).await.unwrap_err();
        assert!(matches!(err, NotificationError::InvalidNotificationType(_)));
    }
}
