//! Outbound share-decision notifier: posts the accept/decline back to the sender's own
//! `/ocm/notifications` endpoint, the same fire-once-and-log pattern `decide_share` already
//! applies to the failure path.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    error::BoxError,
    http_client::{HttpClient, HttpRequest},
    ingest::{NotificationKind, ShareNotification, ShareNotifier},
};

const MAX_NOTIFICATION_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct NotificationWire<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(rename = "providerId")]
    provider_id: &'a str,
    #[serde(rename = "recipientUserId")]
    recipient_user_id: &'a str,
}

pub struct HttpShareNotifier {
    http: std::sync::Arc<dyn HttpClient>,
    timeout: Duration,
}

impl HttpShareNotifier {
    pub fn new(http: std::sync::Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait]
impl ShareNotifier for HttpShareNotifier {
    async fn notify(&self, notification: ShareNotification) -> Result<(), BoxError> {
        let kind = match notification.kind {
            NotificationKind::ShareAccepted => "SHARE_ACCEPTED",
            NotificationKind::ShareDeclined => "SHARE_DECLINED",
        };
        let body = serde_json::to_vec(&NotificationWire {
            kind,
            provider_id: &notification.provider_id,
            recipient_user_id: &notification.recipient_user_id,
        })?;

        let url = format!("https://{}/ocm/notifications", notification.sender_host);
        let request = HttpRequest::post(url, body).header("content-type", "application/json");

        let response = self
            .http
            .send(request, self.timeout, MAX_NOTIFICATION_RESPONSE_BYTES)
            .await?;
        if !response.is_success() {
            return Err(format!("sender returned HTTP {} for notification", response.status).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{test_support::StubHttpClient, HttpResponse};

    #[tokio::test]
    async fn posts_to_senders_notifications_endpoint() {
        let http = std::sync::Arc::new(StubHttpClient::new());
        http.push_response(HttpResponse {
            status: 200,
            headers: vec![],
            body: vec![],
        });
        let notifier = HttpShareNotifier::new(http.clone(), Duration::from_secs(1));
        notifier
            .notify(ShareNotification {
                kind: NotificationKind::ShareAccepted,
                provider_id: "p1".to_string(),
                sender_host: "sender.example.com".to_string(),
                recipient_user_id: "u1".to_string(),
            })
            .await
            .unwrap();
        let sent = &http.requests()[0];
        assert_eq!(sent.uri, "https://sender.example.com/ocm/notifications");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let http = std::sync::Arc::new(StubHttpClient::new());
        http.push_response(HttpResponse {
            status: 500,
            headers: vec![],
            body: vec![],
        });
        let notifier = HttpShareNotifier::new(http, Duration::from_secs(1));
        let err = notifier
            .notify(ShareNotification {
                kind: NotificationKind::ShareDeclined,
                provider_id: "p1".to_string(),
                sender_host: "sender.example.com".to_string(),
                recipient_user_id: "u1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
