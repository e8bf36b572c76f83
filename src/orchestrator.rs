//! Outbound orchestrator: strict-first attempt with at most one quirk fallback,
//! used for token exchange and share send.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    compat::{select_quirk, PeerProfile, Quirk},
    error::{ClassifiedError, ReasonCode},
    http_client::{HttpClient, HttpRequest},
};

/// Which variant of the outbound call to make: the RFC-correct "strict" attempt (signed or
/// not, per the caller's signing decision), or exactly one named quirk fallback.
#[derive(Debug, Clone, Copy)]
pub enum AttemptKind {
    Strict { signed: bool },
    Quirk(Quirk),
}

#[derive(Debug, Clone)]
pub struct ExecutionResult<T> {
    pub output: T,
    /// Empty iff the strict attempt succeeded.
    pub quirk_applied: Option<Quirk>,
}

/// Runs `attempt` once in strict mode; on failure, classifies the error, looks up the single
/// applicable quirk (if any) for `profile`, and runs `attempt` exactly once more with that
/// quirk. Never retries more than once and never combines quirks.
pub async fn execute<T, F, Fut>(
    profile: &PeerProfile,
    signed: bool,
    attempt: F,
) -> Result<ExecutionResult<T>, ClassifiedError>
where
    F: Fn(AttemptKind) -> Fut,
    Fut: Future<Output = Result<T, ClassifiedError>>,
{
    match attempt(AttemptKind::Strict { signed }).await {
        Ok(output) => Ok(ExecutionResult {
            output,
            quirk_applied: None,
        }),
        Err(strict_err) => match select_quirk(profile, strict_err.reason_code) {
            Some(quirk) => match attempt(AttemptKind::Quirk(quirk)).await {
                Ok(output) => Ok(ExecutionResult {
                    output,
                    quirk_applied: Some(quirk),
                }),
                Err(quirk_err) => Err(quirk_err),
            },
            None => Err(strict_err),
        },
    }
}

// ---------------------------------------------------------------------------------------------
// Token exchange wire shape
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct TokenExchangeFields<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    code: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeSuccess {
    pub access_token: String,
    #[allow(dead_code)]
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[allow(dead_code)]
    error_description: Option<String>,
}

const MAX_TOKEN_RESPONSE_BYTES: usize = 1024 * 1024;

fn oauth_error_to_reason(error: &str) -> ReasonCode {
    match error {
        "invalid_grant" | "invalid_client" => ReasonCode::TokenExchangeFailed,
        "unauthorized" => ReasonCode::SignatureRequired,
        _ => ReasonCode::TokenExchangeFailed,
    }
}

/// Builds the outbound token-exchange request body for the given attempt kind: form-urlencoded
/// by default, JSON when the `send_token_in_body` quirk is in play.
fn build_token_exchange_request(
    token_endpoint: &str,
    grant_type: &str,
    client_id: &str,
    code: &str,
    as_json: bool,
) -> HttpRequest {
    let fields = TokenExchangeFields {
        grant_type,
        client_id,
        code,
    };
    if as_json {
        let body = serde_json::to_vec(&fields).expect("token exchange fields always serialize");
        HttpRequest::post(token_endpoint, body)
            .header("content-type", "application/json")
            .header("accept", "application/json")
    } else {
        let body = serde_urlencoded::to_string(&fields)
            .expect("token exchange fields always form-encode")
            .into_bytes();
        HttpRequest::post(token_endpoint, body)
            .header("content-type", "application/x-www-form-urlencoded")
            .header("accept", "application/json")
    }
}

async fn parse_token_exchange_response(
    http: &dyn HttpClient,
    request: HttpRequest,
    timeout: Duration,
) -> Result<TokenExchangeSuccess, ClassifiedError> {
    let response = http
        .send(request, timeout, MAX_TOKEN_RESPONSE_BYTES)
        .await
        .map_err(|e| ClassifiedError::classify(e.to_string()))?;

    if response.is_success() {
        serde_json::from_slice(&response.body)
            .map_err(|e| ClassifiedError::new(ReasonCode::TokenInvalidFormat, e.to_string()))
    } else if response.status >= 400 {
        match serde_json::from_slice::<OAuthErrorBody>(&response.body) {
            Ok(body) => Err(ClassifiedError::new(oauth_error_to_reason(&body.error), body.error)),
            Err(_) => Err(ClassifiedError::new(
                ReasonCode::TokenExchangeFailed,
                format!("token endpoint returned HTTP {}", response.status),
            )),
        }
    } else {
        Err(ClassifiedError::new(
            ReasonCode::Unknown,
            format!("unexpected token endpoint status {}", response.status),
        ))
    }
}

/// Performs the client-side outbound token exchange against a peer's token endpoint, with
/// strict-first + single-quirk-fallback semantics. `signed` reflects the
/// decision for the `tokenExchange` endpoint kind; signing the request itself is left to the
/// caller's signer collaborator before `http.send` — this function only varies the *body
/// shape* between attempts, since this crate does not implement RFC 9421 signing.
pub async fn exchange_token(
    http: &dyn HttpClient,
    profile: &PeerProfile,
    token_endpoint: &str,
    client_id: &str,
    code: &str,
    signed: bool,
    timeout: Duration,
) -> Result<ExecutionResult<TokenExchangeSuccess>, ClassifiedError> {
    let grant_type = profile.token_exchange_grant_type.as_str();
    execute(profile, signed, |kind| async move {
        let as_json = matches!(kind, AttemptKind::Quirk(Quirk::SendTokenInBody));
        let request = build_token_exchange_request(token_endpoint, grant_type, client_id, code, as_json);
        parse_token_exchange_response(http, request, timeout).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{test_support::StubHttpClient, HttpResponse};

    fn ok_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "access_token": "abc123",
            "token_type": "Bearer",
            "expires_in": 3600
        }))
        .unwrap()
    }

    fn err_body(error: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "error": error })).unwrap()
    }

    #[tokio::test]
    async fn strict_success_reports_no_quirk_applied() {
        let http = StubHttpClient::new();
        http.push_response(HttpResponse {
            status: 200,
            headers: vec![],
            body: ok_body(),
        });
        let result = exchange_token(
            &http,
            &PeerProfile::strict(),
            "https://peer.example.com/ocm/token",
            "client",
            "code1",
            true,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(result.output.access_token, "abc123");
        assert!(result.quirk_applied.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_accept_plain_token_quirk_exactly_once() {
        let http = StubHttpClient::new();
        http.push_response(HttpResponse {
            status: 401,
            headers: vec![],
            body: err_body("unauthorized"),
        });
        http.push_response(HttpResponse {
            status: 200,
            headers: vec![],
            body: ok_body(),
        });
        let result = exchange_token(
            &http,
            &PeerProfile::nextcloud(),
            "https://peer.example.com/ocm/token",
            "client",
            "code1",
            true,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(result.quirk_applied, Some(Quirk::AcceptPlainToken));
        assert_eq!(http.requests().len(), 2);
    }

    #[tokio::test]
    async fn no_applicable_quirk_surfaces_strict_error() {
        let http = StubHttpClient::new();
        http.push_response(HttpResponse {
            status: 400,
            headers: vec![],
            body: err_body("invalid_grant"),
        });
        let err = exchange_token(
            &http,
            &PeerProfile::strict(),
            "https://peer.example.com/ocm/token",
            "client",
            "code1",
            true,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.reason_code, ReasonCode::TokenExchangeFailed);
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn quirk_also_failing_returns_its_own_classification() {
        let http = StubHttpClient::new();
        http.push_response(HttpResponse {
            status: 401,
            headers: vec![],
            body: err_body("unauthorized"),
        });
        http.push_response(HttpResponse {
            status: 400,
            headers: vec![],
            body: err_body("invalid_client"),
        });
        let err = exchange_token(
            &http,
            &PeerProfile::nextcloud(),
            "https://peer.example.com/ocm/token",
            "client",
            "code1",
            true,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.reason_code, ReasonCode::TokenExchangeFailed);
    }

    #[tokio::test]
    async fn send_token_in_body_quirk_uses_json_content_type() {
        let http = StubHttpClient::new();
        http.push_response(HttpResponse {
            status: 400,
            headers: vec![],
            body: err_body("invalid_client"),
        });
        http.push_response(HttpResponse {
            status: 200,
            headers: vec![],
            body: ok_body(),
        });
        let mut profile = PeerProfile::strict();
        profile.token_exchange_quirks = vec![Quirk::SendTokenInBody.name().to_string()];
        exchange_token(
            &http,
            &profile,
            "https://peer.example.com/ocm/token",
            "client",
            "code1",
            true,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        let second_request = &http.requests()[1];
        assert!(second_request
            .headers
            .iter()
            .any(|(k, v)| k == "content-type" && v == "application/json"));
    }
}
