//! Outbound HTTP client capability boundary.
//!
//! The core never talks to `hyper` directly outside this module — every outbound call goes
//! through the narrow [`HttpClient`] trait. [`HyperHttpClient`] is the real implementation,
//! built on the `hyper` + `hyper-util` legacy client; tests use [`test_support::StubHttpClient`]
//! instead.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, header::HeaderName, Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::BoxError;

/// A fully-buffered outbound request. The core never streams outbound request bodies — they are
/// small JSON/form payloads.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: hyper::Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn get(uri: impl Into<String>) -> Self {
        Self {
            method: hyper::Method::GET,
            uri: uri.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn post(uri: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: hyper::Method::POST,
            uri: uri.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A fully-buffered response, capped at the caller's chosen size.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `request`, reads at most `max_body_bytes` of the response body, and returns an
    /// error for transport-level failures (connect, timeout, body-too-large); HTTP error status
    /// codes are returned as an `Ok(HttpResponse)` for the caller to interpret.
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<HttpResponse, BoxError>;
}

pub struct HyperHttpClient {
    inner: Client<HttpConnector, Full<Bytes>>,
}

impl Default for HyperHttpClient {
    fn default() -> Self {
        Self {
            inner: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
        }
    }
}

#[async_trait]
impl HttpClient for HyperHttpClient {
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<HttpResponse, BoxError> {
        let mut builder = Request::builder().method(request.method).uri(&request.uri);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let req = builder.body(Full::new(Bytes::from(request.body)))?;

        let fut = self.inner.request(req);
        let resp: Response<Incoming> = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| "request timed out")??;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();

        let collected = tokio::time::timeout(timeout, resp.into_body().collect())
            .await
            .map_err(|_| "response body read timed out")??;
        let body = collected.to_bytes();
        if body.len() > max_body_bytes {
            return Err("response body exceeded configured size limit".into());
        }

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[allow(dead_code)]
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection" | "keep-alive" | "transfer-encoding" | "upgrade"
    )
}

#[cfg(any(test, feature = "test-fixture"))]
pub mod test_support {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;

    use super::{HttpClient, HttpRequest, HttpResponse};
    use crate::error::BoxError;

    /// A scripted HTTP client: each call to [`StubHttpClient::send`] pops the next queued
    /// response (or error) in FIFO order, recording the request it was given.
    #[derive(Default)]
    pub struct StubHttpClient {
        responses: Mutex<Vec<Result<HttpResponse, String>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_response(&self, response: HttpResponse) {
            self.responses.lock().unwrap().push(Ok(response));
        }

        pub fn push_error(&self, message: impl Into<String>) {
            self.responses.lock().unwrap().push(Err(message.into()));
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for StubHttpClient {
        async fn send(
            &self,
            request: HttpRequest,
            _timeout: Duration,
            _max_body_bytes: usize,
        ) -> Result<HttpResponse, BoxError> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err("StubHttpClient: no more scripted responses".into());
            }
            match responses.remove(0) {
                Ok(resp) => Ok(resp),
                Err(msg) => Err(msg.into()),
            }
        }
    }
}
