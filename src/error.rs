//! Crate-wide error plumbing.
//!
//! Individual subsystems (config, discovery, ingest, token, webdav, ...) define their own
//! `thiserror` enums; this module only holds the erased-cause alias they all share and the
//! closed reason-code taxonomy used to classify peer-interaction failures.

use std::fmt;

/// Type-erased error cause, for transport errors whose underlying cause varies by backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable, closed taxonomy of peer-interaction failure reasons.
///
/// This is consumed by the compat layer's classifier, the outbound orchestrator's quirk
/// selection, and the API layer's status-code mapping. New variants are a breaking change by
/// design: callers match exhaustively via `reason_code()` helpers rather than string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ReasonCode {
    SignatureRequired,
    SignatureInvalid,
    SignatureMismatch,
    DigestMismatch,
    KeyIdMismatch,
    KeyNotFound,
    TokenExchangeFailed,
    TokenInvalidFormat,
    TokenExpired,
    DiscoveryFailed,
    DiscoveryTimeout,
    PeerCapabilityMissing,
    NetworkError,
    PeerUnreachable,
    SsrfBlocked,
    TlsError,
    ProtocolMismatch,
    UnsupportedVersion,
    RemoteError,
    Unknown,
}

impl ReasonCode {
    /// Stable wire/log identifier for this reason, e.g. for inclusion in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignatureRequired => "signature_required",
            Self::SignatureInvalid => "signature_invalid",
            Self::SignatureMismatch => "signature_mismatch",
            Self::DigestMismatch => "digest_mismatch",
            Self::KeyIdMismatch => "keyid_mismatch",
            Self::KeyNotFound => "key_not_found",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::TokenInvalidFormat => "token_invalid_format",
            Self::TokenExpired => "token_expired",
            Self::DiscoveryFailed => "discovery_failed",
            Self::DiscoveryTimeout => "discovery_timeout",
            Self::PeerCapabilityMissing => "peer_capability_missing",
            Self::NetworkError => "network_error",
            Self::PeerUnreachable => "peer_unreachable",
            Self::SsrfBlocked => "ssrf_blocked",
            Self::TlsError => "tls_error",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::UnsupportedVersion => "unsupported_version",
            Self::RemoteError => "remote_error",
            Self::Unknown => "unknown",
        }
    }

    /// Case-insensitive substring classification table.
    ///
    /// Order matters: more specific patterns are listed before the generic ones they would
    /// otherwise shadow.
    fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        const TABLE: &[(&str, ReasonCode)] = &[
            ("signature required", ReasonCode::SignatureRequired),
            ("signature invalid", ReasonCode::SignatureInvalid),
            ("signature mismatch", ReasonCode::SignatureMismatch),
            ("digest mismatch", ReasonCode::DigestMismatch),
            ("keyid mismatch", ReasonCode::KeyIdMismatch),
            ("key not found", ReasonCode::KeyNotFound),
            ("token expired", ReasonCode::TokenExpired),
            ("invalid_grant", ReasonCode::TokenExchangeFailed),
            ("invalid_client", ReasonCode::TokenExchangeFailed),
            ("token exchange", ReasonCode::TokenExchangeFailed),
            ("invalid token format", ReasonCode::TokenInvalidFormat),
            ("discovery timed out", ReasonCode::DiscoveryTimeout),
            ("discovery failed", ReasonCode::DiscoveryFailed),
            ("capability missing", ReasonCode::PeerCapabilityMissing),
            ("ssrf", ReasonCode::SsrfBlocked),
            ("tls", ReasonCode::TlsError),
            ("protocol mismatch", ReasonCode::ProtocolMismatch),
            ("unsupported version", ReasonCode::UnsupportedVersion),
            ("unreachable", ReasonCode::PeerUnreachable),
            ("connection refused", ReasonCode::PeerUnreachable),
            ("timed out", ReasonCode::NetworkError),
            ("network", ReasonCode::NetworkError),
        ];
        TABLE
            .iter()
            .find(|(needle, _)| lower.contains(needle))
            .map_or(Self::Unknown, |(_, code)| *code)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A peer-interaction failure classified into the stable [`ReasonCode`] taxonomy. Carries its
/// cause so `std::error::Error::source` keeps working for callers that want the original error.
#[derive(Debug)]
pub struct ClassifiedError {
    pub reason_code: ReasonCode,
    pub message: String,
    pub cause: Option<BoxError>,
}

impl ClassifiedError {
    pub fn new(reason_code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason_code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Classifies an arbitrary error: prefer an already-attached reason code (when the source
    /// chain contains a `ClassifiedError`), otherwise fall back to substring matching against
    /// the message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let reason_code = ReasonCode::from_message(&message);
        Self::new(reason_code, message)
    }

    pub fn classify_with_cause<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let message = cause.to_string();
        Self::classify(message).with_cause(cause)
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.reason_code, self.message)
    }
}

impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as _)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_substrings_case_insensitively() {
        let e = ClassifiedError::classify("Signature Required by peer");
        assert_eq!(e.reason_code, ReasonCode::SignatureRequired);
    }

    #[test]
    fn falls_back_to_unknown() {
        let e = ClassifiedError::classify("the dog ate the request");
        assert_eq!(e.reason_code, ReasonCode::Unknown);
    }

    #[test]
    fn oauth_error_bodies_map_to_token_exchange_failed() {
        assert_eq!(
            ClassifiedError::classify("invalid_grant").reason_code,
            ReasonCode::TokenExchangeFailed
        );
        assert_eq!(
            ClassifiedError::classify("invalid_client").reason_code,
            ReasonCode::TokenExchangeFailed
        );
    }
}
