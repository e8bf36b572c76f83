//! Peer compatibility profiles & quirk catalog.
//!
//! The error taxonomy itself (`ReasonCode`, `ClassifiedError`) lives in [`crate::error`] so that
//! this module, [`crate::signing`], and [`crate::orchestrator`] can all depend on it without a
//! cycle.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{authority, error::ReasonCode};

/// A single named deviation from strict behavior, applied at most once by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Quirk {
    AcceptPlainToken,
    SendTokenInBody,
    SkipDigestValidation,
    AllowUnsignedDiscovery,
    AllowKeyIdMismatch,
}

impl Quirk {
    pub fn name(self) -> &'static str {
        match self {
            Self::AcceptPlainToken => "accept_plain_token",
            Self::SendTokenInBody => "send_token_in_body",
            Self::SkipDigestValidation => "skip_digest_validation",
            Self::AllowUnsignedDiscovery => "allow_unsigned_discovery",
            Self::AllowKeyIdMismatch => "allow_keyid_mismatch",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "accept_plain_token" => Some(Self::AcceptPlainToken),
            "send_token_in_body" => Some(Self::SendTokenInBody),
            "skip_digest_validation" => Some(Self::SkipDigestValidation),
            "allow_unsigned_discovery" => Some(Self::AllowUnsignedDiscovery),
            "allow_keyid_mismatch" => Some(Self::AllowKeyIdMismatch),
            _ => None,
        }
    }

    /// The reason codes this quirk is a valid fallback for.
    pub fn applies_to(self, reason: ReasonCode) -> bool {
        match self {
            Self::AcceptPlainToken => matches!(
                reason,
                ReasonCode::SignatureRequired | ReasonCode::TokenExchangeFailed
            ),
            Self::SendTokenInBody => matches!(reason, ReasonCode::TokenExchangeFailed),
            Self::SkipDigestValidation => matches!(reason, ReasonCode::DigestMismatch),
            Self::AllowUnsignedDiscovery => matches!(
                reason,
                ReasonCode::DiscoveryFailed | ReasonCode::SignatureRequired
            ),
            Self::AllowKeyIdMismatch => matches!(reason, ReasonCode::KeyIdMismatch),
        }
    }

    /// Catalog in declared order — the orchestrator walks it and takes the first applicable,
    /// profile-enabled quirk.
    pub const CATALOG: &'static [Quirk] = &[
        Self::AcceptPlainToken,
        Self::SendTokenInBody,
        Self::SkipDigestValidation,
        Self::AllowUnsignedDiscovery,
        Self::AllowKeyIdMismatch,
    ];
}

/// One of the four WebDAV Basic-auth credential shapes the core recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicAuthPattern {
    TokenColon,
    TokenColonToken,
    ColonToken,
    IdColonToken,
}

impl BasicAuthPattern {
    pub fn key(self) -> &'static str {
        match self {
            Self::TokenColon => "basic:token:",
            Self::TokenColonToken => "basic:token:token",
            Self::ColonToken => "basic::token",
            Self::IdColonToken => "basic:id:token",
        }
    }
}

/// `{name, allowUnsignedInbound, allowUnsignedOutbound, allowMismatchedHost, allowHTTP,
/// tokenExchangeQuirks[], tokenExchangeGrantType, relaxMustExchangeToken,
/// allowedBasicAuthPatterns[]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerProfile {
    pub name: String,
    #[serde(default)]
    pub allow_unsigned_inbound: bool,
    #[serde(default)]
    pub allow_unsigned_outbound: bool,
    #[serde(default)]
    pub allow_mismatched_host: bool,
    #[serde(default)]
    pub allow_http: bool,
    #[serde(default)]
    pub token_exchange_quirks: Vec<String>,
    #[serde(default = "default_grant_type")]
    pub token_exchange_grant_type: String,
    #[serde(default)]
    pub relax_must_exchange_token: bool,
    #[serde(default)]
    pub allowed_basic_auth_patterns: Vec<String>,
}

fn default_grant_type() -> String {
    "authorization_code".to_string()
}

impl PeerProfile {
    pub fn strict() -> Self {
        Self {
            name: "strict".to_string(),
            allow_unsigned_inbound: false,
            allow_unsigned_outbound: false,
            allow_mismatched_host: false,
            allow_http: false,
            token_exchange_quirks: vec![],
            token_exchange_grant_type: default_grant_type(),
            relax_must_exchange_token: false,
            allowed_basic_auth_patterns: vec![],
        }
    }

    pub fn nextcloud() -> Self {
        Self {
            name: "nextcloud".to_string(),
            token_exchange_quirks: vec![
                Quirk::AcceptPlainToken.name().to_string(),
                Quirk::SendTokenInBody.name().to_string(),
            ],
            token_exchange_grant_type: "ocm_share".to_string(),
            relax_must_exchange_token: true,
            ..Self::strict_named("nextcloud")
        }
    }

    pub fn owncloud() -> Self {
        Self {
            name: "owncloud".to_string(),
            token_exchange_quirks: vec![Quirk::AcceptPlainToken.name().to_string()],
            token_exchange_grant_type: "ocm_share".to_string(),
            relax_must_exchange_token: true,
            ..Self::strict_named("owncloud")
        }
    }

    pub fn dev() -> Self {
        Self {
            name: "dev".to_string(),
            allow_unsigned_inbound: true,
            allow_unsigned_outbound: true,
            allow_mismatched_host: true,
            allow_http: true,
            token_exchange_quirks: Quirk::CATALOG.iter().map(|q| q.name().to_string()).collect(),
            token_exchange_grant_type: "ocm_share".to_string(),
            relax_must_exchange_token: true,
            allowed_basic_auth_patterns: vec![],
        }
    }

    fn strict_named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::strict()
        }
    }

    /// `hasQuirk(name)` — scans `tokenExchangeQuirks`.
    pub fn has_quirk(&self, quirk: Quirk) -> bool {
        self.token_exchange_quirks.iter().any(|q| q == quirk.name())
    }

    /// `isBasicAuthPatternAllowed(key)` — empty list means all four patterns allowed.
    pub fn is_basic_auth_pattern_allowed(&self, pattern: BasicAuthPattern) -> bool {
        self.allowed_basic_auth_patterns.is_empty()
            || self
                .allowed_basic_auth_patterns
                .iter()
                .any(|p| p == pattern.key())
    }
}

/// Domain pattern used in the profile mapping: exact match, `*.domain` suffix glob, or
/// `prefix.*` prefix glob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMapping {
    pub pattern: String,
    pub profile_name: String,
}

fn pattern_matches(pattern: &str, domain: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return domain == suffix || domain.ends_with(&format!(".{suffix}"));
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return domain.starts_with(prefix) && domain[prefix.len()..].starts_with('.');
    }
    pattern == domain
}

/// Profile registry: ordered mappings plus named profile definitions, falling through to
/// `strict`.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: HashMap<String, PeerProfile>,
    mappings: Vec<ProfileMapping>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        for p in [
            PeerProfile::strict(),
            PeerProfile::nextcloud(),
            PeerProfile::owncloud(),
            PeerProfile::dev(),
        ] {
            profiles.insert(p.name.clone(), p);
        }
        Self {
            profiles,
            mappings: Vec::new(),
        }
    }
}

impl ProfileRegistry {
    pub fn new(profiles: Vec<PeerProfile>, mappings: Vec<ProfileMapping>) -> Self {
        let mut registry = Self::default();
        for p in profiles {
            registry.profiles.insert(p.name.clone(), p);
        }
        registry.mappings = mappings;
        registry
    }

    /// Looks up the profile for `peer_domain`: normalize (lowercase, strip port) then walk
    /// mappings in order; first match wins; fallthrough to `strict`.
    pub fn lookup(&self, peer_domain: &str) -> PeerProfile {
        let normalized = authority::normalize(peer_domain, "https");
        let profile_name = self
            .mappings
            .iter()
            .find(|m| pattern_matches(&m.pattern, &normalized))
            .map(|m| m.profile_name.as_str())
            .unwrap_or("strict");
        self.profiles
            .get(profile_name)
            .cloned()
            .unwrap_or_else(PeerProfile::strict)
    }
}

/// Returns the first quirk (in catalog order) that this profile enables and that applies to
/// `reason`, used by the orchestrator to pick the single fallback attempt.
pub fn select_quirk(profile: &PeerProfile, reason: ReasonCode) -> Option<Quirk> {
    Quirk::CATALOG
        .iter()
        .copied()
        .find(|q| profile.has_quirk(*q) && q.applies_to(reason))
}
