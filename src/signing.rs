//! Outbound signing policy.

use crate::{
    compat::{PeerProfile, Quirk},
    discovery::Discovery,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Shares,
    Notifications,
    Invites,
    TokenExchange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundMode {
    Off,
    Strict,
    TokenOnly,
    CriteriaOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerProfileOverride {
    Off,
    All,
    NonStrict,
}

#[derive(Debug, Clone, Copy)]
pub struct SigningPolicyConfig {
    pub mode: OutboundMode,
    pub profile_override: PeerProfileOverride,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShouldSign {
    pub should_sign: bool,
    pub reason: String,
    pub error: Option<String>,
}

impl ShouldSign {
    fn sign(reason: impl Into<String>) -> Self {
        Self {
            should_sign: true,
            reason: reason.into(),
            error: None,
        }
    }

    fn dont_sign(reason: impl Into<String>) -> Self {
        Self {
            should_sign: false,
            reason: reason.into(),
            error: None,
        }
    }

    fn sign_but_cannot(reason: impl Into<String>) -> Self {
        Self {
            should_sign: true,
            reason: reason.into(),
            error: Some("signing required but no signer is configured".to_string()),
        }
    }
}

/// Whether the profile is allowed to relax signing under `override_mode`, given `mode`.
/// `non_strict` lets `outboundMode=strict` still enforce signing, but allows relaxations when
/// the mode itself is already relaxed (`criteria-only`/`token-only`).
fn profile_relaxation_applies(override_mode: PeerProfileOverride, mode: OutboundMode) -> bool {
    match override_mode {
        PeerProfileOverride::Off => false,
        PeerProfileOverride::All => true,
        PeerProfileOverride::NonStrict => mode != OutboundMode::Strict,
    }
}

/// Decides whether an outbound request of `kind` to `peer_domain` must be signed.
pub fn should_sign(
    config: SigningPolicyConfig,
    kind: EndpointKind,
    profile: &PeerProfile,
    discovery: Option<&Discovery>,
    has_signer: bool,
) -> ShouldSign {
    let peer_requires_signatures = discovery.is_some_and(|d| d.has_criteria("http-request-signatures"));
    let relaxation_applies = profile_relaxation_applies(config.profile_override, config.mode);

    let decision = match config.mode {
        OutboundMode::Off => ShouldSign::dont_sign("signing disabled by configuration"),

        OutboundMode::Strict => {
            if peer_requires_signatures {
                ShouldSign::sign("peer requires signatures (criteria overrides profile relaxation)")
            } else if relaxation_applies && profile.allow_unsigned_outbound {
                ShouldSign::dont_sign("profile allows unsigned outbound under strict+all override")
            } else {
                ShouldSign::sign("strict mode requires signatures")
            }
        }

        OutboundMode::TokenOnly => match kind {
            EndpointKind::TokenExchange => {
                if peer_requires_signatures {
                    ShouldSign::sign("peer requires signatures (criteria overrides profile relaxation)")
                } else if relaxation_applies && profile.has_quirk(Quirk::AcceptPlainToken) {
                    ShouldSign::dont_sign("profile quirk accept_plain_token relaxes token-only signing")
                } else {
                    ShouldSign::sign("token-only mode always signs token exchange")
                }
            }
            _ => ShouldSign::dont_sign("token-only mode does not sign shares/notifications/invites"),
        },

        OutboundMode::CriteriaOnly => match kind {
            EndpointKind::TokenExchange => {
                if peer_requires_signatures {
                    ShouldSign::sign("peer requires signatures (criteria overrides profile relaxation)")
                } else if relaxation_applies && profile.has_quirk(Quirk::AcceptPlainToken) {
                    ShouldSign::dont_sign("profile quirk accept_plain_token relaxes criteria-only signing")
                } else {
                    ShouldSign::sign("criteria-only mode always signs token exchange")
                }
            }
            _ => {
                if peer_requires_signatures {
                    ShouldSign::sign("peer criteria requires http-request-signatures")
                } else {
                    ShouldSign::dont_sign("criteria-only mode: peer does not require signatures")
                }
            }
        },
    };

    if decision.should_sign && !has_signer {
        return ShouldSign::sign_but_cannot(decision.reason);
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(mode: OutboundMode, profile_override: PeerProfileOverride) -> SigningPolicyConfig {
        SigningPolicyConfig { mode, profile_override }
    }

    fn discovery_with_criteria(criteria: &[&str]) -> Discovery {
        Discovery {
            enabled: true,
            api_version: "1.1".to_string(),
            end_point: "https://peer.example.com".to_string(),
            provider: "peer".to_string(),
            token_end_point: None,
            resource_types: vec![],
            capabilities: vec!["http-sig".to_string()],
            criteria: criteria.iter().map(|s| s.to_string()).collect(),
            public_keys: vec![],
            invite_accept_dialog: None,
        }
    }

    #[test]
    fn off_never_signs_regardless_of_signer() {
        let d = should_sign(
            cfg(OutboundMode::Off, PeerProfileOverride::All),
            EndpointKind::Shares,
            &PeerProfile::strict(),
            None,
            false,
        );
        assert!(!d.should_sign);
        assert!(d.error.is_none());
    }

    #[test]
    fn strict_without_signer_always_errors() {
        for kind in [
            EndpointKind::Shares,
            EndpointKind::Notifications,
            EndpointKind::Invites,
            EndpointKind::TokenExchange,
        ] {
            let d = should_sign(
                cfg(OutboundMode::Strict, PeerProfileOverride::Off),
                kind,
                &PeerProfile::strict(),
                None,
                false,
            );
            assert!(d.should_sign);
            assert!(d.error.is_some());
        }
    }

    #[test]
    fn criteria_overrides_profile_relaxation_guardrail() {
        let profile = PeerProfile {
            allow_unsigned_outbound: true,
            ..PeerProfile::strict()
        };
        let disc = discovery_with_criteria(&["http-request-signatures"]);
        let d = should_sign(
            cfg(OutboundMode::Strict, PeerProfileOverride::All),
            EndpointKind::Shares,
            &profile,
            Some(&disc),
            true,
        );
        assert!(d.should_sign);
        assert_eq!(d.reason, "peer requires signatures (criteria overrides profile relaxation)");
        assert!(d.error.is_none());
    }

    #[test]
    fn strict_with_all_override_and_relaxed_profile_skips_signing() {
        let profile = PeerProfile {
            allow_unsigned_outbound: true,
            ..PeerProfile::strict()
        };
        let d = should_sign(
            cfg(OutboundMode::Strict, PeerProfileOverride::All),
            EndpointKind::Shares,
            &profile,
            None,
            true,
        );
        assert!(!d.should_sign);
    }

    #[test]
    fn token_only_never_signs_shares() {
        let d = should_sign(
            cfg(OutboundMode::TokenOnly, PeerProfileOverride::Off),
            EndpointKind::Shares,
            &PeerProfile::strict(),
            None,
            true,
        );
        assert!(!d.should_sign);
    }

    #[test]
    fn token_only_always_signs_token_exchange_without_relaxation() {
        let d = should_sign(
            cfg(OutboundMode::TokenOnly, PeerProfileOverride::Off),
            EndpointKind::TokenExchange,
            &PeerProfile::nextcloud(),
            None,
            true,
        );
        assert!(d.should_sign);
    }

    #[test]
    fn token_only_relaxes_via_accept_plain_token_quirk() {
        let d = should_sign(
            cfg(OutboundMode::TokenOnly, PeerProfileOverride::NonStrict),
            EndpointKind::TokenExchange,
            &PeerProfile::nextcloud(),
            None,
            true,
        );
        assert!(!d.should_sign);
    }

    #[test]
    fn criteria_only_signs_shares_iff_peer_requires_it() {
        let without = should_sign(
            cfg(OutboundMode::CriteriaOnly, PeerProfileOverride::Off),
            EndpointKind::Shares,
            &PeerProfile::strict(),
            None,
            true,
        );
        assert!(!without.should_sign);

        let disc = discovery_with_criteria(&["http-request-signatures"]);
        let with = should_sign(
            cfg(OutboundMode::CriteriaOnly, PeerProfileOverride::Off),
            EndpointKind::Shares,
            &PeerProfile::strict(),
            Some(&disc),
            true,
        );
        assert!(with.should_sign);
    }
}
