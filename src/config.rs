//! Process-wide configuration, loaded once from TOML at startup and handed to the rest of the
//! process as a read-only `Arc`.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    compat::{PeerProfile, ProfileMapping},
    signing::{OutboundMode, PeerProfileOverride, SigningPolicyConfig},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] config::ConfigError),
    #[error("tokenExchange.path must be a relative path with no scheme and no \"..\" segment, got {0:?}")]
    InvalidTokenExchangePath(String),
    #[error("listenAddr {0:?} is not a valid socket address")]
    InvalidListenAddr(String),
}

/// This instance's own identity and network binding.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Origin this instance advertises to peers, e.g. in discovery documents and keyIds.
    #[serde(rename = "publicOrigin")]
    pub public_origin: String,
    /// Path prefix this instance's OCM routes are mounted under, when fronted by a reverse
    /// proxy that rewrites paths. Empty string means mounted at the root.
    #[serde(default, rename = "externalBasePath")]
    pub external_base_path: String,
    /// Address the HTTP server binds to, e.g. `"0.0.0.0:8080"`.
    #[serde(rename = "listenAddr")]
    pub listen_addr: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum OutboundModeToml {
    Off,
    Strict,
    TokenOnly,
    CriteriaOnly,
}

impl From<OutboundModeToml> for OutboundMode {
    fn from(value: OutboundModeToml) -> Self {
        match value {
            OutboundModeToml::Off => OutboundMode::Off,
            OutboundModeToml::Strict => OutboundMode::Strict,
            OutboundModeToml::TokenOnly => OutboundMode::TokenOnly,
            OutboundModeToml::CriteriaOnly => OutboundMode::CriteriaOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum PeerProfileOverrideToml {
    Off,
    All,
    NonStrict,
}

impl From<PeerProfileOverrideToml> for PeerProfileOverride {
    fn from(value: PeerProfileOverrideToml) -> Self {
        match value {
            PeerProfileOverrideToml::Off => PeerProfileOverride::Off,
            PeerProfileOverrideToml::All => PeerProfileOverride::All,
            PeerProfileOverrideToml::NonStrict => PeerProfileOverride::NonStrict,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignatureConfig {
    #[serde(rename = "outboundMode")]
    outbound_mode: OutboundModeToml,
    #[serde(rename = "peerProfileLevelOverride")]
    peer_profile_level_override: PeerProfileOverrideToml,
    #[serde(default, rename = "advertiseHTTPRequestSignatures")]
    pub advertise_http_request_signatures: bool,
}

impl SignatureConfig {
    pub fn policy(&self) -> SigningPolicyConfig {
        SigningPolicyConfig {
            mode: self.outbound_mode.into(),
            profile_override: self.peer_profile_level_override.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeConfig {
    #[serde(default = "default_token_exchange_enabled")]
    pub enabled: bool,
    #[serde(default = "default_token_exchange_path")]
    pub path: String,
}

fn default_token_exchange_enabled() -> bool {
    true
}

fn default_token_exchange_path() -> String {
    "ocm/token".to_string()
}

impl TokenExchangeConfig {
    /// `path` must be relative, contain no `..` segment, and carry no scheme — it is appended
    /// to this instance's own origin, never used to build a foreign URL.
    fn validate(&self) -> Result<(), Error> {
        let path = &self.path;
        let looks_absolute = path.starts_with('/') || path.contains("://");
        let has_dotdot = path.split('/').any(|segment| segment == "..");
        if looks_absolute || has_dotdot || path.is_empty() {
            return Err(Error::InvalidTokenExchangePath(path.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WebdavTokenExchangeMode {
    /// Accepted credential shape is judged strictly against RFC semantics.
    Strict,
    /// Absent a matching peer profile, behaves identically to `strict`.
    Lenient,
    /// WebDAV access always requires a previously exchanged token; the shared secret alone is
    /// never accepted as a credential, regardless of peer profile.
    Enforced,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebdavConfig {
    #[serde(rename = "webdavTokenExchangeMode")]
    pub webdav_token_exchange_mode: WebdavTokenExchangeMode,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SsrfMode {
    /// No additional restriction beyond what the HTTP client enforces structurally.
    Off,
    /// Reject requests whose resolved address is private/loopback/link-local.
    BlockPrivateNetworks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboundHttpConfig {
    #[serde(default = "default_ssrf_mode", rename = "ssrfMode")]
    pub ssrf_mode: SsrfMode,
    #[serde(rename = "timeoutMs")]
    timeout_ms: u64,
    #[serde(rename = "connectTimeoutMs")]
    connect_timeout_ms: u64,
    #[serde(default = "default_max_redirects", rename = "maxRedirects")]
    pub max_redirects: u32,
    #[serde(rename = "maxResponseBytes")]
    max_response_bytes: u64,
    #[serde(default, rename = "insecureSkipVerify")]
    pub insecure_skip_verify: bool,
}

fn default_ssrf_mode() -> SsrfMode {
    SsrfMode::BlockPrivateNetworks
}

fn default_max_redirects() -> u32 {
    0
}

impl OutboundHttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes.try_into().unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrustGroupCacheConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "ttlSeconds")]
    ttl_seconds: u64,
    #[serde(rename = "maxStaleSeconds")]
    max_stale_seconds: u64,
    #[serde(rename = "refreshTimeoutSecondsPerDirectoryService")]
    refresh_timeout_seconds_per_directory_service: u64,
}

fn default_true() -> bool {
    true
}

impl TrustGroupCacheConfig {
    pub fn to_trust_group_config(&self) -> crate::trust::TrustGroupConfig {
        crate::trust::TrustGroupConfig {
            name: self.name.clone(),
            enabled: self.enabled,
            ttl: Duration::from_secs(self.ttl_seconds),
            max_stale: Duration::from_secs(self.max_stale_seconds),
            timeout_per_directory_service: Duration::from_secs(
                self.refresh_timeout_seconds_per_directory_service,
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeerCompatConfig {
    #[serde(default)]
    pub profiles: Vec<PeerProfile>,
    #[serde(default)]
    pub mappings: Vec<ProfileMapping>,
}

/// Top-level configuration, parsed once at process start.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub instance: InstanceConfig,
    pub signature: SignatureConfig,
    #[serde(rename = "tokenExchange")]
    pub token_exchange: TokenExchangeConfig,
    pub webdav: WebdavConfig,
    #[serde(rename = "outboundHTTP")]
    pub outbound_http: OutboundHttpConfig,
    #[serde(default, rename = "trustGroups")]
    pub trust_groups: Vec<TrustGroupCacheConfig>,
    #[serde(default, rename = "peerCompat")]
    pub peer_compat: PeerCompatConfig,
}

impl Config {
    /// Reads configuration from a TOML string. To read a file, use `tokio::fs::read_to_string`
    /// first and pass the contents here.
    pub fn from_toml_str(input: &str) -> Result<Self, Error> {
        use config::{Config as RawConfig, File, FileFormat};

        let conf: Self = RawConfig::builder()
            .add_source(File::from_str(input, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        conf.token_exchange.validate()?;
        Ok(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[instance]
publicOrigin = "https://ocm.example.com"
listenAddr = "0.0.0.0:8080"

[signature]
outboundMode = "strict"
peerProfileLevelOverride = "off"

[tokenExchange]
enabled = true
path = "ocm/token"

[webdav]
webdavTokenExchangeMode = "strict"

[outboundHTTP]
timeoutMs = 5000
connectTimeoutMs = 2000
maxResponseBytes = 1048576
"#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let conf = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(conf.instance.public_origin, "https://ocm.example.com");
        assert_eq!(conf.instance.external_base_path, "");
        assert_eq!(conf.outbound_http.ssrf_mode, SsrfMode::BlockPrivateNetworks);
        assert_eq!(conf.outbound_http.max_redirects, 0);
        assert!(conf.trust_groups.is_empty());
        assert!(conf.peer_compat.profiles.is_empty());
    }

    #[test]
    fn rejects_absolute_token_exchange_path() {
        let bad = MINIMAL.replace(r#"path = "ocm/token""#, r#"path = "/ocm/token""#);
        let err = Config::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, Error::InvalidTokenExchangePath(_)));
    }

    #[test]
    fn rejects_token_exchange_path_with_dotdot_segment() {
        let bad = MINIMAL.replace(r#"path = "ocm/token""#, r#"path = "ocm/../token""#);
        let err = Config::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, Error::InvalidTokenExchangePath(_)));
    }

    #[test]
    fn rejects_token_exchange_path_with_scheme() {
        let bad = MINIMAL.replace(
            r#"path = "ocm/token""#,
            r#"path = "https://evil.example.com/token""#,
        );
        let err = Config::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, Error::InvalidTokenExchangePath(_)));
    }

    #[test]
    fn outbound_http_durations_convert_from_millis() {
        let conf = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(conf.outbound_http.timeout(), Duration::from_millis(5000));
        assert_eq!(conf.outbound_http.connect_timeout(), Duration::from_millis(2000));
        assert_eq!(conf.outbound_http.max_response_bytes(), 1_048_576);
    }

    #[test]
    fn trust_group_entry_converts_seconds_to_durations() {
        let with_groups = format!(
            "{MINIMAL}\n[[trustGroups]]\nname = \"g1\"\nttlSeconds = 300\nmaxStaleSeconds = 3600\nrefreshTimeoutSecondsPerDirectoryService = 5\n"
        );
        let conf = Config::from_toml_str(&with_groups).unwrap();
        let group = conf.trust_groups[0].to_trust_group_config();
        assert_eq!(group.ttl, Duration::from_secs(300));
        assert_eq!(group.max_stale, Duration::from_secs(3600));
    }
}
