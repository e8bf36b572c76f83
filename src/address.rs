//! OCM address codec: `identifier@provider` parsing, the outgoing emission format, and
//! federated opaque ID encode/decode.

use base64::{
    alphabet,
    engine::{general_purpose::PAD, GeneralPurpose},
    Engine as _,
};

/// Padded, URL-safe base64 (`-`/`_`, `=` padding) — the only encoding this codec ever emits.
const B64URL_PADDED: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, PAD);

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is not of the form identifier@provider")]
    InvalidAddress,
    #[error("federated opaque id did not decode to a valid base64url-padded address")]
    InvalidFederatedOpaqueId,
}

/// A parsed OCM address: identifier (case-preserved) and provider authority
/// (lowercased for comparison).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub identifier: String,
    pub provider: String,
}

/// Splits `s` on the *last* `@` (the identifier itself may contain `@`, e.g. an
/// email address).
pub fn parse(s: &str) -> Result<Address, AddressError> {
    let idx = s.rfind('@').ok_or(AddressError::InvalidAddress)?;
    let (identifier, provider) = (&s[..idx], &s[idx + 1..]);
    if identifier.is_empty() || provider.is_empty() {
        return Err(AddressError::InvalidAddress);
    }
    Ok(Address {
        identifier: identifier.to_string(),
        provider: provider.to_lowercase(),
    })
}

/// Emits the outgoing "Reva-style" address the core uses for owner/sender fields:
/// `base64url-padded(userID) "@" provider`.
pub fn format_outgoing(user_id: &str, provider: &str) -> String {
    format!("{}@{provider}", B64URL_PADDED.encode(user_id))
}

/// Encodes a federated opaque ID: a single opaque token, `base64url-padded(userID "@" idp)`,
/// with no trailing `@provider`.
pub fn encode_federated_opaque_id(user_id: &str, idp: &str) -> String {
    B64URL_PADDED.encode(format!("{user_id}@{idp}"))
}

/// Decodes a federated opaque ID produced by [`encode_federated_opaque_id`].
///
/// Standard (non-URL-safe) base64 characters `+`/`/` in the input imply it is not a federated
/// opaque ID at all, so callers should skip this decode path entirely rather than attempt it
/// this function still rejects such input, but callers checking first avoids
/// spurious classification work.
pub fn decode_federated_opaque_id(s: &str) -> Result<(String, String), AddressError> {
    if s.contains('+') || s.contains('/') {
        return Err(AddressError::InvalidFederatedOpaqueId);
    }
    let decoded = B64URL_PADDED
        .decode(s)
        .map_err(|_| AddressError::InvalidFederatedOpaqueId)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AddressError::InvalidFederatedOpaqueId)?;
    let idx = decoded
        .rfind('@')
        .ok_or(AddressError::InvalidFederatedOpaqueId)?;
    let (user_id, idp) = (&decoded[..idx], &decoded[idx + 1..]);
    if user_id.is_empty() || idp.is_empty() {
        return Err(AddressError::InvalidFederatedOpaqueId);
    }
    Ok((user_id.to_string(), idp.to_string()))
}

/// True if `identifier` uses characters that only appear in standard (non-URL-safe) base64,
/// meaning a federated-opaque-ID decode attempt should be skipped.
pub fn looks_like_standard_base64(identifier: &str) -> bool {
    identifier.contains('+') || identifier.contains('/')
}
