//! Minting and signing material for the broker's secrets.
//!
//! Three kinds of secret originate here: caller API keys (plaintext
//! crosses the channel once, the database keeps prefix and hash), Git
//! session secrets (the hash authenticates wire calls, the plaintext
//! feeds the one-time remote reveal), and HMAC signatures over outbound
//! channel payloads. Nothing in this module persists anything.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

use crate::hashing::{sha256_hex, to_hex};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Characters in a minted caller API key.
pub const KEY_LENGTH: usize = 48;

/// Leading key characters kept as the human-visible prefix.
pub const KEY_PREFIX_LENGTH: usize = 8;

/// Characters in a one-time Git session secret.
pub const SESSION_SECRET_LENGTH: usize = 48;

// ---------------------------------------------------------------------------
// Minting
// ---------------------------------------------------------------------------

/// A freshly minted caller API key.
pub struct MintedKey {
    /// Shown to the owner exactly once, never stored.
    pub plaintext: String,
    /// First [`KEY_PREFIX_LENGTH`] characters, for listings and audit rows.
    pub prefix: String,
    /// SHA-256 hex digest of the plaintext; the only stored form.
    pub hash: String,
}

/// Mint a caller API key.
pub fn mint_api_key() -> MintedKey {
    let plaintext = random_alphanumeric(KEY_LENGTH);
    MintedKey {
        prefix: plaintext[..KEY_PREFIX_LENGTH].to_string(),
        hash: hash_secret(&plaintext),
        plaintext,
    }
}

/// Mint the secret embedded in a session's one-time remote URL.
///
/// Alphanumeric so it drops into a URL path segment without escaping.
pub fn generate_session_secret() -> String {
    random_alphanumeric(SESSION_SECRET_LENGTH)
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// The storage and lookup digest for any broker secret.
///
/// Caller keys and session secrets are both found by this hash, so the
/// plaintext never needs to exist outside the presenting call.
pub fn hash_secret(secret: &str) -> String {
    sha256_hex(secret.as_bytes())
}

// ---------------------------------------------------------------------------
// Channel signing
// ---------------------------------------------------------------------------

type HmacSha256 = Hmac<Sha256>;

/// Sign an outbound channel payload with the shared webhook secret.
///
/// The receiving chat backend recomputes this over the raw body before
/// rendering anything to the owner, so a forged POST cannot put words
/// in the broker's mouth. Hex-encoded HMAC-SHA256.
pub fn compute_channel_hmac(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    to_hex(&mac.finalize().into_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_keys_are_alphanumeric_and_sized() {
        let key = mint_api_key();
        assert_eq!(key.plaintext.len(), KEY_LENGTH);
        assert!(key.plaintext.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn the_prefix_is_the_start_of_the_plaintext() {
        let key = mint_api_key();
        assert_eq!(key.prefix.len(), KEY_PREFIX_LENGTH);
        assert!(key.plaintext.starts_with(&key.prefix));
    }

    #[test]
    fn the_stored_hash_re_derives_from_the_plaintext() {
        let key = mint_api_key();
        assert_eq!(key.hash, hash_secret(&key.plaintext));
        assert_eq!(key.hash.len(), 64);
        assert!(key.hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn two_mints_never_collide() {
        let a = mint_api_key();
        let b = mint_api_key();
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn session_secrets_are_url_safe_and_unique() {
        let secret = generate_session_secret();
        assert_eq!(secret.len(), SESSION_SECRET_LENGTH);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(secret, generate_session_secret());
    }

    #[test]
    fn hashing_is_stable_per_input() {
        assert_eq!(hash_secret("swordfish"), hash_secret("swordfish"));
        assert_ne!(hash_secret("swordfish"), hash_secret("sword fish"));
    }

    #[test]
    fn channel_signatures_are_hex_and_deterministic() {
        let sig = compute_channel_hmac("signing-secret", r#"{"type":"notice"}"#);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            sig,
            compute_channel_hmac("signing-secret", r#"{"type":"notice"}"#)
        );
    }

    #[test]
    fn channel_signatures_bind_secret_and_payload() {
        let base = compute_channel_hmac("signing-secret", "payload");
        assert_ne!(base, compute_channel_hmac("other-secret", "payload"));
        assert_ne!(base, compute_channel_hmac("signing-secret", "other payload"));
    }
}
