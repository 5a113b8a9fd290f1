//! Device Fingerprint
//!
//! Derives the opaque fingerprint string for anonymous identities from
//! client-reported attributes. The digest is keyed with a server-side
//! secret, so fingerprints computed against one deployment carry nothing
//! over to another. The quota engine treats the output as an opaque
//! string; only this module knows the derivation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable client attributes that feed the fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceAttributes {
    pub user_agent: String,
    pub accept_language: String,
    pub timezone: String,
    /// Screen geometry, e.g. `1920x1080x24`
    pub screen: String,
    pub platform: String,
}

/// Keyed SHA-256 fingerprint derivation
pub struct FingerprintHasher {
    secret: String,
}

impl FingerprintHasher {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
        }
    }

    /// Lowercase hex digest over the secret and the attribute fields in a
    /// fixed order, with a separator byte so field boundaries cannot be
    /// shifted.
    pub fn fingerprint(&self, attrs: &DeviceAttributes) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        for field in [
            &attrs.user_agent,
            &attrs.accept_language,
            &attrs.timezone,
            &attrs.screen,
            &attrs.platform,
        ] {
            hasher.update([0u8]);
            hasher.update(field.as_bytes());
        }

        let digest = hasher.finalize();
        let mut output = String::with_capacity(digest.len() * 2);
        for byte in digest {
            output.push(hex_char(byte >> 4));
            output.push(hex_char(byte & 0x0f));
        }
        output
    }
}

fn hex_char(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        10..=15 => (b'a' + (value - 10)) as char,
        _ => '0',
    }
}
