//! Identity tokens.
//!
//! A token binds an identity to this server using HMAC-SHA256:
//! - 32 bytes: identity
//! - 32 bytes: HMAC-SHA256(secret, identity)
//!
//! Total: 64 bytes, hex-encoded for transport.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use ripple_protocol::Identity;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_BYTES: usize = 64;

/// Issues and verifies identity tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
}

impl TokenIssuer {
    /// Creates an issuer with the given secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Creates a token for an identity.
    pub fn issue(&self, identity: &Identity) -> ServerResult<String> {
        let mac = self.mac(identity)?.finalize().into_bytes();
        let mut token = identity.to_hex();
        token.extend(mac.iter().map(|b| format!("{b:02x}")));
        Ok(token)
    }

    /// Verifies a token and returns the identity it was issued for.
    pub fn verify(&self, token: &str) -> ServerResult<Identity> {
        let bytes = decode_hex(token.trim())
            .filter(|b| b.len() == TOKEN_BYTES)
            .ok_or_else(|| ServerError::NotAuthorized("malformed token".into()))?;

        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes[..32]);
        let identity = Identity::from_bytes(id);

        self.mac(&identity)?
            .verify_slice(&bytes[32..])
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;
        Ok(identity)
    }

    fn mac(&self, identity: &Identity) -> ServerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServerError::Internal(format!("hmac key: {e}")))?;
        mac.update(identity.as_bytes());
        Ok(mac)
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").finish_non_exhaustive()
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-secret-key-32-bytes-long!!".to_vec())
    }

    #[test]
    fn issue_and_verify() {
        let identity = Identity::from_bytes([7u8; 32]);
        let token = issuer().issue(&identity).unwrap();
        assert_eq!(token.len(), 128);
        assert!(token.starts_with(&identity.to_hex()));

        assert_eq!(issuer().verify(&token).unwrap(), identity);
    }

    #[test]
    fn reject_foreign_secret() {
        let identity = Identity::from_bytes([7u8; 32]);
        let token = TokenIssuer::new(b"other".to_vec()).issue(&identity).unwrap();
        assert!(matches!(
            issuer().verify(&token),
            Err(ServerError::NotAuthorized(_))
        ));
    }

    #[test]
    fn reject_tampered_identity() {
        let token = issuer().issue(&Identity::from_bytes([7u8; 32])).unwrap();
        let forged = format!("{}{}", Identity::from_bytes([8u8; 32]).to_hex(), &token[64..]);
        assert!(issuer().verify(&forged).is_err());
    }

    #[test]
    fn reject_malformed() {
        let short = "a".repeat(126);
        let non_ascii = "é".repeat(64);
        for token in ["", "abc", "zz", short.as_str(), non_ascii.as_str()] {
            assert!(
                matches!(issuer().verify(token), Err(ServerError::NotAuthorized(_))),
                "accepted {token:?}"
            );
        }
    }
}
