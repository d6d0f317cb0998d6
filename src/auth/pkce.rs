use oauth2::{PkceCodeChallenge, PkceCodeVerifier};

/// A PKCE verifier/challenge pair (RFC 7636, S256 only).
///
/// The verifier stays with the pending authorization record and is only ever
/// sent to the token endpoint; the challenge is what appears in the
/// authorization redirect.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Cryptographically random code verifier, 43–128 characters from the
    /// unreserved URI alphabet.
    pub verifier: String,
    /// `BASE64URL(SHA-256(verifier))`, no padding.
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier and its S256 challenge.
    ///
    /// Failure of the process randomness source panics inside the generator;
    /// there is no meaningful recovery for a connection attempt at that
    /// point.
    pub fn generate() -> Self {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        Self {
            verifier: verifier.secret().clone(),
            challenge: challenge.as_str().to_string(),
        }
    }

    /// Re-derive the S256 challenge for a stored verifier.
    pub(crate) fn challenge_for(verifier: &str) -> PkceCodeChallenge {
        PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(verifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use sha2::{Digest, Sha256};

    use super::*;

    #[test]
    fn test_verifier_length_and_charset() {
        let pkce = PkceChallenge::generate();
        assert!(
            pkce.verifier.len() >= 43 && pkce.verifier.len() <= 128,
            "verifier length {} outside RFC 7636 bounds",
            pkce.verifier.len()
        );
        assert!(
            pkce.verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')),
            "verifier contains characters outside the PKCE alphabet"
        );
    }

    #[test]
    fn test_challenge_is_s256_of_verifier() {
        let pkce = PkceChallenge::generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes()));
        assert_eq!(pkce.challenge, expected);
    }

    #[test]
    fn test_generate_is_random() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();
        assert_ne!(a.verifier, b.verifier);
    }

    #[test]
    fn test_challenge_for_matches_generated_pair() {
        let pkce = PkceChallenge::generate();
        let rederived = PkceChallenge::challenge_for(&pkce.verifier);
        assert_eq!(rederived.as_str(), pkce.challenge);
    }
}
