// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS - CRYPTOGRAPHY MODULE
//
// ECDSA over NIST P-256 for block/transaction signing, SHA-256 for content
// and address hashing. Signatures are raw fixed-width `r||s` concatenation
// (32 bytes each), never DER — callers must not assume `len(sig) / 2` without
// the curve-order width guarantee documented on `sign`/`verify`.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Byte width of an uncompressed P-256 point: 0x04 prefix + 32-byte X + 32-byte Y.
pub const PUBLIC_KEY_LEN: usize = 65;
/// Byte width of a raw `r||s` P-256 signature.
pub const SIGNATURE_LEN: usize = 64;
/// Replay window for signed administrative requests (§5): reject anything older than this.
pub const SIGNED_REQUEST_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Hex/byte-length decode failure on a key or signature.
    Format(String),
    /// Signature did not verify against the given message and public key.
    InvalidSignature,
    /// Key bytes could not be imported as a valid P-256 point/scalar.
    InvalidKey,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::Format(msg) => write!(f, "crypto format error: {msg}"),
            CryptoError::InvalidSignature => write!(f, "signature verification failed"),
            CryptoError::InvalidKey => write!(f, "invalid key encoding"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// An ECDSA P-256 key pair. The private scalar is the authoritative secret;
/// `public_key_bytes` is the cached uncompressed SEC1 encoding so address
/// derivation and signature verification never need to re-derive the point.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyPair {
    /// Hex-encoded 32-byte private scalar.
    pub private_key_hex: String,
    /// Hex-encoded uncompressed SEC1 public key (65 bytes).
    pub public_key_hex: String,
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.private_key_hex.zeroize();
    }
}

impl KeyPair {
    pub fn address(&self) -> String {
        let pk = hex::decode(&self.public_key_hex).expect("public_key_hex is always valid hex");
        address_of(&pk)
    }

    fn signing_key(&self) -> Result<SigningKey, CryptoError> {
        let bytes = hex::decode(&self.private_key_hex)
            .map_err(|e| CryptoError::Format(e.to_string()))?;
        SigningKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidKey)
    }
}

/// Generate a fresh ECDSA P-256 key pair from the OS CSPRNG.
pub fn new_keypair() -> KeyPair {
    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = VerifyingKey::from(&signing_key);
    KeyPair {
        private_key_hex: hex::encode(signing_key.to_bytes()),
        public_key_hex: hex::encode(verifying_key.to_encoded_point(false).as_bytes()),
    }
}

/// Sign `message` with the given private key. Returns the raw `r||s`
/// concatenation (64 bytes total, 32 each, zero-padded to the curve-order
/// width) — never DER.
pub fn sign(keypair: &KeyPair, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let signing_key = keypair.signing_key()?;
    let signature: Signature = signing_key.sign(message);
    Ok(signature.to_bytes().to_vec())
}

/// Verify a raw `r||s` signature against `message` under `public_key_bytes`
/// (uncompressed SEC1 encoding).
pub fn verify(public_key_bytes: &[u8], message: &[u8], signature_bytes: &[u8]) -> bool {
    verify_checked(public_key_bytes, message, signature_bytes).unwrap_or(false)
}

/// Like [`verify`] but surfaces *why* verification could not even be attempted
/// (malformed key/signature bytes) as `CryptoError::Format`, distinct from a
/// well-formed signature that simply doesn't match (`Ok(false)`).
pub fn verify_checked(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<bool, CryptoError> {
    if signature_bytes.len() != SIGNATURE_LEN {
        return Err(CryptoError::Format(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            signature_bytes.len()
        )));
    }
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key_bytes)
        .map_err(|_| CryptoError::InvalidKey)?;
    let signature =
        Signature::from_slice(signature_bytes).map_err(|_| CryptoError::InvalidSignature)?;
    Ok(verifying_key.verify(message, &signature).is_ok())
}

/// Derive the 20-byte-truncated address from an uncompressed SEC1 public key:
/// `0x` + hex(last 20 bytes of SHA-256(public_key_bytes)).
pub fn address_of(public_key_bytes: &[u8]) -> String {
    let digest = Sha256::digest(public_key_bytes);
    let tail = &digest[digest.len() - 20..];
    format!("0x{}", hex::encode(tail))
}

/// SHA-256 of arbitrary bytes, hex-encoded (no `0x` prefix — used for block/tx content hashes).
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Canonical message for the signed administrative request envelope (§4.1.1):
/// `"<action>:<adminAddress>:<timestamp>"`.
pub fn signed_request_message(action: &str, admin_address: &str, timestamp: i64) -> String {
    format!("{action}:{admin_address}:{timestamp}")
}

/// Verify a signed administrative request's signature and replay window.
/// Does NOT check admin-set membership — that is the validator manager's job
/// (it owns the admin list); this only verifies the cryptographic envelope.
pub fn verify_signed_request(
    action: &str,
    admin_address: &str,
    timestamp: i64,
    signature_bytes: &[u8],
    admin_public_key_bytes: &[u8],
    now: i64,
) -> Result<(), CryptoError> {
    if now - timestamp > SIGNED_REQUEST_WINDOW_SECS || timestamp > now + SIGNED_REQUEST_WINDOW_SECS
    {
        return Err(CryptoError::Format("signed request expired or not yet valid".into()));
    }
    let message = signed_request_message(action, admin_address, timestamp);
    if verify_checked(admin_public_key_bytes, message.as_bytes(), signature_bytes)? {
        Ok(())
    } else {
        Err(CryptoError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = new_keypair();
        let msg = b"hello civitas";
        let sig = sign(&kp, msg).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        let pk = hex::decode(&kp.public_key_hex).unwrap();
        assert!(verify(&pk, msg, &sig));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = new_keypair();
        let sig = sign(&kp, b"original").unwrap();
        let pk = hex::decode(&kp.public_key_hex).unwrap();
        assert!(!verify(&pk, b"tampered", &sig));
    }

    #[test]
    fn address_has_expected_shape() {
        let kp = new_keypair();
        let addr = kp.address();
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
    }

    #[test]
    fn address_is_deterministic() {
        let kp = new_keypair();
        assert_eq!(kp.address(), kp.address());
    }

    #[test]
    fn signed_request_roundtrip() {
        let kp = new_keypair();
        let pk = hex::decode(&kp.public_key_hex).unwrap();
        let addr = kp.address();
        let ts = 1_700_000_000i64;
        let msg = signed_request_message("approve_validator", &addr, ts);
        let sig = sign(&kp, msg.as_bytes()).unwrap();
        assert!(verify_signed_request("approve_validator", &addr, ts, &sig, &pk, ts + 10).is_ok());
    }

    #[test]
    fn signed_request_rejects_stale_timestamp() {
        let kp = new_keypair();
        let pk = hex::decode(&kp.public_key_hex).unwrap();
        let addr = kp.address();
        let ts = 1_700_000_000i64;
        let msg = signed_request_message("approve_validator", &addr, ts);
        let sig = sign(&kp, msg.as_bytes()).unwrap();
        // 301 seconds later: just past the 5-minute replay window.
        let err = verify_signed_request("approve_validator", &addr, ts, &sig, &pk, ts + 301)
            .unwrap_err();
        assert_eq!(err, CryptoError::Format("signed request expired or not yet valid".into()));
    }

    #[test]
    fn verify_checked_rejects_malformed_signature_length() {
        let kp = new_keypair();
        let pk = hex::decode(&kp.public_key_hex).unwrap();
        let err = verify_checked(&pk, b"msg", &[0u8; 10]).unwrap_err();
        assert!(matches!(err, CryptoError::Format(_)));
    }
}
