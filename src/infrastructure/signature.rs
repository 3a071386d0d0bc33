use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq)]
pub enum SignatureError {
    #[error("Missing signature header")]
    Missing,
    #[error("Malformed signature header")]
    Malformed,
    #[error("Signature timestamp outside tolerance")]
    Expired,
    #[error("Signature mismatch")]
    Mismatch,
}

/// Verifies `t=<unix>,v1=<hex>` webhook signature headers.
///
/// The signed message is `"{t}.{payload}"`, keyed with the full endpoint
/// secret. Any one matching `v1` entry is accepted.
pub struct WebhookSignatureVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl WebhookSignatureVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], header: Option<&str>, now: i64) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;

        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<Vec<u8>> = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = value.parse().ok(),
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        candidates.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed);
        }
        // `t` is attacker-controlled; an unrepresentable skew is out of tolerance.
        let skew = now
            .checked_sub(timestamp)
            .map(i64::unsigned_abs)
            .ok_or(SignatureError::Expired)?;
        if skew > self.tolerance_secs.unsigned_abs() {
            return Err(SignatureError::Expired);
        }

        let expected = self.compute(timestamp, payload)?;
        let matched = candidates
            .iter()
            .any(|c| c.len() == expected.len() && bool::from(c.ct_eq(&expected)));

        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Produces a header value for `payload`, used by tests and local tooling.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let mac = self.compute(timestamp, payload)?;
        Ok(format!("t={},v1={}", timestamp, hex::encode(mac)))
    }

    fn compute(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn verifier() -> WebhookSignatureVerifier {
        WebhookSignatureVerifier::new("whsec_test_secret", 300)
    }

    #[test]
    fn accepts_valid_signature() {
        let v = verifier();
        let payload = br#"{"id":"evt_1"}"#;
        let header = v.sign(payload, NOW).unwrap();
        assert_eq!(v.verify(payload, Some(&header), NOW + 10), Ok(()));
    }

    #[test]
    fn accepts_any_matching_v1_entry() {
        let v = verifier();
        let payload = b"{}";
        let good = v.sign(payload, NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), good_sig);
        assert_eq!(v.verify(payload, Some(&header), NOW), Ok(()));
    }

    #[test]
    fn rejects_tampered_payload() {
        let v = verifier();
        let header = v.sign(br#"{"amount":100}"#, NOW).unwrap();
        assert_eq!(
            v.verify(br#"{"amount":999}"#, Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_other_secret() {
        let other = WebhookSignatureVerifier::new("whsec_other", 300);
        let header = other.sign(b"{}", NOW).unwrap();
        assert_eq!(
            verifier().verify(b"{}", Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamps() {
        let v = verifier();
        let header = v.sign(b"{}", NOW).unwrap();
        assert_eq!(
            v.verify(b"{}", Some(&header), NOW + 301),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        let v = verifier();
        assert_eq!(v.verify(b"{}", None, NOW), Err(SignatureError::Missing));
        assert_eq!(v.verify(b"{}", Some("garbage"), NOW), Err(SignatureError::Malformed));
        assert_eq!(
            v.verify(b"{}", Some(&format!("t={}", NOW)), NOW),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            v.verify(b"{}", Some("v1=abcd"), NOW),
            Err(SignatureError::Malformed)
        );
        let extreme = format!("t={},v1={}", i64::MIN, "00".repeat(32));
        assert_eq!(
            v.verify(b"{}", Some(&extreme), NOW),
            Err(SignatureError::Expired)
        );
        let extreme = format!("t={},v1={}", i64::MAX, "00".repeat(32));
        assert_eq!(
            v.verify(b"{}", Some(&extreme), -NOW),
            Err(SignatureError::Expired)
        );
    }
}
