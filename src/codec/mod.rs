//! Slot codec
//!
//! Maps an ordered sequence of reals onto a batched plaintext and wraps the
//! encrypt/decrypt round trip around it. Values past the input length are
//! zero. Integers survive exactly; fractional values survive to within the
//! scheme's fixed-point precision (about 1e-5 without intervening
//! operations).
//!
//! Ciphertexts and keys cross process boundaries as base64 text of the
//! scheme's binary serialization. The codec treats those bytes as opaque.

pub mod lanes;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Result, StatsError};
use crate::scheme::{ClientScheme, Evaluator};

pub use lanes::{pack_lanes, split_lanes};

/// Encode `values` into slots and encrypt under `pk`
pub fn encode_encrypt<S: ClientScheme>(
    scheme: &S,
    values: &[f64],
    pk: &S::PublicKey,
) -> Result<S::Ciphertext> {
    let pt = scheme.encode(values)?;
    scheme.encrypt(&pt, pk)
}

/// Decrypt under `sk` and decode all slots
pub fn decrypt_decode<S: ClientScheme>(
    scheme: &S,
    ct: &S::Ciphertext,
    sk: &S::SecretKey,
) -> Result<Vec<f64>> {
    let pt = scheme.decrypt(ct, sk)?;
    scheme.decode(&pt)
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text; `what` names the payload in the error
pub fn from_base64(text: &str, what: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| StatsError::InvalidCiphertext(format!("{} is not valid base64: {}", what, e)))
}

/// Serialize a ciphertext to its base64 wire form
pub fn ciphertext_to_base64<E: Evaluator>(evaluator: &E, ct: &E::Ciphertext) -> Result<String> {
    Ok(to_base64(&evaluator.save_ciphertext(ct)?))
}

/// Parse a ciphertext from its base64 wire form
pub fn ciphertext_from_base64<E: Evaluator>(
    evaluator: &E,
    text: &str,
    what: &str,
) -> Result<E::Ciphertext> {
    let bytes = from_base64(text, what)?;
    evaluator
        .load_ciphertext(&bytes)
        .map_err(|e| match e {
            StatsError::InvalidCiphertext(msg) => {
                StatsError::InvalidCiphertext(format!("{}: {}", what, msg))
            }
            other => other,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SchemeParams;
    use crate::scheme::sim::SimScheme;

    fn scheme() -> SimScheme {
        SimScheme::with_seed(SchemeParams::slots_4096(), 5)
    }

    #[test]
    fn test_round_trip_precision() {
        let s = scheme();
        let (sk, pk) = s.keygen().unwrap();
        let values: Vec<f64> = (0..4096).map(|i| (i as f64).sin() * 1000.0).collect();

        let ct = encode_encrypt(&s, &values, &pk).unwrap();
        let out = decrypt_decode(&s, &ct, &sk).unwrap();

        for (a, b) in values.iter().zip(&out) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_short_input_zero_padded() {
        let s = scheme();
        let (sk, pk) = s.keygen().unwrap();
        let ct = encode_encrypt(&s, &[7.0, -3.0], &pk).unwrap();
        let out = decrypt_decode(&s, &ct, &sk).unwrap();

        assert_eq!(out.len(), 4096);
        assert!((out[0] - 7.0).abs() < 1e-5);
        assert!((out[1] + 3.0).abs() < 1e-5);
        assert!(out[2..].iter().all(|v| v.abs() < 1e-5));
    }

    #[test]
    fn test_too_many_values() {
        let s = scheme();
        let (_, pk) = s.keygen().unwrap();
        let err = encode_encrypt(&s, &vec![0.0; 4097], &pk).unwrap_err();
        assert!(matches!(err, StatsError::Size { len: 4097, capacity: 4096 }));
    }

    #[test]
    fn test_additive_homomorphism() {
        let s = scheme();
        let (sk, pk) = s.keygen().unwrap();
        let a: Vec<f64> = (0..100).map(|i| i as f64 * 1.5).collect();
        let b: Vec<f64> = (0..100).map(|i| 10.0 - i as f64).collect();

        let ca = encode_encrypt(&s, &a, &pk).unwrap();
        let cb = encode_encrypt(&s, &b, &pk).unwrap();
        let sum = decrypt_decode(&s, &s.add(&ca, &cb).unwrap(), &sk).unwrap();

        for i in 0..100 {
            assert!((sum[i] - (a[i] + b[i])).abs() < 1e-5);
        }
    }

    #[test]
    fn test_base64_wire_form() {
        let s = scheme();
        let (_, pk) = s.keygen().unwrap();
        let ct = encode_encrypt(&s, &[1.0, 2.0], &pk).unwrap();

        let text = ciphertext_to_base64(&s, &ct).unwrap();
        let back = ciphertext_from_base64(&s, &text, "position").unwrap();
        assert_eq!(back, ct);
    }

    #[test]
    fn test_bad_base64_names_field() {
        let s = scheme();
        let err = ciphertext_from_base64(&s, "***", "mask").unwrap_err();
        assert!(matches!(err, StatsError::InvalidCiphertext(_)));
        assert!(err.to_string().contains("mask"));
    }
}
